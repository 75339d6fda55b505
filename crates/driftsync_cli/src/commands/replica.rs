//! On-disk replica layout.
//!
//! ```text
//! <client>/
//! ├─ tasks.json             # client records, sync_status included
//! ├─ tasks.json.lock
//! ├─ sync_state.json        # device id and per-table cursors
//! └─ sync_state.json.lock
//! <server>/
//! ├─ tasks.json             # canonical records
//! └─ tasks.json.lock
//! ```
//!
//! The client reaches the server through the loopback transport, so a sync
//! cycle exercises the same request and response bodies a networked
//! deployment would.

use driftsync_engine::{HttpTransport, LocalEditor, LoopbackClient, SyncConfig, SyncCoordinator};
use driftsync_protocol::{DeviceId, HttpMethod, HttpResponse, Task, Timestamp};
use driftsync_server::{Reconciler, ServerConfig, SyncServer};
use driftsync_store::{CursorStore, FileBackend, FileCursorStore, LocalRecord, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Records file, on both sides.
pub const TASKS_FILE: &str = "tasks.json";

/// Device identity and cursors, client side only.
pub const STATE_FILE: &str = "sync_state.json";

const LOOPBACK_URL: &str = "http://localhost:3000";

/// The client's task table.
pub type ClientTable = Arc<Table<LocalRecord<Task>, FileBackend>>;

/// The server, shared with the loopback handler.
pub type Server = Arc<SyncServer<Task, Table<Task, FileBackend>>>;

type Handler = Box<dyn Fn(HttpMethod, &str, &[u8]) -> HttpResponse + Send + Sync>;

/// Loopback transport into a [`Server`].
pub type Transport = HttpTransport<Task, LoopbackClient<Handler>>;

/// A coordinator wired to the on-disk replicas.
pub type Coordinator = SyncCoordinator<Task, ClientTable, FileCursorStore, Transport>;

/// Locations of the two replicas.
pub struct Replicas {
    client: PathBuf,
    server: PathBuf,
}

impl Replicas {
    /// Creates a layout for the given directories.
    pub fn new(client: PathBuf, server: PathBuf) -> Self {
        Self { client, server }
    }

    /// Returns the client directory.
    pub fn client_dir(&self) -> &Path {
        &self.client
    }

    /// Returns the server directory.
    pub fn server_dir(&self) -> &Path {
        &self.server
    }

    /// Opens the client replica, creating it if needed.
    pub fn create_client(&self) -> Result<ClientReplica, Box<dyn std::error::Error>> {
        ClientReplica::open(&self.client)
    }

    /// Opens an existing client replica.
    pub fn open_client(&self) -> Result<ClientReplica, Box<dyn std::error::Error>> {
        if !self.client.join(STATE_FILE).exists() {
            return Err(format!(
                "No client replica at {:?}. Run `driftsync init` first.",
                self.client
            )
            .into());
        }
        ClientReplica::open(&self.client)
    }

    /// Opens the server replica, creating it if needed.
    pub fn open_server(&self) -> Result<Server, Box<dyn std::error::Error>> {
        let path = self.server.join(TASKS_FILE);
        let table = Table::open(Task::TABLE, FileBackend::open(&path)?)?;
        let reconciler = Reconciler::open(table)?;
        debug!(path = %path.display(), high_water = reconciler.high_water(), "opened server replica");
        let config = ServerConfig::default().with_table(Task::TABLE);
        Ok(Arc::new(SyncServer::new(config, reconciler)))
    }

    /// Opens both replicas and wires a coordinator between them.
    pub fn coordinator(&self, config: SyncConfig) -> Result<Coordinator, Box<dyn std::error::Error>> {
        let client = self.open_client()?;
        let server = self.open_server()?;
        Ok(client.into_coordinator(&server, config))
    }
}

/// Sync configuration for the loopback deployment.
pub fn sync_config() -> SyncConfig {
    SyncConfig::new(Task::TABLE, LOOPBACK_URL)
}

/// An opened client replica.
pub struct ClientReplica {
    table: ClientTable,
    cursors: FileCursorStore,
}

impl ClientReplica {
    fn open(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let backend = FileBackend::open(&dir.join(TASKS_FILE))?;
        let table = Arc::new(Table::open(Task::TABLE, backend)?);
        let cursors = FileCursorStore::open(&dir.join(STATE_FILE))?;
        Ok(Self { table, cursors })
    }

    /// Returns the device id.
    pub fn device_id(&self) -> DeviceId {
        self.cursors.device_id()
    }

    /// Returns the persisted cursor for the task table.
    pub fn cursor(&self) -> Result<Timestamp, Box<dyn std::error::Error>> {
        Ok(self.cursors.load(Task::TABLE)?)
    }

    /// Returns the task table.
    pub fn table(&self) -> &ClientTable {
        &self.table
    }

    /// Creates an editor that attributes writes to this device.
    pub fn editor(&self) -> LocalEditor<Task, ClientTable> {
        LocalEditor::new(Arc::clone(&self.table), self.device_id())
    }

    /// Turns the replica into a coordinator talking to `server`.
    pub fn into_coordinator(self, server: &Server, config: SyncConfig) -> Coordinator {
        let server = Arc::clone(server);
        let handler: Handler = Box::new(move |method: HttpMethod, path: &str, body: &[u8]| {
            server.handle(method, path, body)
        });
        let transport = HttpTransport::new(
            config.server_url.clone(),
            config.table.clone(),
            LoopbackClient::new(handler),
        )
        .with_timeout(config.timeout);
        SyncCoordinator::new(config, self.table, self.cursors, transport)
    }
}
