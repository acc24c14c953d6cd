//! HTSP session.
//!
//! A [`Session`] opens a transport, performs the hello/authenticate
//! handshake, enables asynchronous metadata and waits for the initial entity
//! sync before handing control back to the caller.

use crate::cache::{EntityCaches, EntityKind};
use crate::error::ClientError;
use crate::transport::{Transport, TransportConfig};
use bytes::Bytes;
use htsp_protocol::method::{
    AUTHENTICATE, DELETE_DVR_ENTRY, ENABLE_ASYNC_METADATA, GET_DISK_SPACE, GET_SYS_TIME, HELLO,
};
use htsp_protocol::{Message, Value, DEFAULT_PORT, HTSP_VERSION};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default client name announced in `hello`.
pub const DEFAULT_CLIENT_NAME: &str = "tvhc";

/// Default client version announced in `hello`.
pub const DEFAULT_CLIENT_VERSION: &str = "1.0";

/// Default time to wait for `initialSyncCompleted`.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_name: String,
    pub client_version: String,
    /// How long `open` waits for the initial entity sync.
    pub sync_timeout: Duration,
    pub transport: TransportConfig,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            transport: TransportConfig::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

/// Server details from the `hello` reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub htsp_version: Option<i64>,
    pub capabilities: Vec<String>,
    /// Challenge mixed into the authentication digest.
    pub challenge: Option<Bytes>,
}

impl ServerInfo {
    /// Extracts server details from a `hello` reply.
    pub fn from_hello(reply: &Message) -> Self {
        // Older servers send the version as a number
        let version = match reply.get("serverversion") {
            Some(Value::Str(s)) => Some(s.clone()),
            Some(Value::S64(n)) => Some(n.to_string()),
            _ => None,
        };

        let capabilities = reply
            .get_list("servercapability")
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        Self {
            name: reply.get_str("servername").map(str::to_string),
            version,
            htsp_version: reply.get_i64("htspversion"),
            capabilities,
            challenge: reply.get_bytes("challenge").cloned(),
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// SHA-1 over the password followed by the server challenge.
pub fn auth_digest(password: &str, challenge: &[u8]) -> Bytes {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    hasher.update(challenge);
    Bytes::from(hasher.finalize().to_vec())
}

/// An authenticated, synced HTSP session.
pub struct Session {
    config: SessionConfig,
    transport: Transport,
    caches: Arc<EntityCaches>,
    server: ServerInfo,
}

impl Session {
    /// Connects, authenticates and waits for the initial sync.
    pub fn open(config: SessionConfig) -> Result<Self, ClientError> {
        let caches = Arc::new(EntityCaches::new());
        let transport = Transport::open(
            &config.host,
            config.port,
            config.transport.clone(),
            caches.clone(),
        )?;
        tracing::info!("connected to {}", transport.peer_addr());

        let mut session = Self {
            config,
            transport,
            caches,
            server: ServerInfo::default(),
        };

        session.hello()?;
        session.authenticate()?;
        session.call(ENABLE_ASYNC_METADATA, Message::new())?;

        let timeout = session.config.sync_timeout;
        if !session.caches.wait_for_sync(timeout) {
            tracing::warn!("no initialSyncCompleted within {:?}", timeout);
            return Err(ClientError::SyncTimeout(timeout));
        }

        Ok(session)
    }

    fn hello(&mut self) -> Result<(), ClientError> {
        let args = Message::new()
            .with("htspversion", HTSP_VERSION)
            .with("clientname", self.config.client_name.as_str())
            .with("clientversion", self.config.client_version.as_str());
        let reply = self.call(HELLO, args)?;

        self.server = ServerInfo::from_hello(&reply);
        tracing::info!(
            "server {} {} (htsp v{})",
            self.server.name.as_deref().unwrap_or("?"),
            self.server.version.as_deref().unwrap_or("?"),
            self.server.htsp_version.unwrap_or_default()
        );
        Ok(())
    }

    fn authenticate(&self) -> Result<(), ClientError> {
        let mut args = Message::new().with(Message::METHOD, AUTHENTICATE);
        if let Some(username) = &self.config.username {
            args.insert("username", username.as_str());
        }
        if let (Some(password), Some(challenge)) = (&self.config.password, &self.server.challenge)
        {
            args.insert("digest", auth_digest(password, challenge));
        }

        let reply = self.transport.call(&args)?;
        if reply.get_i64("noaccess").unwrap_or(0) != 0 {
            tracing::warn!("server denied access");
            return Err(ClientError::AuthFailed);
        }
        check_error(AUTHENTICATE, reply)?;

        tracing::debug!("authenticated");
        Ok(())
    }

    /// Issues an RPC and returns its answer.
    ///
    /// An answer carrying an `error` string fails with
    /// [`ClientError::Server`].
    pub fn call(&self, method: &str, mut args: Message) -> Result<Message, ClientError> {
        args.insert(Message::METHOD, method);
        let reply = self.transport.call(&args)?;
        check_error(method, reply)
    }

    /// Asks the server to delete a recording.
    ///
    /// The record cache changes only when the server pushes
    /// `dvrEntryDelete`.
    pub fn delete_record(&self, id: i64) -> Result<Message, ClientError> {
        self.call(DELETE_DVR_ENTRY, Message::new().with("id", id))
    }

    pub fn disk_space(&self) -> Result<Message, ClientError> {
        self.call(GET_DISK_SPACE, Message::new())
    }

    pub fn sys_time(&self) -> Result<Message, ClientError> {
        self.call(GET_SYS_TIME, Message::new())
    }

    pub fn channels(&self) -> HashMap<i64, Message> {
        self.caches.snapshot(EntityKind::Channel)
    }

    pub fn records(&self) -> HashMap<i64, Message> {
        self.caches.snapshot(EntityKind::Record)
    }

    pub fn tags(&self) -> HashMap<i64, Message> {
        self.caches.snapshot(EntityKind::Tag)
    }

    pub fn channel(&self, id: i64) -> Option<Message> {
        self.caches.get(EntityKind::Channel, id)
    }

    pub fn record(&self, id: i64) -> Option<Message> {
        self.caches.get(EntityKind::Record, id)
    }

    pub fn tag(&self, id: i64) -> Option<Message> {
        self.caches.get(EntityKind::Tag, id)
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.caches.count(kind)
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Closes the connection and drops the cached entities.
    pub fn close(&self) {
        self.transport.close();
        self.caches.clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_error(method: &str, reply: Message) -> Result<Message, ClientError> {
    match reply.get_str("error") {
        Some(message) => Err(ClientError::Server {
            method: method.to_string(),
            message: message.to_string(),
        }),
        None => Ok(reply),
    }
}
