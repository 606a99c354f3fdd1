//! Resolved link configuration
//!
//! Settings are read once by whatever owns the process (CLI flags, ini file,
//! environment - out of scope here) and handed in as an immutable value.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ROUTER_ADDR: &str = "127.0.0.1:9000";
const DEFAULT_REALM: &str = "opplive";
const DEFAULT_UDS_PATH: &str = "/tmp/crossbar.sock";
const DEFAULT_RETRY_INTERVAL_MS: u64 = 2000;

// ----------------------------------------------------------------------------
// Router Endpoint
// ----------------------------------------------------------------------------

/// Where the router listens: a rawsocket TCP endpoint or a local stream socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterEndpoint {
    /// TCP host and port
    Tcp(SocketAddr),
    /// Unix domain socket path
    Local(PathBuf),
}

impl RouterEndpoint {
    /// Default local-socket endpoint (`/tmp/crossbar.sock`)
    pub fn default_local() -> Self {
        RouterEndpoint::Local(PathBuf::from(DEFAULT_UDS_PATH))
    }
}

impl Default for RouterEndpoint {
    fn default() -> Self {
        RouterEndpoint::Tcp(DEFAULT_ROUTER_ADDR.parse().expect("default router addr"))
    }
}

impl std::fmt::Display for RouterEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterEndpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            RouterEndpoint::Local(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

// ----------------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------------

/// Configuration for one router link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Router endpoint the transport connects to
    pub endpoint: RouterEndpoint,
    /// Realm joined after the session starts
    pub realm: String,
    /// Verbose wire-level diagnostics in the underlying client
    pub debug: bool,
    /// Fixed backoff between connect attempts while the router is unreachable
    pub retry_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: RouterEndpoint::default(),
            realm: DEFAULT_REALM.to_string(),
            debug: false,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }
}

impl Settings {
    /// Create settings with a short retry interval for tests
    pub fn testing() -> Self {
        Self {
            retry_interval_ms: 10,
            ..Self::default()
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: RouterEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}
