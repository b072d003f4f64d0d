//! Configuration and limits for the hub.

use std::time::Duration;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8081;

/// Resource limits applied to each connection.
///
/// These limits keep a single misbehaving client from growing the server's
/// memory without bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single inbound frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of the HTTP upgrade request in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024, // 16 MB
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(max_frame_size: usize, max_handshake_size: usize) -> Self {
        Self {
            max_frame_size,
            max_handshake_size,
        }
    }
}

/// Timeouts for the blocking steps the event loop performs inline.
///
/// The loop is single-threaded, so each of these bounds how long one slow
/// peer can stall every other connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum time to receive the upgrade request and write the response.
    ///
    /// Default: 5 seconds
    pub handshake: Duration,

    /// Maximum time to write one outbound frame to one socket.
    ///
    /// Default: 1 second
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(5),
            write: Duration::from_secs(1),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(handshake: Duration, write: Duration) -> Self {
        Self { handshake, write }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind, also echoed in the handshake response.
    ///
    /// Default: `0.0.0.0`
    pub host: String,

    /// Port to bind, also echoed in the handshake response.
    ///
    /// Default: 8081
    pub port: u16,

    /// Upper bound on how long one loop tick waits for readiness.
    ///
    /// Lower values react faster to state the wait cannot observe at the
    /// cost of more idle wakeups.
    ///
    /// Default: 10 ms
    pub poll_timeout: Duration,

    /// Bytes reserved per read on a client socket.
    ///
    /// Default: 4 KB (4096)
    pub read_buffer_size: usize,

    /// Invoke the policy's disconnect hook when a connection is removed.
    ///
    /// Default: false
    pub notify_disconnect: bool,

    /// Resource limits.
    pub limits: Limits,

    /// Timeout configuration.
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            poll_timeout: Duration::from_millis(10),
            read_buffer_size: 4096,
            notify_disconnect: false,
            limits: Limits::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the readiness wait bound.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Enable or disable the disconnect hook.
    #[must_use]
    pub const fn with_notify_disconnect(mut self, enabled: bool) -> Self {
        self.notify_disconnect = enabled;
        self
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The `host:port` pair to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
