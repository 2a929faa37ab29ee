//! IPC client for communicating with the medsearch daemon
//!
//! Synchronous client over a Unix socket, one JSON message per line. The
//! daemon keeps one search session per connection, so an [`IpcConnection`]
//! is held open for as long as the caller's search session should live.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::medsearch_home;
use crate::{IpcMessage, IpcResponse, SearchFilters, SearchSnapshot};

/// Default socket path
pub fn socket_path() -> PathBuf {
    medsearch_home().join("medsearch.sock")
}

/// Error type for IPC operations
#[derive(Debug)]
pub enum IpcError {
    /// Daemon is not running (socket doesn't exist or connection refused)
    DaemonNotRunning,
    /// Socket connection failed
    ConnectionFailed(std::io::Error),
    /// Failed to send message
    SendFailed(std::io::Error),
    /// Failed to receive response
    ReceiveFailed(std::io::Error),
    /// Invalid response format
    InvalidResponse(String),
    /// Daemon returned an error
    DaemonError(String),
}

impl std::fmt::Display for IpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpcError::DaemonNotRunning => write!(f, "Daemon not running"),
            IpcError::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            IpcError::SendFailed(e) => write!(f, "Send failed: {}", e),
            IpcError::ReceiveFailed(e) => write!(f, "Receive failed: {}", e),
            IpcError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            IpcError::DaemonError(msg) => write!(f, "Daemon error: {}", msg),
        }
    }
}

impl std::error::Error for IpcError {}

/// IPC client for communicating with the daemon
pub struct IpcClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcClient {
    /// Create a new IPC client with default settings
    pub fn new() -> Self {
        Self::with_socket_path(socket_path())
    }

    /// Create a client with a custom socket path
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(5),
        }
    }

    /// Set the read/write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the daemon appears to be running (socket exists)
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Open a connection (and with it, a daemon-side search session)
    pub fn connect(&self) -> Result<IpcConnection, IpcError> {
        if !self.socket_path.exists() {
            return Err(IpcError::DaemonNotRunning);
        }

        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused
                || e.kind() == std::io::ErrorKind::NotFound
            {
                IpcError::DaemonNotRunning
            } else {
                IpcError::ConnectionFailed(e)
            }
        })?;

        stream.set_read_timeout(Some(self.timeout)).ok();
        stream.set_write_timeout(Some(self.timeout)).ok();

        let writer = stream.try_clone().map_err(IpcError::ConnectionFailed)?;
        Ok(IpcConnection {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Send a single message on a fresh connection and wait for the response
    pub fn send(&self, message: &IpcMessage) -> Result<IpcResponse, IpcError> {
        self.connect()?.request(message)
    }

    /// Convenience method: Ping the daemon
    pub fn ping(&self) -> Result<(u64, u64), IpcError> {
        match self.send(&IpcMessage::Ping)? {
            IpcResponse::Pong {
                uptime_secs,
                active_sessions,
            } => Ok((uptime_secs, active_sessions)),
            _ => Err(IpcError::InvalidResponse("Unexpected response type".into())),
        }
    }
}

/// An open connection to the daemon
pub struct IpcConnection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl IpcConnection {
    /// Send a message and wait for its response
    pub fn request(&mut self, message: &IpcMessage) -> Result<IpcResponse, IpcError> {
        let json = serde_json::to_string(message).map_err(|e| {
            IpcError::SendFailed(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        writeln!(self.writer, "{}", json).map_err(IpcError::SendFailed)?;
        self.writer.flush().map_err(IpcError::SendFailed)?;

        let mut response_line = String::new();
        let read = self
            .reader
            .read_line(&mut response_line)
            .map_err(IpcError::ReceiveFailed)?;
        if read == 0 {
            return Err(IpcError::InvalidResponse("Connection closed".into()));
        }

        let response: IpcResponse = serde_json::from_str(&response_line)
            .map_err(|e| IpcError::InvalidResponse(e.to_string()))?;

        // Check for daemon errors
        if let IpcResponse::Error(msg) = &response {
            return Err(IpcError::DaemonError(msg.clone()));
        }

        Ok(response)
    }

    /// Expect `Ok` from the daemon
    pub fn expect_ok(&mut self, message: &IpcMessage) -> Result<(), IpcError> {
        match self.request(message)? {
            IpcResponse::Ok => Ok(()),
            _ => Err(IpcError::InvalidResponse("Unexpected response type".into())),
        }
    }

    /// Convenience method: update the session input
    pub fn input(&mut self, text: &str, filters: &SearchFilters) -> Result<(), IpcError> {
        self.expect_ok(&IpcMessage::Input {
            text: text.to_string(),
            filters: filters.clone(),
        })
    }

    /// Convenience method: read the session state
    pub fn snapshot(&mut self, settle: bool, timeout: Duration) -> Result<SearchSnapshot, IpcError> {
        let message = IpcMessage::Snapshot {
            settle,
            timeout_ms: timeout.as_millis() as u64,
        };
        match self.request(&message)? {
            IpcResponse::Snapshot(snapshot) => Ok(snapshot),
            _ => Err(IpcError::InvalidResponse("Unexpected response type".into())),
        }
    }
}

/// Check if the daemon is running
pub fn is_daemon_running() -> bool {
    IpcClient::new().daemon_available()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path() {
        let path = socket_path();
        assert!(path.ends_with("medsearch.sock"));
        assert!(path.to_str().unwrap().contains(".medsearch"));
    }

    #[test]
    fn test_daemon_not_running() {
        let client = IpcClient::with_socket_path(PathBuf::from("/nonexistent/path.sock"));
        assert!(!client.daemon_available());

        let result = client.ping();
        assert!(matches!(result, Err(IpcError::DaemonNotRunning)));
    }
}
