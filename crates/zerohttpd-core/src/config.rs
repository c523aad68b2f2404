use crate::error::ZhttpdError;
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Largest ring the kernel accepts (`IORING_MAX_ENTRIES`).
pub const MAX_QUEUE_DEPTH: u32 = 32768;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backlog: i32,
    /// Submission ring entries.
    pub queue_depth: u32,
    /// Capacity of every read buffer.
    pub read_size: usize,
    /// Window scanned for the CRLF that ends the request line.
    pub request_line_limit: usize,
    pub public_root: PathBuf,
    /// Emitted as `Server: <server_name>`.
    pub server_name: String,
    /// Reject request paths with `..` components.
    pub confine_to_root: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            backlog: 10,
            queue_depth: 256,
            read_size: 8192,
            request_line_limit: 1024,
            public_root: PathBuf::from("public"),
            server_name: "zerohttpd/0.1".to_string(),
            confine_to_root: false,
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document. Keys that are absent keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ZhttpdError> {
        let config: ServerConfig =
            toml::from_str(raw).map_err(|e| ZhttpdError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ZhttpdError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    ZhttpdError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                tracing::debug!("Loaded configuration from {}", path.display());
                Self::from_toml_str(&raw)
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ZhttpdError> {
        if self.queue_depth == 0 || self.queue_depth > MAX_QUEUE_DEPTH {
            return Err(ZhttpdError::Config(format!(
                "queue_depth must be within 1..={}, got {}",
                MAX_QUEUE_DEPTH, self.queue_depth
            )));
        }
        if self.read_size == 0 {
            return Err(ZhttpdError::Config("read_size must be non-zero".into()));
        }
        if self.request_line_limit < 2 || self.request_line_limit > self.read_size {
            return Err(ZhttpdError::Config(format!(
                "request_line_limit must be within 2..={}, got {}",
                self.read_size, self.request_line_limit
            )));
        }
        if self.public_root.as_os_str().is_empty() {
            return Err(ZhttpdError::Config("public_root must not be empty".into()));
        }
        if self.backlog <= 0 {
            return Err(ZhttpdError::Config("backlog must be positive".into()));
        }
        Ok(())
    }

    /// Resolves `host:port` into the first matching socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ZhttpdError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ZhttpdError::Config(format!("cannot resolve {}:{}", self.host, self.port)))
    }

    /// The full `Server:` header line.
    pub fn banner(&self) -> String {
        format!("Server: {}\r\n", self.server_name)
    }
}
