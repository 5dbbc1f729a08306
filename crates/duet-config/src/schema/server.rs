use serde::{Deserialize, Serialize};

/// Listener settings shared by the WebSocket and HTTP surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// HTTP control API.
    pub port: u16,
    /// Agent and observer WebSocket listener.
    pub ws_port: u16,
    /// Seconds a new socket has to send its first message.
    pub hello_timeout_secs: u64,
    /// Per-connection outbound queue depth; overflow drops frames.
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            ws_port: 3001,
            hello_timeout_secs: 10,
            outbound_buffer: 256,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ws_bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }
}
