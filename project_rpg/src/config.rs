use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use net::RateLimitConfig;
use rpg::SessionConfig;

/// Which front end accepts players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Bare WebSocket listener.
    Ws,
    /// HTTP server with a `/ws` route and static client files.
    Web,
    /// Newline-delimited text over TCP.
    Tcp,
}

impl Transport {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ws" => Some(Self::Ws),
            "web" => Some(Self::Web),
            "tcp" => Some(Self::Tcp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub transport: Transport,
    pub ws_addr: String,
    pub tcp_addr: String,
    pub web_static_dir: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Ws,
            ws_addr: "0.0.0.0:4001".to_string(),
            tcp_addr: "0.0.0.0:4000".to_string(),
            web_static_dir: "web_dist".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickSection {
    pub interval_ms: u64,
    pub step_delay_ms: u64,
}

impl Default for TickSection {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            step_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
    pub max_commands_per_second: u32,
    pub max_input_length: usize,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_connections_per_ip: 5,
            max_commands_per_second: 20,
            max_input_length: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentSection {
    pub content_dir: String,
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            content_dir: "content".to_string(),
        }
    }
}

/// Top-level RPG server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetConfig,
    pub tick: TickSection,
    pub security: SecuritySection,
    pub content: ContentSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_connections_total: self.security.max_connections_total,
            max_connections_per_ip: self.security.max_connections_per_ip,
            max_commands_per_second: self.security.max_commands_per_second,
            max_input_length: self.security.max_input_length,
        }
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_interval: Duration::from_millis(self.tick.interval_ms.max(1)),
            step_delay: Duration::from_millis(self.tick.step_delay_ms),
            max_commands_per_second: self.security.max_commands_per_second,
        }
    }
}

/// Parse CLI arguments and load config.
/// Supports: --config <path>, --transport <ws|web|tcp>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;
    let mut transport: Option<Transport> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--transport" => match args.get(i + 1).map(|v| Transport::parse(v)) {
                Some(Some(t)) => {
                    transport = Some(t);
                    i += 2;
                }
                _ => {
                    eprintln!("--transport requires one of: ws, web, tcp");
                    std::process::exit(1);
                }
            },
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    let mut config = match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(t) = transport {
        config.net.transport = t;
    }
    config
}
