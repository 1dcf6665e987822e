pub mod channels;
pub mod rate_limiter;
pub mod server;
pub mod telnet;
pub mod web_server;
pub mod ws_server;

pub use channels::{wait_for_shutdown, AcceptRx, AcceptTx, Connection, Gateway, InboundRx, OutboundTx};
pub use rate_limiter::{CommandThrottle, RateLimitConfig, RateLimitRejection};
