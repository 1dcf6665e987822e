pub mod combat;
pub mod connection;
pub mod content;
pub mod error;
pub mod monster;
pub mod movement;
pub mod parser;
pub mod player;
pub mod router;
pub mod services;
pub mod wire;

pub use connection::{run_acceptor, run_session};
pub use content::ContentTables;
pub use error::ContentError;
pub use router::GameSession;
pub use services::{GameServices, SessionConfig};
pub use wire::ServerMessage;
