mod admin_routes;
pub mod config;
mod http_layers;
pub mod metrics;
pub mod server;
mod session;
pub mod state;
mod webhook_routes;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
