pub mod adapters;
pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod providers;
pub mod server;
pub mod store;
pub mod translate;

pub use billing::ApiCallLedger;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use server::{build_router, AppState};
