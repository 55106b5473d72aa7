pub mod core;
pub mod orchestrator;
pub mod server;
pub mod session;

// --- Primary core exports ---
pub use core::config::ServiceConfig;
pub use core::error::FetchError;
pub use core::types;
pub use core::AppState;
