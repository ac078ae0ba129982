pub mod conntrack_handler;
pub mod health_handler;
pub mod metrics_handler;
pub mod router;
pub mod server;
pub mod state;
pub mod ui_handler;

pub use server::{bind, run_http_server};
pub use state::AppState;
