mod routes;
mod server;

pub mod app;
pub mod config;

pub use app::start_app;
pub use routes::ClassifyError;
pub use server::{build_router, DemoState};
