//! HTTP proxy server

mod error;
mod handler;
pub mod server;
mod streaming;
mod upstream;

pub use error::{ChatError, GENERIC_ERROR_MESSAGE};
pub use handler::ChatHandler;
pub use server::{build_router, run_server, ProxyState};
pub use upstream::UpstreamClient;
