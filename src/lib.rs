//! chat-proxy: moderating, token-budgeted proxy for chat completion APIs
//!
//! Features:
//! - Token budget per request, system prompt included
//! - Moderation of the latest message before any completion is requested
//! - Fixed system prompt and model policy injected into every completion
//! - Upstream SSE piped through unbuffered

pub mod api;
pub mod config;
pub mod proxy;
pub mod request_log;
pub mod tokenizer;

pub use config::AppConfig;
pub use proxy::{build_router, run_server, ProxyState};
pub use tokenizer::{TiktokenCounter, TokenCounter};
