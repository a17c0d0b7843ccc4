//! # wellbeing-chat
//!
//! A single-page web chat for a well-being support assistant. Each browser
//! session keeps its own system prompt and transcript; every user message is
//! forwarded to Google's Gemini model and the reply is appended to the
//! transcript.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use wellbeing_chat::app::{self, AppState};
//! use wellbeing_chat::llm::GeminiClient;
//! use wellbeing_chat::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GeminiClient::new(std::env::var("GEMINI_API_KEY")?);
//!     let app = Arc::new(app::chat_app(AppState::new(Arc::new(client))));
//!
//!     let server = Server::bind("127.0.0.1:8501").await?;
//!     server
//!         .run(move |req| {
//!             let app = Arc::clone(&app);
//!             async move { app.handle(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── Transport ────────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Chat domain ──────────────────────────────────────────────────────────────
pub mod app;
pub mod background;
pub mod chat;
pub mod config;
pub mod llm;
pub mod session;
pub mod ui;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
