//! # parlor-server
//!
//! HTTP and WebSocket front end for the Parlor chat engine.
//!
//! - `GET /ws/chats` - chat WebSocket (path configurable)
//! - `GET /api/v1/chats?query=` - chat list of the caller
//! - `GET /api/v1/chats/:user_id?offset=&limit=` - conversation history
//! - `GET /health` - liveness

pub mod auth;
pub mod config;
pub mod handlers;
pub mod metrics;

pub use auth::{JwtSessionValidator, Session, SessionClaims};
pub use config::Config;
pub use handlers::{app, run_server, AppState};
