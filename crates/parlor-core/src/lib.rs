//! # parlor-core
//!
//! Presence tracking, event routing and persistence seams for the Parlor
//! chat engine.
//!
//! - **Presence** - who is online and which conversation each user has open
//! - **Router** - per-connection dispatch plus the read/write pump pair
//! - **Handlers** - `MSG`, `JOIN` and `LEFT`
//! - **Store** - the message persistence trait, with in-memory and SQLite stores
//! - **Notify** - system messages injected by other subsystems
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │────▶│ EventRouter │────▶│  Handlers   │────▶│    Store    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │
//!        ▼                                       │
//! ┌─────────────┐                                │
//! │  Presence   │◀───────────────────────────────┘
//! └─────────────┘
//! ```

pub mod auth;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod memstore;
pub mod message;
pub mod notify;
pub mod presence;
pub mod queue;
pub mod router;
pub mod session;
pub mod sqlite;
pub mod store;

pub use auth::{AuthError, Identity, SessionValidator, StaticSessionValidator};
pub use connection::Connection;
pub use error::{ChatError, ErrorKind};
pub use handlers::ChatContext;
pub use memstore::InMemoryMessageStore;
pub use message::{Attachment, ChatPreview, ConversationKey, Message, MessageId, UserId};
pub use notify::NotificationPublisher;
pub use presence::{Delivery, PresenceRegistry};
pub use queue::{OutboundQueue, OutboundReceiver, QueueError, DEFAULT_QUEUE_CAPACITY};
pub use router::{EventHandler, EventRouter};
pub use session::ChatSession;
pub use sqlite::SqliteMessageStore;
pub use store::{MessageStore, Page, StoreError, MAX_PAGE_LIMIT};
