//! HTTP and WebSocket handlers for the Parlor server.

use crate::auth::{self, JwtSessionValidator};
use crate::config::{Config, StoreBackend};
use crate::metrics::{self, ConnectionMetricsGuard, MeteredSink, MeteredStream};
use anyhow::{ensure, Context, Result};
use axum::{
    extract::{ws::WebSocket, Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parlor_core::{
    AuthError, ChatContext, ChatError, ChatPreview, ChatSession, ErrorKind, InMemoryMessageStore,
    MessageStore, NotificationPublisher, Page, PresenceRegistry, SessionValidator,
    SqliteMessageStore, UserId,
};
use parlor_protocol::MessagePayload;
use parlor_transport::websocket;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared server state.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Drives WebSocket connections.
    pub session: ChatSession,
    /// Validates REST callers.
    pub sessions: Arc<dyn SessionValidator>,
    /// Entry point for system notifications.
    pub notifications: NotificationPublisher,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn MessageStore>,
        sessions: Arc<dyn SessionValidator>,
    ) -> Self {
        let hub = Arc::new(PresenceRegistry::new());
        let ctx = ChatContext::new(hub.clone(), store.clone());
        let session = ChatSession::new(ctx, sessions.clone())
            .with_queue_capacity(config.limits.queue_capacity);

        Self {
            config,
            session,
            sessions,
            notifications: NotificationPublisher::new(hub, store),
        }
    }

    /// The presence registry shared by every connection.
    #[must_use]
    pub fn hub(&self) -> &Arc<PresenceRegistry> {
        &self.session.context().hub
    }

    fn store(&self) -> &Arc<dyn MessageStore> {
        &self.session.context().store
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Result<UserId, ChatError> {
        let token = auth::session_token(headers, &self.config.auth.cookie_name)
            .ok_or(AuthError::MissingToken)?;
        let identity = self.sessions.validate(&token).await?;
        if let Some(name) = &identity.display_name {
            if let Err(e) = self.store().save_user(identity.user_id, name).await {
                warn!(user = %identity.user_id, error = %e, "Could not record display name");
            }
        }
        Ok(identity.user_id)
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/api/v1/chats", get(list_chats))
        .route("/api/v1/chats/:user_id", get(list_messages))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    ensure!(
        !config.auth.jwt_secret.is_empty(),
        "No session secret configured: set PARLOR_JWT_SECRET or auth.jwt_secret"
    );

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let sessions = Arc::new(JwtSessionValidator::new(&config.auth.jwt_secret));
    let store = open_store(&config).await?;
    let state = Arc::new(AppState::new(config.clone(), store, sessions));

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parlor server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app(state)).await?;

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn MessageStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory message store, history is lost on restart");
            Ok(Arc::new(InMemoryMessageStore::new()))
        }
        StoreBackend::Sqlite => {
            let store = SqliteMessageStore::connect(&config.store.database_url)
                .await
                .with_context(|| {
                    format!("Failed to open message store {}", config.store.database_url)
                })?;
            Ok(Arc::new(store))
        }
    }
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "online": state.hub().online_count(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let token = auth::session_token(&headers, &state.config.auth.cookie_name).or(query.token);
    ws.max_message_size(state.config.transport.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, token, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, token: Option<String>, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (sink, stream) = websocket::split(socket);
    let result = state
        .session
        .serve(token.as_deref(), MeteredSink(sink), MeteredStream(stream))
        .await;

    match result {
        Ok(user) => debug!(user = %user, "WebSocket session ended"),
        Err(e) => {
            metrics::record_auth_failure();
            metrics::record_error(e.name());
        }
    }
}

/// Error response: `{"error": {"code", "name", "message"}}`.
pub struct ApiError(ChatError);

impl<E: Into<ChatError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.kind() == ErrorKind::Persistence {
            error!(error = %self.0, source = ?std::error::Error::source(&self.0), "Request failed");
        }
        metrics::record_error(self.0.name());

        let status =
            StatusCode::from_u16(self.0.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "error": self.0.to_body() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct PreviewQuery {
    #[serde(default)]
    query: String,
}

/// `GET /api/v1/chats?query=` - the caller's chat list.
async fn list_chats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Vec<ChatPreview>>, ApiError> {
    let user = state.authenticate(&headers).await?;
    let previews = state
        .store()
        .list_previews(user, &query.query)
        .await
        .map_err(|e| ChatError::persistence("could not get all chats", e))?;
    Ok(Json(previews))
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

/// `GET /api/v1/chats/:user_id?offset=&limit=` - conversation history,
/// oldest first.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(peer): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<MessagePayload>>, ApiError> {
    let user = state.authenticate(&headers).await?;
    let peer = Uuid::parse_str(&peer).map_err(|_| ChatError::InvalidUserId(peer.clone()))?;
    if peer == user {
        return Err(ChatError::SelfConversation.into());
    }

    let page = Page::new(
        page.offset.unwrap_or(0),
        page.limit.unwrap_or(state.config.limits.page_limit),
    );
    let messages = state
        .store()
        .list_conversation(user, peer, page)
        .await
        .map_err(|e| ChatError::persistence("could not get messages in chat", e))?;

    Ok(Json(
        messages.iter().map(|m| m.payload_for(user)).collect(),
    ))
}
