//! End-to-end tests: WebSocket flows over real sockets, REST routes
//! through the router directly.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Duration as TokenTtl;
use futures_util::{SinkExt, StreamExt};
use parlor_core::{Attachment, InMemoryMessageStore, UserId};
use parlor_server::{app, AppState, Config, JwtSessionValidator, Session};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;
use uuid::Uuid;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "test-secret";

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    sessions: Arc<JwtSessionValidator>,
}

impl TestServer {
    async fn start() -> Self {
        let mut config = Config::default();
        config.auth.jwt_secret = SECRET.to_string();

        let sessions = Arc::new(JwtSessionValidator::new(SECRET));
        let store = Arc::new(InMemoryMessageStore::new());
        let state = Arc::new(AppState::new(config, store, sessions.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            state,
            sessions,
        }
    }

    fn token(&self, user: UserId) -> String {
        self.issue(Session::new(user))
    }

    fn named_token(&self, user: UserId, name: &str) -> String {
        self.issue(Session::new(user).with_name(name))
    }

    fn issue(&self, session: Session) -> String {
        self.sessions.issue(session, TokenTtl::hours(1)).unwrap()
    }

    async fn connect(&self, token: &str) -> Ws {
        let url = format!("ws://{}/ws/chats?token={}", self.addr, token);
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }

    /// Connect and consume the `CONN` acknowledgement.
    async fn join(&self, user: UserId) -> Ws {
        let mut ws = self.connect(&self.token(user)).await;
        assert_eq!(next_json(&mut ws).await["event"], "CONN");
        ws
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(path);
        if let Some(token) = token {
            request = request.header(header::COOKIE, format!("session={}", token));
        }

        let response = app(self.state.clone())
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }
}

async fn next_message(ws: &mut Ws) -> Message {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match message {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

async fn next_json(ws: &mut Ws) -> Value {
    match next_message(ws).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected text frame, got {:?}", other),
    }
}

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_chat_flow() {
    let server = TestServer::start().await;
    let (alice_id, bob_id) = (Uuid::now_v7(), Uuid::now_v7());
    let mut alice = server.join(alice_id).await;
    let mut bob = server.join(bob_id).await;
    assert_eq!(server.state.hub().online_count(), 2);

    send(&mut alice, json!({"event": "JOIN", "content": bob_id})).await;
    let joined = next_json(&mut alice).await;
    assert_eq!(joined["event"], "CHATS");
    assert_eq!(joined["user_id"], bob_id.to_string());
    assert_eq!(joined["unread_messages"], 0);

    // Bob is online but not viewing: Alice gets the echo, Bob a bump
    send(&mut alice, json!({"event": "MSG", "content": "hello", "tag": "t1"})).await;
    let echo = next_json(&mut alice).await;
    assert_eq!(echo["event"], "MSG");
    assert_eq!(echo["tag"], "t1");
    assert_eq!(echo["author"], true);
    assert_eq!(echo["chat_id"], bob_id.to_string());
    assert!(echo["read_at"].is_null());

    let bump = next_json(&mut bob).await;
    assert_eq!(bump["event"], "CHATS");
    assert_eq!(bump["user_id"], alice_id.to_string());
    assert_eq!(bump["unread_messages"], 1);
    assert_eq!(bump["content"], "hello");

    // Bob opens the conversation while Alice is viewing it
    send(&mut bob, json!({"event": "JOIN", "content": alice_id})).await;
    let receipt = next_json(&mut bob).await;
    assert_eq!(receipt["event"], "READ");
    assert_eq!(receipt["sender_id"], alice_id.to_string());
    assert_eq!(receipt["receiver_id"], bob_id.to_string());
    assert_eq!(next_json(&mut bob).await["event"], "CHATS");

    let receipt = next_json(&mut alice).await;
    assert_eq!(receipt["event"], "READ");
    assert_eq!(receipt["sender_id"], alice_id.to_string());

    send(&mut alice, json!({"event": "MSG", "content": "again"})).await;
    assert_eq!(next_json(&mut alice).await["event"], "MSG");
    let pushed = next_json(&mut bob).await;
    assert_eq!(pushed["event"], "MSG");
    assert_eq!(pushed["author"], false);
    assert_eq!(pushed["chat_id"], alice_id.to_string());
    assert!(!pushed["read_at"].is_null());
    assert!(pushed.get("tag").is_none());

    // History and chat list over REST
    let bob_token = server.token(bob_id);
    let (status, history) = server
        .get(&format!("/api/v1/chats/{}?limit=500", alice_id), Some(&bob_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["content"], "hello");
    assert_eq!(history[1]["content"], "again");
    assert_eq!(history[0]["author"], false);

    let (status, chats) = server.get("/api/v1/chats", Some(&bob_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chats[0]["user_id"], alice_id.to_string());
    assert_eq!(chats[0]["unread_messages"], 0);
    assert_eq!(chats[0]["content"], "again");
}

#[tokio::test]
async fn test_unauthorized_connection_is_closed() {
    let server = TestServer::start().await;
    let mut ws = server.connect("not-a-token").await;

    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 1008);
            let reason: Value = serde_json::from_str(&frame.reason).unwrap();
            assert_eq!(reason["error"]["code"], 401);
            assert_eq!(reason["error"]["name"], "unauthorized");
        }
        other => panic!("Expected close frame, got {:?}", other),
    }
    assert_eq!(server.state.hub().online_count(), 0);
}

#[tokio::test]
async fn test_bad_frames_keep_connection_open() {
    let server = TestServer::start().await;
    let mut alice = server.join(Uuid::now_v7()).await;

    alice.send(Message::Text("{not json".into())).await.unwrap();
    let error = next_json(&mut alice).await;
    assert_eq!(error["event"], "ERROR");
    assert_eq!(error["code"], 400);

    send(&mut alice, json!({"event": "MSG", "content": "nobody here"})).await;
    assert_eq!(next_json(&mut alice).await["name"], "no-active-conversation");

    send(&mut alice, json!({"event": "TYPING"})).await;
    send(&mut alice, json!({"event": "JOIN", "content": "nope"})).await;
    assert_eq!(next_json(&mut alice).await["name"], "invalid-user-id");
}

#[tokio::test]
async fn test_notification_reaches_both_sides() {
    let server = TestServer::start().await;
    let (alice_id, bob_id) = (Uuid::now_v7(), Uuid::now_v7());
    let mut alice = server.join(alice_id).await;
    let mut bob = server.join(bob_id).await;
    let appointment = Uuid::now_v7();

    server
        .state
        .notifications
        .publish(
            Attachment::Appointment(appointment),
            "Appointment created",
            alice_id,
            bob_id,
        )
        .await
        .unwrap();

    let mine = next_json(&mut alice).await;
    assert_eq!(mine["author"], true);
    assert_eq!(mine["chat_id"], bob_id.to_string());
    assert_eq!(mine["attachment"]["appointment_id"], appointment.to_string());

    let theirs = next_json(&mut bob).await;
    assert_eq!(theirs["author"], false);
    assert_eq!(theirs["chat_id"], alice_id.to_string());
    assert_eq!(theirs["message_id"], mine["message_id"]);
}

#[tokio::test]
async fn test_rest_requires_session() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/api/v1/chats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["name"], "unauthorized");

    let (status, body) = server.get("/api/v1/chats?query=x", Some("forged")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], 401);

    let token = server.token(Uuid::now_v7());
    let (status, body) = server.get("/api/v1/chats/not-a-uuid", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["name"], "invalid-user-id");

    let (status, body) = server.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_chat_list_search_by_name() {
    let server = TestServer::start().await;
    let (me, ana_id, bob_id) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

    // Names are learned when each user authenticates
    let mut ana = server.connect(&server.named_token(ana_id, "Ana Lima")).await;
    assert_eq!(next_json(&mut ana).await["event"], "CONN");
    let mut bob = server.connect(&server.named_token(bob_id, "Bob Stone")).await;
    assert_eq!(next_json(&mut bob).await["event"], "CONN");

    for (ws, peer) in [(&mut ana, ana_id), (&mut bob, bob_id)] {
        send(ws, json!({"event": "JOIN", "content": me})).await;
        assert_eq!(next_json(ws).await["event"], "CHATS");
        send(ws, json!({"event": "MSG", "content": format!("hi from {}", peer)})).await;
        assert_eq!(next_json(ws).await["event"], "MSG");
    }

    let token = server.named_token(me, "Mia Costa");
    let (status, chats) = server.get("/api/v1/chats", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chats.as_array().unwrap().len(), 2);

    let (status, chats) = server.get("/api/v1/chats?query=LIMA", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let chats = chats.as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["user_id"], ana_id.to_string());
    assert_eq!(chats[0]["display_name"], "Ana Lima");
    assert_eq!(chats[0]["unread_messages"], 1);

    // Ana searching finds the caller by the name from their REST session
    let (_, chats) = server
        .get("/api/v1/chats?query=costa", Some(&server.token(ana_id)))
        .await;
    assert_eq!(chats[0]["user_id"], me.to_string());
}
