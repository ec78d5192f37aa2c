//! In-process SkillSwap backend for integration tests.
//!
//! Sessions are identified by the `sessionid` cookie. The backend enforces the
//! same status machine the client guards against, so a stale guard gets a
//! real 400 back.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration as TimeDelta, TimeZone, Utc};
use serde_json::{json, Value};
use skillswap_client::{ApiClient, AuthSession};
use skillswap_shared::{
    CreateSkillRequest, MarkAllReadRequest, OfferId, OfferSummary, RequestAction, RequestId,
    RequestList, RequestStatus, SkillRequest, TransitionRequest, UnreadCount, UserId,
};

pub const ALICE: UserId = 10;
pub const BOB: UserId = 20;

/// What the socket endpoint does with an authenticated upgrade
#[derive(Debug, Clone)]
pub enum SocketScript {
    /// Send these frames, then stay open.
    Push(Vec<String>),
    /// Close immediately with this code.
    CloseWith(u16),
}

#[derive(Default)]
pub struct BackendState {
    /// session token -> user
    pub sessions: HashMap<String, UserId>,
    /// Tokens that are rejected but may be refreshed.
    pub expired: HashMap<String, UserId>,
    pub refresh_enabled: bool,
    pub refresh_calls: usize,
    pub offers: HashMap<OfferId, UserId>,
    pub requests: Vec<SkillRequest>,
    pub hidden: HashSet<(RequestId, UserId)>,
    pub unread: HashMap<UserId, u64>,
    pub mark_all_read_calls: usize,
    pub list_queries: Vec<Option<String>>,
    pub fail_lists: bool,
    pub socket_script: Option<SocketScript>,
    pub socket_upgrades: usize,
    pub socket_rejections: usize,
    next_id: RequestId,
    tick: i64,
}

impl BackendState {
    fn now(&mut self) -> DateTime<Utc> {
        self.tick += 1;
        base_time() + TimeDelta::minutes(self.tick)
    }

    pub fn seed_request(
        &mut self,
        requester: UserId,
        recipient: UserId,
        status: RequestStatus,
    ) -> RequestId {
        self.next_id += 1;
        let now = self.now();
        let id = self.next_id;
        self.requests.push(SkillRequest {
            id,
            requester,
            recipient,
            offer: 100 + id,
            offer_details: Some(OfferSummary {
                subcategory: Some("Guitar".into()),
                is_seeking: false,
                is_hidden: false,
                price: Some("25.00".into()),
                owner: recipient,
            }),
            status,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn status_of(&self, id: RequestId) -> Option<RequestStatus> {
        self.requests.iter().find(|r| r.id == id).map(|r| r.status)
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub type Shared = Arc<Mutex<BackendState>>;

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Shared,
}

impl MockBackend {
    pub async fn start() -> Self {
        let mut initial = BackendState {
            refresh_enabled: true,
            ..BackendState::default()
        };
        initial.sessions.insert("alice".into(), ALICE);
        initial.sessions.insert("bob".into(), BOB);
        initial.offers.insert(1, BOB);
        initial.offers.insert(2, ALICE);
        let state = Arc::new(Mutex::new(initial));

        let app = Router::new()
            .route("/api/requests/", get(list_requests).post(create_request))
            .route("/api/requests/{id}/", patch(transition_request))
            .route("/api/requests/{id}/request-completion/", post(request_completion))
            .route("/api/requests/{id}/confirm-completion/", post(confirm_completion))
            .route("/api/notifications/unread-count/", get(unread_count))
            .route("/api/notifications/mark-all-read/", post(mark_all_read))
            .route("/api/auth/refresh/", post(refresh))
            .route("/ws/notifications/", get(socket))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    /// Session for `user` holding the given session token.
    pub fn session(&self, user: UserId, token: &str) -> AuthSession {
        let session = AuthSession::new(user, &self.api_base()).unwrap();
        session.seed_cookie(&format!("sessionid={token}; Path=/"));
        session
    }

    pub fn client(&self, user: UserId, token: &str) -> ApiClient {
        self.session(user, token).client(Duration::from_secs(5)).unwrap()
    }
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// --- Handlers ---

type Failure = (StatusCode, Json<Value>);

fn failure(status: StatusCode, body: Value) -> Failure {
    (status, Json(body))
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .find_map(|pair| pair.trim().strip_prefix("sessionid="))
        .map(str::to_string)
}

fn authenticate(state: &BackendState, headers: &HeaderMap) -> Result<UserId, Failure> {
    session_token(headers)
        .and_then(|token| state.sessions.get(&token).copied())
        .ok_or_else(|| {
            failure(
                StatusCode::UNAUTHORIZED,
                json!({"detail": "Authentication credentials were not provided."}),
            )
        })
}

async fn list_requests(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<RequestList>, Failure> {
    let mut state = state.lock().unwrap();
    let viewer = authenticate(&state, &headers)?;
    state.list_queries.push(query.get("status").cloned());
    if state.fail_lists {
        return Err(failure(StatusCode::INTERNAL_SERVER_ERROR, json!({})));
    }

    let wanted: Option<Vec<String>> = query
        .get("status")
        .map(|raw| raw.split(',').map(str::to_string).collect());
    let visible = state.requests.iter().filter(|r| {
        !state.hidden.contains(&(r.id, viewer))
            && wanted
                .as_ref()
                .map_or(true, |w| w.iter().any(|s| s == r.status.as_str()))
    });

    let mut list = RequestList::default();
    for request in visible {
        if request.recipient == viewer {
            list.received.push(request.clone());
        } else if request.requester == viewer {
            list.sent.push(request.clone());
        }
    }
    Ok(Json(list))
}

async fn create_request(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CreateSkillRequest>,
) -> Result<(StatusCode, Json<SkillRequest>), Failure> {
    let mut state = state.lock().unwrap();
    let viewer = authenticate(&state, &headers)?;
    let owner = *state
        .offers
        .get(&body.offer_id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, json!({"detail": "Offer not found."})))?;
    if owner == viewer {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            json!({"error": "You cannot request your own offer."}),
        ));
    }
    let id = state.seed_request(viewer, owner, RequestStatus::Pending);
    let created = state.requests.iter().find(|r| r.id == id).cloned().unwrap();
    Ok((StatusCode::CREATED, Json(created)))
}

fn act(
    state: &mut BackendState,
    headers: &HeaderMap,
    id: RequestId,
    action: RequestAction,
) -> Result<Json<SkillRequest>, Failure> {
    let viewer = authenticate(state, headers)?;
    let now = state.now();
    let index = state
        .requests
        .iter()
        .position(|r| r.id == id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, json!({"detail": "Not found."})))?;

    let request = &state.requests[index];
    if !request.is_action_enabled(viewer, action) {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            json!({
                "error": format!(
                    "Cannot {} a request that is {}.",
                    action.as_str(),
                    request.status
                )
            }),
        ));
    }
    match request.status.apply(action) {
        Some(next) => {
            let request = &mut state.requests[index];
            request.status = next;
            request.updated_at = now;
        }
        None => {
            state.hidden.insert((id, viewer));
        }
    }
    Ok(Json(state.requests[index].clone()))
}

async fn transition_request(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<RequestId>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<SkillRequest>, Failure> {
    act(&mut state.lock().unwrap(), &headers, id, body.action.into())
}

async fn request_completion(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<RequestId>,
) -> Result<Json<SkillRequest>, Failure> {
    act(&mut state.lock().unwrap(), &headers, id, RequestAction::RequestCompletion)
}

async fn confirm_completion(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<RequestId>,
) -> Result<Json<SkillRequest>, Failure> {
    act(&mut state.lock().unwrap(), &headers, id, RequestAction::ConfirmCompletion)
}

async fn unread_count(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<UnreadCount>, Failure> {
    let state = state.lock().unwrap();
    let viewer = authenticate(&state, &headers)?;
    if query.get("type").map(String::as_str) != Some("skill_request") {
        return Err(failure(StatusCode::BAD_REQUEST, json!({"detail": "Unknown type."})));
    }
    let count = state.unread.get(&viewer).copied().unwrap_or(0);
    Ok(Json(UnreadCount { count }))
}

async fn mark_all_read(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<MarkAllReadRequest>,
) -> Result<StatusCode, Failure> {
    let mut state = state.lock().unwrap();
    let viewer = authenticate(&state, &headers)?;
    if body.notification_type != "skill_request" {
        return Err(failure(StatusCode::BAD_REQUEST, json!({"detail": "Unknown type."})));
    }
    state.mark_all_read_calls += 1;
    state.unread.insert(viewer, 0);
    Ok(StatusCode::NO_CONTENT)
}

/// Trade an expired session token for a fresh one.
async fn refresh(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().unwrap();
    state.refresh_calls += 1;
    let expired = session_token(&headers).and_then(|token| state.expired.get(&token).copied());
    match expired {
        Some(user) if state.refresh_enabled => {
            let token = format!("renewed-{user}");
            state.sessions.insert(token.clone(), user);
            (
                [(header::SET_COOKIE, format!("sessionid={token}; Path=/"))],
                Json(json!({})),
            )
                .into_response()
        }
        _ => failure(StatusCode::UNAUTHORIZED, json!({"detail": "Refresh token expired."}))
            .into_response(),
    }
}

async fn socket(
    State(state): State<Shared>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let script = {
        let mut state = state.lock().unwrap();
        if authenticate(&state, &headers).is_err() {
            state.socket_rejections += 1;
            return StatusCode::UNAUTHORIZED.into_response();
        }
        state.socket_upgrades += 1;
        state.socket_script.clone().unwrap_or(SocketScript::Push(Vec::new()))
    };
    ws.on_upgrade(move |socket| serve_socket(socket, script))
}

async fn serve_socket(mut socket: WebSocket, script: SocketScript) {
    match script {
        SocketScript::Push(frames) => {
            for frame in frames {
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(message)) = socket.recv().await {
                if matches!(message, Message::Close(_)) {
                    return;
                }
            }
        }
        SocketScript::CloseWith(code) => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: "unauthorized".into(),
                })))
                .await;
        }
    }
}
