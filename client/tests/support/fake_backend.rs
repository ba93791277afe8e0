//! In-process fake EVLink backend and GoTrue service.
//!
//! The harness owns a single-threaded Tokio runtime plus a `LocalSet` because
//! Actix uses `spawn_local` internally. Both the backend API and the identity
//! endpoints are served from one listener so a single base URL serves as
//! backend and identity URL. Dropping the harness stops the server.

use std::collections::HashSet;
use std::future::Future;
use std::net::TcpListener;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::http::header;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use tokio::task::LocalSet;
use url::Url;

pub const USER_ID: &str = "42";
pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "correct horse";
pub const ANON_KEY: &str = "anon-key";
pub const KNOWN_LINK_CODE: &str = "invite-9";

/// One request the backend saw, excluding identity endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct BackendState {
    accepted_tokens: HashSet<String>,
    refresh_tokens: HashSet<String>,
    issued: u32,
    requests: Vec<RecordedRequest>,
    grants: Vec<String>,
    link_code_uses: Vec<Value>,
    logouts: usize,
}

/// State shared between the server workers and the test.
#[derive(Clone, Default)]
pub struct SharedState(Arc<Mutex<BackendState>>);

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept `token` as a valid bearer without a sign-in.
    pub fn accept_token(&self, token: &str) {
        self.lock().accepted_tokens.insert(token.to_owned());
    }

    /// Reject every access token issued so far.
    pub fn expire_access_tokens(&self) {
        self.lock().accepted_tokens.clear();
    }

    /// Reject every refresh token issued so far.
    pub fn revoke_refresh_tokens(&self) {
        self.lock().refresh_tokens.clear();
    }

    /// Backend requests in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Backend requests whose path equals `path`.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    /// Grant types requested from the token endpoint.
    pub fn grants(&self) -> Vec<String> {
        self.lock().grants.clone()
    }

    /// Bodies posted to the linking code endpoint.
    pub fn link_code_uses(&self) -> Vec<Value> {
        self.lock().link_code_uses.clone()
    }

    /// Number of logout calls.
    pub fn logouts(&self) -> usize {
        self.lock().logouts
    }

    fn record(&self, request: RecordedRequest) {
        self.lock().requests.push(request);
    }

    fn accepts(&self, authorization: Option<&str>) -> bool {
        authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| self.lock().accepted_tokens.contains(token))
    }

    fn issue(&self) -> Value {
        let mut state = self.lock();
        state.issued += 1;
        let access_token = format!("tok{}", state.issued);
        let refresh_token = format!("r{}", state.issued);
        state.accepted_tokens.insert(access_token.clone());
        state.refresh_tokens.insert(refresh_token.clone());
        json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": refresh_token,
            "user": {
                "id": USER_ID,
                "email": EMAIL,
                "app_metadata": { "provider": "email", "role": "admin" },
                "user_metadata": { "full_name": "Ada Lovelace" }
            }
        })
    }
}

/// Running fake server with the runtime that drives it.
pub struct FakeBackend {
    runtime: Runtime,
    local: LocalSet,
    base_url: Url,
    server: ServerHandle,
    state: SharedState,
}

impl FakeBackend {
    /// Bind an ephemeral port and start serving.
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        let local = LocalSet::new();
        let state = SharedState::default();
        let (base_url, server) = local
            .block_on(&runtime, spawn_server(state.clone()))
            .expect("fake backend should start");
        Self {
            runtime,
            local,
            base_url,
            server,
            state,
        }
    }

    /// Base URL for both backend and identity requests.
    pub fn base_url(&self) -> Url {
        self.base_url.clone()
    }

    /// Shared server state.
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Drive `future` to completion on the harness runtime.
    pub fn run<F: Future>(&self, future: F) -> F::Output {
        self.local.block_on(&self.runtime, future)
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        let server = self.server.clone();
        self.local.block_on(&self.runtime, async move {
            server.stop(true).await;
        });
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn spawn_server(state: SharedState) -> Result<(Url, ServerHandle), String> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(|err| err.to_string())?;
    let addr = listener.local_addr().map_err(|err| err.to_string())?;
    let data = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/auth/v1/token", web::post().to(token))
            .route("/auth/v1/logout", web::post().to(logout))
            .default_service(web::to(backend))
    })
    .disable_signals()
    .workers(1)
    .listen(listener)
    .map_err(|err| err.to_string())?
    .run();

    let handle = server.handle();
    actix_web::rt::spawn(server);

    let base_url = Url::parse(&format!("http://{addr}")).map_err(|err| err.to_string())?;
    Ok((base_url, handle))
}

fn header_value(request: &HttpRequest, name: header::HeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

#[derive(Deserialize)]
struct GrantQuery {
    grant_type: String,
}

async fn token(
    state: web::Data<SharedState>,
    request: HttpRequest,
    query: web::Query<GrantQuery>,
    body: web::Json<Value>,
) -> HttpResponse {
    let api_key = request
        .headers()
        .get("apikey")
        .and_then(|value| value.to_str().ok());
    if api_key != Some(ANON_KEY) {
        return HttpResponse::Unauthorized().json(json!({ "message": "Invalid API key" }));
    }
    state.lock().grants.push(query.grant_type.clone());

    match query.grant_type.as_str() {
        "password" => {
            let matches = body.get("email").and_then(Value::as_str) == Some(EMAIL)
                && body.get("password").and_then(Value::as_str) == Some(PASSWORD);
            if matches {
                HttpResponse::Ok().json(state.issue())
            } else {
                HttpResponse::BadRequest().json(json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid login credentials"
                }))
            }
        }
        "refresh_token" => {
            let presented = body
                .get("refresh_token")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let known = state.lock().refresh_tokens.remove(&presented);
            if known {
                HttpResponse::Ok().json(state.issue())
            } else {
                HttpResponse::BadRequest().json(json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid Refresh Token: Refresh Token Not Found"
                }))
            }
        }
        _ => HttpResponse::BadRequest().json(json!({ "msg": "unsupported grant_type" })),
    }
}

async fn logout(state: web::Data<SharedState>) -> HttpResponse {
    state.lock().logouts += 1;
    HttpResponse::NoContent().finish()
}

async fn backend(
    state: web::Data<SharedState>,
    request: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let authorization = header_value(&request, header::AUTHORIZATION);
    let path = request.path().to_owned();
    state.record(RecordedRequest {
        method: request.method().as_str().to_owned(),
        path: path.clone(),
        authorization: authorization.clone(),
        content_type: header_value(&request, header::CONTENT_TYPE),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    if let Some(response) = public_route(&state, &request, &path, &body).await {
        return response;
    }
    if !state.accepts(authorization.as_deref()) {
        return HttpResponse::Unauthorized().json(json!({ "detail": "Token expired" }));
    }

    match (request.method().as_str(), path.as_str()) {
        ("GET", "/user/42/subscription") => HttpResponse::Ok().json(json!({
            "tier": "pro",
            "subscription_id": "sub_1",
            "plan_name": "Pro",
            "status": "active"
        })),
        ("GET", "/me") => HttpResponse::Ok().json(json!({
            "id": USER_ID,
            "email": EMAIL,
            "name": "Ada Lovelace",
            "role": "admin",
            "is_approved": true,
            "accepted_terms": true
        })),
        ("GET", "/api/admin/users") => {
            HttpResponse::Forbidden().json(json!({ "detail": "Admin access required" }))
        }
        ("GET", "/api/charging/sessions/export/csv") => {
            let vehicle = request
                .query_string()
                .strip_prefix("vehicle_id=")
                .unwrap_or("all")
                .to_owned();
            HttpResponse::Ok()
                .content_type("text/csv")
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"sessions_{vehicle}.csv\""),
                ))
                .body("id,kwh\n1,7.2\n")
        }
        _ => HttpResponse::NotFound().json(json!({ "detail": "Not Found" })),
    }
}

async fn public_route(
    state: &SharedState,
    request: &HttpRequest,
    path: &str,
    body: &[u8],
) -> Option<HttpResponse> {
    if path == "/public/echo" {
        let payload: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        return Some(HttpResponse::Ok().json(json!({ "echo": payload })));
    }
    if path == "/public/empty" {
        return Some(HttpResponse::NoContent().finish());
    }
    if path == "/public/slow" {
        tokio::time::sleep(Duration::from_secs(2)).await;
        return Some(HttpResponse::Ok().json(json!({ "late": true })));
    }
    if path == "/public/unavailable" {
        return Some(HttpResponse::ServiceUnavailable().finish());
    }
    if path == "/public/validation" {
        return Some(HttpResponse::UnprocessableEntity().json(json!({
            "detail": [
                { "loc": ["body", "email"], "msg": "field required" },
                { "loc": ["body", "name"], "msg": "too short" }
            ]
        })));
    }
    if path == "/api/public/access-code/use" && request.method() == actix_web::http::Method::POST
    {
        let payload: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        state.lock().link_code_uses.push(payload);
        return Some(HttpResponse::Ok().json(json!({ "status": "linked" })));
    }
    if let Some(code) = path.strip_prefix("/api/public/access-code/") {
        return Some(if code == KNOWN_LINK_CODE {
            HttpResponse::Ok().json(json!({ "email": EMAIL, "name": "Ada Lovelace" }))
        } else {
            HttpResponse::NotFound().json(json!({ "detail": "Access code not found" }))
        });
    }
    None
}
