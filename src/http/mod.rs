//! # HTTP Request Listener
//!
//! Accepts send requests from the HTML form (or any client that can POST an
//! urlencoded body) and turns each recipient into a queued [`Message`].
//!
//! | Request                               | Response                         |
//! |---------------------------------------|----------------------------------|
//! | `POST <submit_path>` valid            | 200 "Message(s) Queued"          |
//! | `POST <submit_path>` invalid          | 400 with the validation message  |
//! | `POST` anything else                  | 303 to the form                  |
//! | `GET <form_path>` / `<stylesheet_path>` | 200 with caching headers, or 304 |
//! | `GET /`, `*.html`, `*.htm`            | 302 to the form                  |
//! | anything else                         | 404 "Page Not Found"             |
//!
//! Every request is reported through [`GatewayHooks::http_activity`] and
//! every response carries `Server: SmsGateway/<version>`.

pub mod pages;

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Local, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::gateway::{
    GatewayHooks, Lifecycle, LifecycleState, Message, PriorityReentryQueue, QueueFull,
    DISPLAY_TIME_FORMAT,
};
use crate::logutil::escape_log;
use crate::metrics;
use crate::validation::{validate_submission, Submission};
use pages::{Asset, SERVER_SOFTWARE};

/// Larger bodies are treated as carrying no form data.
const MAX_FORM_BYTES: usize = 64 * 1024;

const QUEUED_TITLE: &str = "Message(s) Queued";
const QUEUED_TEXT: &str = "Your message(s) have been added to the queue to be sent.";
const NOT_FOUND_TITLE: &str = "Page Not Found";
const NOT_FOUND_TEXT: &str = "The requested page could not be found.";
const QUEUE_FULL_TITLE: &str = "Queue Full";
const QUEUE_FULL_TEXT: &str = "The message queue is full, please try again later.";

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind HTTP listener to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state for the request handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    queue: Arc<PriorityReentryQueue<Message>>,
    hooks: Arc<dyn GatewayHooks>,
    /// Reported as `Last-Modified` for the embedded assets.
    started: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        queue: Arc<PriorityReentryQueue<Message>>,
        hooks: Arc<dyn GatewayHooks>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            queue,
            hooks,
            started: Utc::now(),
        }
    }
}

/// Build the router. Paths are configurable, so routing happens in a single
/// fallback handler rather than through fixed routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(middleware::from_fn_with_state(state.clone(), record_activity))
        .with_state(state)
}

/// Handle to the running HTTP server task.
#[derive(Clone)]
pub struct RequestListener {
    lifecycle: Lifecycle,
    local_addr: SocketAddr,
}

impl RequestListener {
    /// Bind the configured address and start serving in the background.
    /// Binding happens before this returns, so a busy port is reported here.
    pub async fn start(
        config: ServerConfig,
        queue: Arc<PriorityReentryQueue<Message>>,
        hooks: Arc<dyn GatewayHooks>,
    ) -> Result<Self, ListenerError> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ListenerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        debug!("HTTP listener bound to {}", local_addr);

        let handle = Self {
            lifecycle: Lifecycle::new(),
            local_addr,
        };
        handle.lifecycle.mark_running();

        let app = router(AppState::new(config, queue, hooks.clone()));
        let lifecycle = handle.lifecycle.clone();
        tokio::spawn(async move {
            let stop = lifecycle.clone();
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { stop.stop_requested().await })
            .await;
            if let Err(e) = served {
                error!("HTTP server failed: {}", e);
            }
            hooks.listener_exited();
            lifecycle.mark_stopped();
        });

        Ok(handle)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections; in-flight requests are allowed to finish.
    pub fn stop(&self) {
        self.lifecycle.request_stop();
    }

    pub async fn wait(&self) {
        self.lifecycle.wait_stopped().await;
    }

    pub fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }
}

/// Emit the activity line and stamp the `Server` header.
async fn record_activity(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let line = format!(
        "{} - {}:{} - {} {} {:?} - {}",
        Local::now().format(DISPLAY_TIME_FORMAT),
        peer.ip(),
        peer.port(),
        request.method(),
        escape_log(&request.uri().to_string()),
        request.version(),
        escape_log(user_agent)
    );
    state.hooks.http_activity(&line);

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(SERVER_SOFTWARE));
    response
}

async fn handle_request(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    match &method {
        &Method::POST if path == state.config.submit_path => submit(&state, peer, request).await,
        &Method::POST => pages::redirect(StatusCode::SEE_OTHER, &state.config.form_path),
        &Method::GET => serve_get(&state, &path, request.headers()),
        _ => not_found(&state),
    }
}

fn serve_get(state: &AppState, path: &str, headers: &HeaderMap) -> Response {
    let config = &state.config;
    if path == config.form_path {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let form = pages::render_form(config, &pages::escape_html(host));
        Asset::new(form, "text/html; charset=utf-8", state.started)
            .respond(headers, config.asset_max_age())
    } else if path == config.stylesheet_path {
        Asset::new(pages::render_stylesheet(), "text/css", state.started)
            .respond(headers, config.asset_max_age())
    } else if path == "/" || path.ends_with(".html") || path.ends_with(".htm") {
        pages::redirect(StatusCode::FOUND, &config.form_path)
    } else {
        not_found(state)
    }
}

fn not_found(state: &AppState) -> Response {
    pages::status_page(&state.config, StatusCode::NOT_FOUND, NOT_FOUND_TITLE, NOT_FOUND_TEXT)
}

async fn submit(state: &AppState, peer: SocketAddr, request: Request) -> Response {
    let received = Local::now();
    let fields = match to_bytes(request.into_body(), MAX_FORM_BYTES).await {
        Ok(body) => parse_form(&body),
        Err(e) => {
            debug!("Unreadable request body from {}: {}", peer, e);
            HashMap::new()
        }
    };

    let submission = match validate_submission(
        fields.get("recipients").map(String::as_str),
        fields.get("message").map(String::as_str),
        fields.get("class").map(String::as_str),
    ) {
        Ok(submission) => submission,
        Err(e) => {
            metrics::inc_requests_rejected();
            info!(target: "http", "Rejected request from {}: {}", peer.ip(), e);
            return pages::status_page(&state.config, StatusCode::BAD_REQUEST, "Error", &e.to_string());
        }
    };

    match enqueue_submission(state, submission, received, &peer.ip().to_string()) {
        Ok(count) => {
            debug!("Queued {} message(s) from {}", count, peer.ip());
            pages::status_page(&state.config, StatusCode::OK, QUEUED_TITLE, QUEUED_TEXT)
        }
        Err(full) => {
            warn!(
                "Queue full ({} messages), refusing request for {}",
                full.capacity,
                escape_log(&full.item.recipient)
            );
            pages::status_page(
                &state.config,
                StatusCode::SERVICE_UNAVAILABLE,
                QUEUE_FULL_TITLE,
                QUEUE_FULL_TEXT,
            )
        }
    }
}

/// One queue item per recipient, in submission order. Stops at the first
/// recipient that does not fit into a bounded queue; earlier recipients stay
/// queued. Observers hear about a message only once its slot is secured.
fn enqueue_submission(
    state: &AppState,
    submission: Submission,
    received: DateTime<Local>,
    origin: &str,
) -> Result<usize, QueueFull<Message>> {
    let mut queued = 0;
    for recipient in submission.recipients {
        let message = Message::new(
            received,
            recipient,
            submission.class,
            submission.body.clone(),
            origin,
        );
        let mut slot = state.queue.reserve(message)?;
        if let Some(message) = slot.item_mut() {
            state.hooks.message_received(message);
        }
        slot.commit();
        metrics::inc_messages_queued();
        queued += 1;
    }
    Ok(queued)
}

/// Decode an `application/x-www-form-urlencoded` body. The first value of a
/// repeated field wins and blank values are dropped.
pub fn parse_form(body: &[u8]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for pair in body.split(|b| *b == b'&') {
        let mut parts = pair.splitn(2, |b| *b == b'=');
        let key = decode_component(parts.next().unwrap_or_default());
        let value = decode_component(parts.next().unwrap_or_default());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        fields.entry(key).or_insert(value);
    }
    fields
}

fn decode_component(raw: &[u8]) -> String {
    let spaced: Vec<u8> = raw
        .iter()
        .map(|b| if *b == b'+' { b' ' } else { *b })
        .collect();
    String::from_utf8_lossy(&urlencoding::decode_binary(&spaced)).into_owned()
}
