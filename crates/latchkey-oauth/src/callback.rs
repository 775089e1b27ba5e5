//! Loopback HTTP listener that receives the OAuth redirect.
//!
//! Lives for exactly one authorization attempt. The first request on the
//! redirect path is validated, answered with a terminal HTML page and handed
//! to the waiting orchestrator; later requests get `410 Gone`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router as AxumRouter,
    extract::{RawQuery, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use url::{Host, Url};

use crate::error::{OAuthError, Result};
use crate::outcome::{AuthErrorCode, AuthFailure};

/// Grace period for in-flight responses when the listener stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// What the redirect told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Code(String),
    Failed(AuthFailure),
}

/// Validate a callback query against the issued state.
///
/// Order matters: state first, then provider `error` (which wins even when a
/// `code` is also present), then the code itself.
pub fn evaluate_callback(query: &str, expected_state: &str) -> CallbackResult {
    let mut state = None;
    let mut code = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return CallbackResult::Failed(AuthFailure::new(
            AuthErrorCode::StateMismatch,
            "callback state does not match the issued state",
        ));
    }

    if let Some(error) = error {
        return CallbackResult::Failed(AuthFailure::from_provider(
            &error,
            error_description.as_deref(),
        ));
    }

    match code {
        Some(code) if !code.is_empty() => CallbackResult::Code(code),
        _ => CallbackResult::Failed(AuthFailure::new(
            AuthErrorCode::NoCode,
            "callback carried neither code nor error",
        )),
    }
}

/// Where to bind and what to serve, derived from the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RedirectTarget {
    addr: SocketAddr,
    path: String,
    url: Url,
}

fn parse_redirect_uri(redirect_uri: &str) -> Result<RedirectTarget> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| OAuthError::Config(format!("Invalid redirect URI '{}': {}", redirect_uri, e)))?;

    if url.scheme() != "http" {
        return Err(OAuthError::Config(format!(
            "Redirect URI must use http:// for a loopback listener: {}",
            redirect_uri
        )));
    }

    let ip = match url.host() {
        Some(Host::Ipv4(ip)) if ip.is_loopback() => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) if ip.is_loopback() => IpAddr::V6(ip),
        Some(Host::Domain("localhost")) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        _ => {
            return Err(OAuthError::Config(format!(
                "Redirect URI host must be a loopback address: {}",
                redirect_uri
            )));
        }
    };

    let port = url.port_or_known_default().unwrap_or(80);
    Ok(RedirectTarget {
        addr: SocketAddr::new(ip, port),
        path: url.path().to_string(),
        url,
    })
}

struct CallbackState {
    expected_state: String,
    sender: Mutex<Option<oneshot::Sender<CallbackResult>>>,
}

/// A running loopback listener.
pub struct CallbackListener {
    redirect_uri: String,
    local_addr: SocketAddr,
    result_rx: Option<oneshot::Receiver<CallbackResult>>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind the redirect URI and start serving.
    ///
    /// A port of `0` binds an ephemeral port; [`redirect_uri`](Self::redirect_uri)
    /// then reports the rewritten URI. Otherwise the URI is kept verbatim.
    pub async fn bind(redirect_uri: &str, expected_state: impl Into<String>) -> Result<Self> {
        let target = parse_redirect_uri(redirect_uri)?;
        let listener = TcpListener::bind(target.addr).await?;
        let local_addr = listener.local_addr()?;

        let redirect_uri = if target.addr.port() == 0 {
            let mut url = target.url.clone();
            url.set_port(Some(local_addr.port())).map_err(|_| {
                OAuthError::Config(format!("Cannot set port on redirect URI {}", redirect_uri))
            })?;
            url.to_string()
        } else {
            redirect_uri.to_string()
        };

        let (result_tx, result_rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            expected_state: expected_state.into(),
            sender: Mutex::new(Some(result_tx)),
        });

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let app = router(&target.path, state);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
            {
                tracing::error!(error = %e, "OAuth callback listener failed");
            }
        });

        tracing::debug!(addr = %local_addr, redirect_uri = %redirect_uri, "Callback listener started");
        Ok(Self {
            redirect_uri,
            local_addr,
            result_rx: Some(result_rx),
            shutdown,
            handle: Some(handle),
        })
    }

    /// The redirect URI to send to the provider.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the callback. `None` if the listener died without one, or if
    /// the result was already taken.
    pub async fn wait(&mut self) -> Option<CallbackResult> {
        let rx = self.result_rx.take()?;
        rx.await.ok()
    }

    /// Stop serving and release the port.
    pub async fn shutdown(mut self) {
        // Late redirects must not be told they succeeded.
        drop(self.result_rx.take());
        self.shutdown.cancel();
        if let Some(mut handle) = self.handle.take()
            && tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err()
        {
            tracing::warn!(addr = %self.local_addr, "Callback listener did not drain in time; aborting");
            handle.abort();
            let _ = handle.await;
        }
        tracing::debug!(addr = %self.local_addr, "Callback listener stopped");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn router(path: &str, state: Arc<CallbackState>) -> AxumRouter {
    AxumRouter::new()
        .route(path, get(handle_callback))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let Some(sender) = state.sender.lock().take() else {
        return html_page(
            StatusCode::GONE,
            "Already handled",
            "This sign-in request was already completed. You can close this window.",
        );
    };

    // Nobody is waiting: the attempt timed out or was cancelled first.
    if sender.is_closed() {
        tracing::debug!("Callback arrived after the attempt was abandoned");
        return html_page(
            StatusCode::GONE,
            "Sign-in expired",
            "This sign-in request is no longer pending. Return to the application and start again.",
        );
    }

    let result = evaluate_callback(query.as_deref().unwrap_or(""), &state.expected_state);
    let page = match &result {
        CallbackResult::Code(_) => html_page(
            StatusCode::OK,
            "Signed in",
            "Authentication complete. You can close this window and return to the application.",
        ),
        CallbackResult::Failed(failure) => {
            tracing::warn!(code = %failure.code, message = %failure.message, "OAuth callback rejected");
            html_page(StatusCode::BAD_REQUEST, "Sign-in failed", &failure.user_message)
        }
    };

    if sender.send(result).is_err() {
        tracing::debug!("Callback arrived after the attempt was abandoned");
    }
    page
}

async fn handle_not_found() -> Response {
    html_page(StatusCode::NOT_FOUND, "Not found", "Nothing to see here.")
}

fn html_page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family:sans-serif;text-align:center;margin-top:4em\">\
         <h1>{title}</h1><p>{message}</p></body></html>",
        title = escape_html(title),
        message = escape_html(message),
    );
    (
        status,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
            (header::CONNECTION, "close"),
        ],
        body,
    )
        .into_response()
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
