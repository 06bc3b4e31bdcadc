//! Browser session backed by the system browser and a local redirect listener.
//!
//! The redirect URI must be a loopback `http` URL (for example
//! `http://127.0.0.1:8765/checkout-complete`). The hosted checkout redirects
//! the browser there when it finishes, and the listener hands the full URL back
//! to the waiting session.

use async_trait::async_trait;
use axum::{extract::State, http::Uri, response::Html, routing::get, Router};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{BrowserOutcome, BrowserSession};
use crate::error::{ClientError, ClientResult};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const COMPLETE_PAGE: &str = "<!doctype html><html><body>\
<p>Checkout finished. You can close this window and return to the app.</p>\
</body></html>";

/// How the checkout URL is handed to a browser.
#[derive(Debug, Clone)]
pub enum UrlOpener {
    /// The platform's default opener (`xdg-open`, `open`, or the Windows URL
    /// protocol handler).
    System,
    /// A specific program, invoked with `args` followed by the URL.
    Command { program: String, args: Vec<String> },
    /// Print the URL to stderr and let the user open it.
    Print,
}

impl UrlOpener {
    async fn open(&self, url: &Url) -> ClientResult<()> {
        let (program, mut args) = match self {
            UrlOpener::Print => {
                eprintln!("Open this URL to complete checkout:\n  {url}");
                return Ok(());
            }
            UrlOpener::Command { program, args } => (program.clone(), args.clone()),
            UrlOpener::System => system_opener(std::env::consts::OS),
        };
        args.push(url.to_string());

        let status = tokio::process::Command::new(&program)
            .args(&args)
            .status()
            .await
            .map_err(|err| ClientError::BrowserSession(format!("failed to run {program}: {err}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(ClientError::BrowserSession(format!(
                "{program} exited with {status}"
            )))
        }
    }
}

/// Program and leading arguments that open a URL on `os`. The URL follows as
/// one final argument and never goes through a shell.
fn system_opener(os: &str) -> (String, Vec<String>) {
    match os {
        "macos" => ("open".to_string(), Vec::new()),
        "windows" => (
            "rundll32".to_string(),
            vec!["url.dll,FileProtocolHandler".to_string()],
        ),
        _ => ("xdg-open".to_string(), Vec::new()),
    }
}

// ---------------------------------------------------------------------------
// Redirect listener
// ---------------------------------------------------------------------------

type RedirectSlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

#[derive(Clone)]
struct RedirectState {
    base: Url,
    slot: RedirectSlot,
}

/// Router that answers the redirect URI's path and forwards the first
/// redirect URL it sees to `sender`. Later hits get the same page but are
/// not forwarded.
pub fn redirect_router(redirect: &Url, sender: oneshot::Sender<String>) -> Router {
    let path = match redirect.path() {
        "" => "/",
        path => path,
    };
    let state = RedirectState {
        base: redirect.clone(),
        slot: Arc::new(Mutex::new(Some(sender))),
    };

    Router::new()
        .route(path, get(complete))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn complete(State(state): State<RedirectState>, uri: Uri) -> Html<&'static str> {
    let mut url = state.base.clone();
    url.set_query(uri.query());

    let sender = state
        .slot
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match sender {
        Some(tx) => {
            debug!(%url, "checkout redirect received");
            let _ = tx.send(url.to_string());
        }
        None => debug!(%url, "duplicate checkout redirect ignored"),
    }

    Html(COMPLETE_PAGE)
}

/// Aborts the listener task when the session ends or is abandoned.
struct ListenerGuard {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ListenerGuard {
    /// Stop accepting connections and give in-flight responses a moment to
    /// be written.
    async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task).await;
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// LoopbackBrowser
// ---------------------------------------------------------------------------

/// [`BrowserSession`] that opens the system browser and listens on the
/// loopback redirect URI for the return.
#[derive(Debug, Clone)]
pub struct LoopbackBrowser {
    opener: UrlOpener,
}

impl LoopbackBrowser {
    pub fn new(opener: UrlOpener) -> Self {
        Self { opener }
    }

    /// The socket address a loopback redirect URI points at.
    pub fn listen_addr(redirect: &Url) -> ClientResult<SocketAddr> {
        if redirect.scheme() != "http" {
            return Err(ClientError::BrowserSession(format!(
                "redirect URI must use http for a loopback listener, got '{}'",
                redirect.scheme()
            )));
        }
        let host = match redirect.host_str() {
            Some("localhost") => "127.0.0.1",
            Some(host) => host.trim_start_matches('[').trim_end_matches(']'),
            None => {
                return Err(ClientError::BrowserSession(
                    "redirect URI has no host".to_string(),
                ))
            }
        };
        let port = redirect.port().ok_or_else(|| {
            ClientError::BrowserSession("redirect URI must name an explicit port".to_string())
        })?;

        let ip: std::net::IpAddr = host.parse().map_err(|_| {
            ClientError::BrowserSession(format!("redirect host '{host}' is not a loopback address"))
        })?;
        if !ip.is_loopback() {
            return Err(ClientError::BrowserSession(format!(
                "redirect host '{host}' is not a loopback address"
            )));
        }
        Ok(SocketAddr::new(ip, port))
    }

    async fn run(&self, url: &Url, redirect_uri: &str) -> ClientResult<String> {
        let redirect = Url::parse(redirect_uri)?;
        let addr = Self::listen_addr(&redirect)?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| ClientError::BrowserSession(format!("failed to bind {addr}: {err}")))?;

        let (redirect_tx, redirect_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = redirect_router(&redirect, redirect_tx);

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = server.await {
                warn!(error = %err, "redirect listener stopped with error");
            }
        });
        let guard = ListenerGuard {
            shutdown: Some(shutdown_tx),
            task,
        };
        info!(%addr, "listening for checkout redirect");

        self.opener.open(url).await?;

        let redirected = redirect_rx.await.map_err(|_| {
            ClientError::BrowserSession("redirect listener closed before a redirect".to_string())
        })?;
        guard.close().await;
        Ok(redirected)
    }
}

impl Default for LoopbackBrowser {
    fn default() -> Self {
        Self::new(UrlOpener::System)
    }
}

#[async_trait]
impl BrowserSession for LoopbackBrowser {
    #[instrument(skip(self, url), fields(host = url.host_str().unwrap_or_default()))]
    async fn open_auth_session(&self, url: &Url, redirect_uri: &str) -> BrowserOutcome {
        match self.run(url, redirect_uri).await {
            Ok(url) => BrowserOutcome::Redirected { url },
            Err(err) => BrowserOutcome::Failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_redirect_router_forwards_once() {
        let redirect = Url::parse("http://127.0.0.1:8765/checkout-complete").unwrap();
        let (tx, mut rx) = oneshot::channel();
        let app = redirect_router(&redirect, tx);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/checkout-complete?status=success&session_id=cs_1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            rx.try_recv().unwrap(),
            "http://127.0.0.1:8765/checkout-complete?status=success&session_id=cs_1"
        );

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/checkout-complete?status=cancel")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_listen_addr() {
        let url = Url::parse("http://localhost:9000/done").unwrap();
        assert_eq!(
            LoopbackBrowser::listen_addr(&url).unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );

        let url = Url::parse("companion://checkout-complete").unwrap();
        assert!(LoopbackBrowser::listen_addr(&url).is_err());

        let url = Url::parse("http://example.com:9000/done").unwrap();
        assert!(LoopbackBrowser::listen_addr(&url).is_err());

        let url = Url::parse("http://127.0.0.1/done").unwrap();
        assert!(LoopbackBrowser::listen_addr(&url).is_err());
    }

    #[test]
    fn test_system_opener() {
        assert_eq!(system_opener("macos"), ("open".to_string(), Vec::new()));
        assert_eq!(system_opener("linux"), ("xdg-open".to_string(), Vec::new()));

        let (program, args) = system_opener("windows");
        assert_eq!(program, "rundll32");
        assert_eq!(args, vec!["url.dll,FileProtocolHandler".to_string()]);
        assert!(args.iter().all(|arg| arg != "cmd" && arg != "start"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_opener_passes_url_as_single_argument() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("argv");
        let opener = UrlOpener::Command {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("printf '%s\\n' \"$@\" > '{}'", out.display()),
                "sh".to_string(),
            ],
        };
        let url = Url::parse("https://checkout.example.com/pay?session_id=cs_1&plan=12").unwrap();

        opener.open(&url).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "https://checkout.example.com/pay?session_id=cs_1&plan=12\n"
        );
    }

    #[tokio::test]
    async fn test_failed_opener_reports_failure() {
        let browser = LoopbackBrowser::new(UrlOpener::Command {
            program: "companion-client-test-no-such-program".to_string(),
            args: Vec::new(),
        });
        let url = Url::parse("https://checkout.example.com/cs_1").unwrap();

        let outcome = browser
            .open_auth_session(&url, "http://127.0.0.1:0/checkout-complete")
            .await;
        assert!(matches!(outcome, BrowserOutcome::Failed(_)));
    }
}
