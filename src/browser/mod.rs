//! External browser sessions used to complete a hosted checkout.
//!
//! The checkout flow only depends on the [`BrowserSession`] trait. Hosts
//! that own a real authenticated browser (a mobile shell, a webview) implement
//! it directly; [`LoopbackBrowser`] covers desktop and CLI hosts.

use async_trait::async_trait;
use url::Url;

pub mod loopback;

pub use loopback::{redirect_router, LoopbackBrowser, UrlOpener};

/// Terminal state of an external browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The browser navigated to the redirect URI; carries the full URL.
    Redirected { url: String },
    /// The user closed the session.
    Cancelled,
    /// The session was dismissed by the system before completing.
    Dismissed,
    /// The session could not be opened or failed while open.
    Failed(String),
}

/// An authenticated browser session that returns control on redirect.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open `url` and wait until the browser is redirected to `redirect_uri`,
    /// cancelled, or fails. May wait indefinitely.
    async fn open_auth_session(&self, url: &Url, redirect_uri: &str) -> BrowserOutcome;
}

#[async_trait]
impl<B: BrowserSession + ?Sized> BrowserSession for std::sync::Arc<B> {
    async fn open_auth_session(&self, url: &Url, redirect_uri: &str) -> BrowserOutcome {
        (**self).open_auth_session(url, redirect_uri).await
    }
}
