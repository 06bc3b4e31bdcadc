pub mod browser;
pub mod catalog;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod matcher;
pub mod model;
pub mod onboarding;
pub mod session;

pub use browser::{BrowserOutcome, BrowserSession, LoopbackBrowser, UrlOpener};
pub use catalog::PlanCatalog;
pub use client::{BackendClient, BackendClientBuilder};
pub use config::{load_config, AppConfig, BackendConfig, CheckoutConfig};
pub use context::{AccountState, AppContext, UnreadCounter};
pub use error::{ClientError, ClientResult};
pub use handler::{CheckoutAction, CheckoutResultHandler, CheckoutRoute};
pub use matcher::match_by_months;
pub use model::*;
pub use onboarding::{OnboardingFlow, OnboardingProfile, OnboardingStep, StepInput};
pub use session::{CheckoutSession, CheckoutState};
