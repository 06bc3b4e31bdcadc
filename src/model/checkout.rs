//! Wire types and outcome of a checkout attempt.

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::model::plan::PlanId;

/// Request body for `POST /subscriptions/create-checkout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub plan_id: PlanId,
}

impl CheckoutRequest {
    pub fn new(plan_id: PlanId) -> Self {
        Self { plan_id }
    }
}

/// Response from checkout creation.
///
/// The backend has shipped the hosted checkout link under several field
/// names; all of them are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutUrlResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl CheckoutUrlResponse {
    /// First non-empty URL in the order `url`, `checkoutUrl`, `paymentUrl`,
    /// `redirectUrl`.
    pub fn checkout_url(&self) -> Option<&str> {
        [
            &self.url,
            &self.checkout_url,
            &self.payment_url,
            &self.redirect_url,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .find(|value| !value.trim().is_empty())
    }
}

/// Terminal outcome of [`CheckoutSession::start`](crate::session::CheckoutSession::start).
#[derive(Debug)]
pub enum CheckoutResult {
    /// The hosted checkout redirected back to the app.
    Success { plan_id: PlanId },
    /// The user left the hosted checkout. Not an error.
    Cancelled,
    /// Any failure; `Display` of the error is the user-facing message.
    Error(ClientError),
}

impl CheckoutResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckoutResult::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CheckoutResult::Cancelled)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CheckoutResult::Error(_))
    }

    /// The error message, if this is an error.
    pub fn message(&self) -> Option<String> {
        match self {
            CheckoutResult::Error(err) => Some(err.to_string()),
            _ => None,
        }
    }
}

impl From<ClientError> for CheckoutResult {
    fn from(err: ClientError) -> Self {
        CheckoutResult::Error(err)
    }
}
