//! Turns checkout results into account updates and screen actions.

use tracing::info;

use crate::context::AccountState;
use crate::model::CheckoutResult;

/// What the subscription screen should do after a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutAction {
    /// Leave the subscription screen for home/confirmation.
    NavigateHome,
    /// Stay on plan selection without any message.
    StayOnSelection,
    /// Stay on plan selection and show a dismissable error.
    ShowError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutRoute {
    #[default]
    PlanSelection,
    Home,
}

/// Reducer for the subscription screen's post-checkout state.
#[derive(Debug, Clone, Default)]
pub struct CheckoutResultHandler {
    route: CheckoutRoute,
    notice: Option<String>,
}

impl CheckoutResultHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self) -> CheckoutRoute {
        self.route
    }

    /// The pending error message, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn handle(&mut self, result: &CheckoutResult, account: &mut AccountState) -> CheckoutAction {
        match result {
            CheckoutResult::Success { plan_id } => {
                info!(plan_id, "subscription activated");
                account.activate(*plan_id);
                self.notice = None;
                self.route = CheckoutRoute::Home;
                CheckoutAction::NavigateHome
            }
            CheckoutResult::Cancelled => {
                self.route = CheckoutRoute::PlanSelection;
                CheckoutAction::StayOnSelection
            }
            CheckoutResult::Error(err) => {
                let message = err.to_string();
                self.notice = Some(message.clone());
                self.route = CheckoutRoute::PlanSelection;
                CheckoutAction::ShowError { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn test_success_routes_home() {
        let mut handler = CheckoutResultHandler::new();
        let mut account = AccountState::default();

        let action = handler.handle(&CheckoutResult::Success { plan_id: 5 }, &mut account);
        assert_eq!(action, CheckoutAction::NavigateHome);
        assert_eq!(handler.route(), CheckoutRoute::Home);
        assert!(account.subscribed);
        assert_eq!(account.active_plan, Some(5));
    }

    #[test]
    fn test_cancel_is_silent() {
        let mut handler = CheckoutResultHandler::new();
        let mut account = AccountState::default();

        let action = handler.handle(&CheckoutResult::Cancelled, &mut account);
        assert_eq!(action, CheckoutAction::StayOnSelection);
        assert_eq!(handler.notice(), None);
        assert_eq!(account, AccountState::default());
    }

    #[test]
    fn test_error_shows_dismissable_notice() {
        let mut handler = CheckoutResultHandler::new();
        let mut account = AccountState::default();

        let action = handler.handle(
            &CheckoutResult::Error(ClientError::NoMatchingPlan),
            &mut account,
        );
        assert_eq!(
            action,
            CheckoutAction::ShowError {
                message: "no matching plan".to_string()
            }
        );
        assert_eq!(handler.route(), CheckoutRoute::PlanSelection);
        assert_eq!(handler.notice(), Some("no matching plan"));

        handler.dismiss_notice();
        assert_eq!(handler.notice(), None);
        assert!(!account.subscribed);
    }
}
