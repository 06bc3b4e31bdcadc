use tracing::{debug, instrument};

use crate::client::BackendClient;
use crate::error::ClientResult;
use crate::model::Plan;

pub const PLANS_PATH: &str = "subscriptions/plans";

/// Remote source of subscription plans.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    client: BackendClient,
}

impl PlanCatalog {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Fetch the current plan list. Called once per invocation, no retry.
    #[instrument(skip(self), fields(base_url = %self.client.base_url()))]
    pub async fn fetch_plans(&self) -> ClientResult<Vec<Plan>> {
        let plans: Vec<Plan> = self.client.get(PLANS_PATH).await?;
        debug!(count = plans.len(), "fetched subscription plans");
        Ok(plans)
    }
}
