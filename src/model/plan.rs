use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;

/// Backend identifier of a subscription plan.
pub type PlanId = i64;

// ---------------------------------------------------------------------------
// Plan: a backend-defined subscription offer
// ---------------------------------------------------------------------------

/// A subscription plan as returned by `GET /subscriptions/plans`.
///
/// Only `planId` and `durationDays` are guaranteed by the backend; price
/// fields are kept when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub plan_id: PlanId,
    pub duration_days: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl Plan {
    /// Create a plan with no price information.
    pub fn new(plan_id: PlanId, duration_days: i64) -> Self {
        Self {
            plan_id,
            duration_days,
            name: None,
            price: None,
            currency: None,
        }
    }

    /// Set the price and currency.
    pub fn with_price(mut self, price: Decimal, currency: impl Into<String>) -> Self {
        self.price = Some(price);
        self.currency = Some(currency.into());
        self
    }

    /// Set a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({} days", self.plan_id, self.duration_days)?;
        if let Some(name) = &self.name {
            write!(f, ", {name}")?;
        }
        match (&self.price, &self.currency) {
            (Some(price), Some(currency)) => write!(f, ", {price} {currency})"),
            (Some(price), None) => write!(f, ", {price})"),
            _ => write!(f, ")"),
        }
    }
}

// ---------------------------------------------------------------------------
// DurationSelection: the user's locally chosen subscription length
// ---------------------------------------------------------------------------

/// A subscription length picked in the UI, before server-side resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSelection {
    pub months: i64,
    pub label: String,
    pub price: String,
    pub note: String,
}

impl DurationSelection {
    /// A bare selection with no display text.
    pub fn from_months(months: i64) -> Self {
        Self {
            months,
            label: format!("{months} months"),
            price: String::new(),
            note: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// PlanTier: the fixed offers presented on the subscription screen
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanTier {
    Basic,
    Standard,
    Premium,
    PremiumPlus,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Basic,
        PlanTier::Standard,
        PlanTier::Premium,
        PlanTier::PremiumPlus,
    ];

    pub fn months(self) -> i64 {
        match self {
            PlanTier::Basic => 1,
            PlanTier::Standard => 3,
            PlanTier::Premium => 6,
            PlanTier::PremiumPlus => 12,
        }
    }

    /// Displayed monthly price.
    pub fn display_price(self) -> &'static str {
        match self {
            PlanTier::Basic => "$4.90",
            PlanTier::Standard => "$6.90",
            PlanTier::Premium => "$8.90",
            PlanTier::PremiumPlus => "$10.90",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Basic => "basic",
            PlanTier::Standard => "standard",
            PlanTier::Premium => "premium",
            PlanTier::PremiumPlus => "premiumPlus",
        }
    }

    /// The selection handed to the checkout flow when this tier is picked.
    pub fn selection(self) -> DurationSelection {
        let months = self.months();
        let label = if months == 1 {
            "1 month".to_string()
        } else {
            format!("{months} months")
        };
        DurationSelection {
            months,
            label,
            price: self.display_price().to_string(),
            note: "monthly".to_string(),
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "basic" => Ok(PlanTier::Basic),
            "standard" => Ok(PlanTier::Standard),
            "premium" => Ok(PlanTier::Premium),
            "premiumplus" => Ok(PlanTier::PremiumPlus),
            other => Err(ClientError::InvalidInput(format!("unknown plan tier '{other}'"))),
        }
    }
}
