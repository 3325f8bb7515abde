//! Subscription plans and the plan-to-quota table.
//!
//! A user's plan selects the daily quota given to their API keys. The mapping
//! lives in [`PlanQuotas`], which is built from configuration and injected into
//! the key management service rather than hard-coded.

use serde::{Deserialize, Serialize};

/// Subscription tier of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    /// Value stored in the `users.plan` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }
}

/// Raised when a stored plan string is not one of the known plans.
#[derive(Debug, thiserror::Error)]
#[error("unknown plan: {0}")]
pub struct UnknownPlan(pub String);

impl TryFrom<String> for Plan {
    type Error = UnknownPlan;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            _ => Err(UnknownPlan(value)),
        }
    }
}

/// Daily request quota for each plan.
///
/// # Defaults
///
/// - free: 100 requests/day
/// - pro: 10,000 requests/day
/// - enterprise: 999,999 requests/day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanQuotas {
    pub free: i32,
    pub pro: i32,
    pub enterprise: i32,
}

impl PlanQuotas {
    /// Daily quota granted to keys owned by a user on `plan`.
    pub fn daily_quota(&self, plan: Plan) -> i32 {
        match plan {
            Plan::Free => self.free,
            Plan::Pro => self.pro,
            Plan::Enterprise => self.enterprise,
        }
    }
}

impl Default for PlanQuotas {
    fn default() -> Self {
        Self {
            free: 100,
            pro: 10_000,
            enterprise: 999_999,
        }
    }
}
