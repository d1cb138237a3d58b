use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// Billing subscription as written by the payments integration. The
/// `reference_id` is the organization the plan is attached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub plan: String,
    pub reference_id: String,
    pub status: String,
    #[serde(default)]
    pub seats: Option<u64>,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
    #[serde(default)]
    pub period_start: Option<DateTime>,
    #[serde(default)]
    pub period_end: Option<DateTime>,
}

impl SubscriptionDoc {
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing")
    }
}
