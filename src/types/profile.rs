use serde::{Deserialize, Serialize};

/// Subscription tier of an authenticated user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// The free plan.
    #[default]
    Free,
    /// A paid subscription.
    Premium,
}

/// The authenticated user. The chat core reads it and never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable user identifier.
    pub user_id: String,
    /// Contact email.
    pub email: String,
    /// Subscription tier.
    pub plan: PlanTier,
}

impl Profile {
    /// Creates a profile on the given plan.
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, plan: PlanTier) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            plan,
        }
    }

    /// Returns true for paid plans.
    pub fn is_premium(&self) -> bool {
        self.plan == PlanTier::Premium
    }
}
