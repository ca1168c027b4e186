//! Fixed subscription plan catalog.

use schemars::JsonSchema;
use serde::Serialize;

/// A purchasable scan plan.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ScanPlan {
    /// Plan identifier used by the checkout endpoint.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Price in USD cents.
    pub price_cents: u32,
    /// Scan credits granted on purchase.
    pub scans_included: u32,
    /// Days the credits stay valid after purchase.
    pub validity_days: i64,
}

/// The plan table. A single plan today; checkout validates against this list.
pub const PLANS: &[ScanPlan] = &[ScanPlan {
    id: "premium",
    name: "Premium Scan Pack",
    price_cents: 999,
    scans_included: 50,
    validity_days: 30,
}];

impl ScanPlan {
    /// Look up a plan by identifier.
    pub fn find(plan_id: &str) -> Option<&'static ScanPlan> {
        PLANS.iter().find(|p| p.id == plan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_plan() {
        let plan = ScanPlan::find("premium").unwrap();
        assert_eq!(plan.price_cents, 999);
        assert_eq!(plan.scans_included, 50);
        assert_eq!(plan.validity_days, 30);
    }

    #[test]
    fn test_find_unknown_plan() {
        assert!(ScanPlan::find("enterprise").is_none());
        assert!(ScanPlan::find("").is_none());
    }
}
