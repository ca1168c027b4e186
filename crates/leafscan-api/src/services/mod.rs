//! Business logic services.

pub mod detection;
pub mod entitlement;
pub mod scan;
pub mod store;
pub mod stripe;
pub mod testing;

pub use detection::{DiseaseDetector, MockDetector};
pub use entitlement::{DebitOutcome, EntitlementService, ScanDecision};
pub use scan::ScanService;
pub use store::{EntitlementStore, FirestoreEntitlementStore};
pub use stripe::StripeService;
