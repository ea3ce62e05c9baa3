pub mod intent;
pub mod payload;
pub mod classify;
pub mod outcome;
pub mod orchestrator;
pub mod remediation;

pub use intent::OrderIntent;
pub use outcome::{IssuedCard, OrderError, OrderOutcome, OrderResult};
pub use orchestrator::{FulfillmentOrchestrator, FulfillmentSettings};
