pub mod aggregator;
pub mod eligibility_cache;
pub mod orchestrator;
pub mod scorer;

pub use crate::domain::model::{Candidate, RankedResult, ResultEnvelope};
pub use crate::domain::ports::{EligibilityProvider, ScanSource, Storage};
pub use crate::utils::error::Result;
