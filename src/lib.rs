//! Lead extraction from group-membership pages: finds member rows in
//! unlabeled, virtualized markup and accumulates deduplicated lead records
//! across repeated scans.

pub mod config;
pub mod members;
pub mod parser;
pub mod pipeline;
pub mod record;

pub use config::{ExtractConfig, Strategy};
pub use members::MemberAccumulator;
pub use parser::links::{CanonicalKey, ProfileClassifier, ProfileLink};
pub use pipeline::{extract_once, ScrollWatcher};
pub use record::{LeadRecord, LeadStatus};
