use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a lead once it leaves the extractor. Extraction only ever
/// produces `New`; the rest are set by whoever works the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Closed,
    Ignored,
}

/// One captured group member, in the shape the contacts endpoint accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub name: String,
    #[serde(rename = "profile")]
    pub profile_url: String,
    pub created_at: DateTime<Utc>,
    pub status: LeadStatus,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl LeadRecord {
    pub fn new(name: impl Into<String>, profile_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile_url: profile_url.into(),
            created_at: Utc::now(),
            status: LeadStatus::New,
            phone: None,
            email: None,
            notes: None,
        }
    }
}
