use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a merge request on the repository host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeState {
    Open,
    Merged,
    Declined,
    Superseded,
    #[serde(other)]
    Unknown,
}

/// A proposed code change submitted for review and integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: u64,
    pub title: String,
    pub state: MergeState,
    pub source: SourceRef,
    pub links: Links,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub branch: BranchRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Links {
    pub html: Href,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Href {
    pub href: String,
}

impl MergeRequest {
    pub fn source_branch(&self) -> &str {
        &self.source.branch.name
    }

    pub fn url(&self) -> &str {
        &self.links.html.href
    }
}

/// One CI run on the repository host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub build_number: u64,
    pub target: TargetRef,
    pub created_on: DateTime<Utc>,
}

/// The ref a pipeline ran against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRef {
    pub ref_name: String,
}

impl Pipeline {
    pub fn ref_name(&self) -> &str {
        &self.target.ref_name
    }
}
