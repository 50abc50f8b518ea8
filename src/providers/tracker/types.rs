use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked unit of work, as returned by the tracker's search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueFields {
    pub summary: String,
    pub status: NamedField,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignee: Option<Person>,
    #[serde(default)]
    pub reporter: Option<Person>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(rename = "issuetype", default)]
    pub issue_type: Option<NamedField>,
}

/// Tracker fields that are objects wrapping a display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedField {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl Issue {
    pub fn status_name(&self) -> &str {
        &self.fields.status.name
    }

    /// Whether the issue counts as closed under the configured status set.
    pub fn is_closed(&self, closed_statuses: &[String]) -> bool {
        closed_statuses
            .iter()
            .any(|s| s.eq_ignore_ascii_case(self.status_name()))
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.fields.labels.iter().any(|l| l == label)
    }

    pub fn assignee_name(&self) -> Option<&str> {
        self.fields.assignee.as_ref().map(|p| p.display_name.as_str())
    }

    pub fn reporter_name(&self) -> Option<&str> {
        self.fields.reporter.as_ref().map(|p| p.display_name.as_str())
    }
}
