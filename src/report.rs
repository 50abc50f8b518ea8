use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to a single item during a batch pass.
///
/// Per-item errors are carried as values so one bad item never interrupts
/// the rest of the batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum Outcome {
    /// The action was issued against the service
    Applied,
    /// Nothing to do (already in the target state, dry run, protected)
    Skipped { reason: String },
    /// The item could not be processed
    Failed { error: String },
}

/// One processed item and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result of one batch pass over a target set.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub action: String,
    pub started_at: DateTime<Utc>,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            started_at: Utc::now(),
            items: Vec::new(),
        }
    }

    pub fn applied(&mut self, name: impl Into<String>) {
        self.items.push(ItemReport {
            name: name.into(),
            outcome: Outcome::Applied,
        });
    }

    pub fn skipped(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.items.push(ItemReport {
            name: name.into(),
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
        });
    }

    pub fn failed(&mut self, name: impl Into<String>, error: impl std::fmt::Display) {
        self.items.push(ItemReport {
            name: name.into(),
            outcome: Outcome::Failed {
                error: error.to_string(),
            },
        });
    }

    pub fn applied_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Applied))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Skipped { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Failed { .. }))
            .count()
    }

    /// Names of items whose action was actually issued.
    pub fn applied_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Applied))
            .map(|i| i.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut report = BatchReport::new("pause");
        report.applied("AJ101");
        report.skipped("AJ102", "already paused");
        report.failed("AJ103", "Not found: AJ103");
        report.applied("AJ104");

        assert_eq!(report.applied_count(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.applied_names(), vec!["AJ101", "AJ104"]);
    }

    #[test]
    fn test_serializes_outcome_tags() {
        let mut report = BatchReport::new("resume");
        report.skipped("AJ200", "dry run");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["action"], "resume");
        assert_eq!(json["items"][0]["result"], "skipped");
        assert_eq!(json["items"][0]["reason"], "dry run");
    }
}
