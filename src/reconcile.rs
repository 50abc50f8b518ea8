use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{info, warn};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::Result;
use crate::providers::repohost::{MergeRequest, MergeState, Pipeline, RepoHostClient};
use crate::providers::tracker::{search_filter, Issue, TrackerClient};
use crate::report::BatchReport;

/// Where an issue stands relative to its merge requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// No merge request references the issue
    NoLinkedMr,
    /// At least one linked merge request is still open
    MrOpen,
    /// All linked work merged while the ticket stayed open
    MergedButOpen,
    /// Merged and the ticket is closed; nothing to do
    MergedAndClosed,
}

/// A linked merge request, trimmed to what the report renders.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedMr {
    pub url: String,
    pub branch: String,
    pub state: MergeState,
}

/// A CI run linked to an issue by its branch name.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedPipeline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub branch: String,
    pub build_number: u64,
}

/// One issue with its linked merge requests and classification.
#[derive(Debug, Serialize)]
pub struct ReconciledIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub issue_type: Option<String>,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    pub url: String,
    pub disposition: Disposition,
    pub merge_requests: Vec<LinkedMr>,
    pub pipelines: Vec<LinkedPipeline>,
}

/// Full result of a reconciliation pass.
#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    pub generated_at: DateTime<Utc>,
    pub issues: Vec<ReconciledIssue>,
    /// Outcome of flagging merged-but-open issues, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<BatchReport>,
}

impl ReconcileReport {
    pub fn merged_but_open(&self) -> impl Iterator<Item = &ReconciledIssue> {
        self.issues
            .iter()
            .filter(|i| i.disposition == Disposition::MergedButOpen)
    }
}

/// Options for one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileOptions {
    /// Restrict the search to these issue keys
    pub keys: Vec<String>,
    /// Add the flag label to merged-but-open issues
    pub flag: bool,
    /// Also post an explanatory comment when flagging
    pub comment: bool,
    pub dry_run: bool,
}

/// Cross-references tracker issues with merge-request activity.
pub struct Reconciler {
    tracker: TrackerClient,
    repohost: RepoHostClient,
    project: String,
    statuses: Vec<String>,
    closed_statuses: Vec<String>,
    flag_label: String,
    max_results: usize,
    host_limit: usize,
    /// Web base URL of the repository, for rendering pipeline links
    web_url: Option<String>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: TrackerClient,
        repohost: RepoHostClient,
        project: String,
        statuses: Vec<String>,
        closed_statuses: Vec<String>,
        flag_label: String,
        max_results: usize,
        host_limit: usize,
        web_url: Option<String>,
    ) -> Self {
        Self {
            tracker,
            repohost,
            project,
            statuses,
            closed_statuses,
            flag_label,
            max_results,
            host_limit,
            web_url,
        }
    }

    /// Fetch, classify, and (optionally) flag.
    ///
    /// The bulk fetches run concurrently; the issue or merge-request one
    /// failing is a total failure. Per-issue flag actions that fail are
    /// recorded and skipped.
    pub async fn run(&self, options: &ReconcileOptions) -> Result<ReconcileReport> {
        let jql = search_filter(&self.project, &self.statuses, &options.keys);

        let (issues, merge_requests, pipelines) = tokio::try_join!(
            self.tracker.search_issues(&jql, self.max_results),
            self.repohost.list_merge_requests(self.host_limit),
            self.pipelines_best_effort(),
        )?;

        info!(
            "Reconciling {} issues against {} merge requests",
            issues.len(),
            merge_requests.len()
        );

        let mrs_by_key = index_by_issue_key(&merge_requests, |mr| mr.source_branch());
        let pipelines_by_key = index_by_issue_key(&pipelines, Pipeline::ref_name);

        let reconciled: Vec<ReconciledIssue> = issues
            .iter()
            .map(|issue| {
                let key = issue.key.as_str();
                let linked = mrs_by_key.get(key).map_or(&[][..], Vec::as_slice);
                let runs = pipelines_by_key.get(key).map_or(&[][..], Vec::as_slice);
                self.reconcile_issue(issue, linked, runs)
            })
            .collect();

        let flags = if options.flag {
            Some(self.flag_stale(&issues, &reconciled, options).await?)
        } else {
            None
        };

        Ok(ReconcileReport {
            generated_at: Utc::now(),
            issues: reconciled,
            flags,
        })
    }

    /// CI runs are garnish on the report; anything short of a fatal error
    /// degrades to an empty list.
    async fn pipelines_best_effort(&self) -> Result<Vec<Pipeline>> {
        match self.repohost.list_pipelines(self.host_limit).await {
            Ok(pipelines) => Ok(pipelines),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Could not fetch pipelines: {e}");
                Ok(Vec::new())
            }
        }
    }

    fn reconcile_issue(
        &self,
        issue: &Issue,
        linked: &[&MergeRequest],
        runs: &[&Pipeline],
    ) -> ReconciledIssue {
        let open = !issue.is_closed(&self.closed_statuses);

        ReconciledIssue {
            key: issue.key.clone(),
            summary: issue.fields.summary.clone(),
            status: issue.status_name().to_string(),
            issue_type: issue.fields.issue_type.as_ref().map(|t| t.name.clone()),
            reporter: issue.reporter_name().map(str::to_string),
            assignee: issue.assignee_name().map(str::to_string),
            url: self.tracker.browse_url(&issue.key),
            disposition: classify(open, linked),
            merge_requests: linked
                .iter()
                .map(|mr| LinkedMr {
                    url: mr.url().to_string(),
                    branch: mr.source_branch().to_string(),
                    state: mr.state,
                })
                .collect(),
            pipelines: select_pipelines(runs)
                .into_iter()
                .map(|p| LinkedPipeline {
                    url: self.pipeline_url(p),
                    branch: p.ref_name().to_string(),
                    build_number: p.build_number,
                })
                .collect(),
        }
    }

    fn pipeline_url(&self, pipeline: &Pipeline) -> Option<String> {
        self.web_url.as_deref().map(|base| {
            format!(
                "{}/pipelines/results/{}",
                base.trim_end_matches('/'),
                pipeline.build_number
            )
        })
    }

    /// Adds the flag label (and optional comment) to every merged-but-open
    /// issue that does not carry it yet.
    async fn flag_stale(
        &self,
        issues: &[Issue],
        reconciled: &[ReconciledIssue],
        options: &ReconcileOptions,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::new("flag");

        for item in reconciled
            .iter()
            .filter(|i| i.disposition == Disposition::MergedButOpen)
        {
            // The label doubles as the already-flagged marker
            let already = issues
                .iter()
                .find(|i| i.key == item.key)
                .is_some_and(|i| i.has_label(&self.flag_label));
            if already {
                report.skipped(&item.key, "already flagged");
                continue;
            }
            if options.dry_run {
                report.skipped(&item.key, "dry run");
                continue;
            }

            match self.flag_issue(item, options.comment).await {
                Ok(()) => {
                    info!("Flagged {} as {}", item.key, self.flag_label);
                    report.applied(&item.key);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Could not flag {}: {e}", item.key);
                    report.failed(&item.key, e);
                }
            }
        }

        Ok(report)
    }

    async fn flag_issue(&self, item: &ReconciledIssue, comment: bool) -> Result<()> {
        self.tracker.add_label(&item.key, &self.flag_label).await?;

        if comment {
            let merged: Vec<&str> = item
                .merge_requests
                .iter()
                .filter(|mr| mr.state == MergeState::Merged)
                .map(|mr| mr.url.as_str())
                .collect();
            let text = format!(
                "All linked merge requests are merged ({}) but this ticket is \
                 still {}. Close it or reopen the work.",
                merged.join(", "),
                item.status,
            );
            self.tracker.add_comment(&item.key, &text).await?;
        }

        Ok(())
    }
}

/// Classifies one issue from its open/closed state and linked MRs.
///
/// Declined or superseded requests are not fetched upstream, so the match
/// only has to consider open and merged states.
fn classify(issue_open: bool, linked: &[&MergeRequest]) -> Disposition {
    if linked.is_empty() {
        return Disposition::NoLinkedMr;
    }
    if linked.iter().any(|mr| mr.state == MergeState::Open) {
        return Disposition::MrOpen;
    }
    if issue_open {
        Disposition::MergedButOpen
    } else {
        Disposition::MergedAndClosed
    }
}

/// Keeps migration runs individually; of the rest only the newest build
/// survives, since a rerun of the same change buries the older runs.
fn select_pipelines<'a>(runs: &[&'a Pipeline]) -> Vec<&'a Pipeline> {
    let mut kept: Vec<&Pipeline> = Vec::new();
    let mut newest: Option<&Pipeline> = None;
    for &run in runs {
        if run.ref_name().contains("migration") {
            kept.push(run);
        } else if newest.map_or(true, |n| n.build_number < run.build_number) {
            newest = Some(run);
        }
    }
    kept.extend(newest);
    kept
}

/// Groups items by the issue key encoded in their branch name.
///
/// Preserves listing order (newest first) within each key.
fn index_by_issue_key<'a, T>(
    items: &'a [T],
    branch: impl Fn(&'a T) -> &'a str,
) -> IndexMap<&'a str, Vec<&'a T>> {
    let mut by_key: IndexMap<&str, Vec<&T>> = IndexMap::new();
    for item in items {
        if let Some(key) = branch_issue_key(branch(item)) {
            by_key.entry(key).or_default().push(item);
        }
    }
    by_key
}

/// Extracts the issue key from a branch name.
///
/// By convention the key is the last path segment (`bugfix/AJ-123`), and
/// only segments shaped like a key count; `main` or `release/2024-03`
/// link to nothing.
fn branch_issue_key(branch: &str) -> Option<&str> {
    static KEY: OnceLock<Regex> = OnceLock::new();
    let key = KEY.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]*-[0-9]+$").unwrap());

    let segment = branch.rsplit('/').next().unwrap_or(branch);
    key.is_match(segment).then_some(segment)
}
