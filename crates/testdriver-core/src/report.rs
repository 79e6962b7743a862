use crate::action::{Action, Outcome};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a group (or the whole test) first failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSite {
    pub action: String,
    pub thread: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub id: String,
    pub action_type: String,
    pub previous: Option<String>,
    pub continue_on_failure: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub duration_ms: u64,
}

impl From<&Action> for ActionReport {
    fn from(action: &Action) -> Self {
        Self {
            id: action.id().to_string(),
            action_type: action.action_type().to_string(),
            previous: action.previous().map(str::to_string),
            continue_on_failure: action.continue_on_failure(),
            outcome: action.outcome().clone(),
            duration_ms: action.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub thread: String,
    /// False iff an action without `continueOnFailure` failed (or the worker
    /// itself died).
    pub passed: bool,
    pub first_failure: Option<FailureSite>,
    pub actions: Vec<ActionReport>,
}

impl GroupReport {
    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.actions.iter().filter(|a| pred(&a.outcome)).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub name: String,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Earliest hard failure across all groups, by finish time.
    pub first_failure: Option<FailureSite>,
    pub groups: Vec<GroupReport>,
}

impl TestReport {
    pub fn verdict(&self) -> &'static str {
        if self.passed {
            "Success"
        } else {
            "Failure"
        }
    }

    /// The one-line summary printed at the end of every run.
    pub fn summary_line(&self) -> String {
        let mut line = format!("Test '{}' result: {}", self.name, self.verdict());
        if let Some(site) = &self.first_failure {
            line.push_str(&format!(
                " (first failure: action '{}' on thread '{}')",
                site.action, site.thread
            ));
        }
        line
    }

    pub fn group(&self, thread: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.thread == thread)
    }

    pub fn action(&self, id: &str) -> Option<&ActionReport> {
        self.groups
            .iter()
            .flat_map(|g| g.actions.iter())
            .find(|a| a.id == id)
    }
}
