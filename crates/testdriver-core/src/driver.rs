//! Test driver: load a script into a plan, run it, fold the group results.

use crate::action::Runtime;
use crate::codes;
use crate::config::DriverConfig;
use crate::error::Result;
use crate::registry::ActionRegistry;
use crate::report::TestReport;
use crate::scheduler::{group_actions, run_groups, ThreadGroup};
use crate::script::load_script;
use crate::services::Services;
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parsed,
    Grouped,
    Running,
    Joined,
    Reported,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Parsed => "parsed",
            Phase::Grouped => "grouped",
            Phase::Running => "running",
            Phase::Joined => "joined",
            Phase::Reported => "reported",
        };
        f.write_str(s)
    }
}

fn enter(test: &str, phase: Phase) {
    tracing::debug!(code = codes::PHASE_CHANGED, test, %phase, "phase changed");
}

/// A loaded script: every action constructed and validated, grouped by thread.
#[derive(Debug)]
pub struct TestPlan {
    pub name: String,
    pub source: PathBuf,
    pub groups: Vec<ThreadGroup>,
}

impl TestPlan {
    pub fn action_count(&self) -> usize {
        self.groups.iter().map(ThreadGroup::len).sum()
    }
}

pub struct TestDriver {
    config: DriverConfig,
    registry: ActionRegistry,
    services: Services,
}

impl TestDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            registry: ActionRegistry::default(),
            services: Services::default(),
        }
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Parse `path`, apply the optional name filter, construct every action,
    /// and group them. Any configuration problem surfaces here, before a
    /// single action has run.
    pub fn load(&self, path: &Path, filter: Option<&str>) -> Result<TestPlan> {
        let mut script = load_script(path, &self.config)?;
        if let Some(filter) = filter {
            let delim = script.delimiter(&self.config).to_string();
            script.apply_filter(filter, &delim)?;
        }
        enter(&script.name, Phase::Parsed);

        let actions = script
            .actions
            .iter()
            .map(|config| self.registry.build(config, &self.config))
            .collect::<Result<Vec<_>>>()?;
        let groups = group_actions(actions);
        tracing::info!(
            code = codes::PLAN_GROUPED,
            test = %script.name,
            groups = groups.len(),
            threads = %groups.iter().map(ThreadGroup::tag).collect::<Vec<_>>().join(","),
            "actions grouped by thread"
        );
        enter(&script.name, Phase::Grouped);

        Ok(TestPlan {
            name: script.name,
            source: script.source,
            groups,
        })
    }

    /// Run every group to completion. The test passes iff every group passed.
    pub fn run(&self, plan: TestPlan) -> TestReport {
        let runtime = Runtime::new(self.services.clone(), self.config.clone());
        let started_at = Utc::now();

        enter(&plan.name, Phase::Running);
        let runs = run_groups(plan.groups, &runtime);
        enter(&plan.name, Phase::Joined);

        let passed = runs.iter().all(|r| r.report.passed);
        let first_failure = runs
            .iter()
            .filter_map(|r| r.failed_at.map(|at| (at, r)))
            .min_by_key(|(at, _)| *at)
            .and_then(|(_, r)| r.report.first_failure.clone());

        let report = TestReport {
            name: plan.name,
            passed,
            started_at,
            finished_at: Utc::now(),
            first_failure,
            groups: runs.into_iter().map(|r| r.report).collect(),
        };

        // the summary line itself is printed by the caller
        tracing::debug!(
            code = codes::TEST_RESULT,
            test = %report.name,
            passed = report.passed,
            first_failure = ?report.first_failure.as_ref().map(|f| &f.action),
            "test finished"
        );
        enter(&report.name, Phase::Reported);
        report
    }

    pub fn run_file(&self, path: &Path, filter: Option<&str>) -> Result<TestReport> {
        let plan = self.load(path, filter)?;
        Ok(self.run(plan))
    }
}

impl Default for TestDriver {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}
