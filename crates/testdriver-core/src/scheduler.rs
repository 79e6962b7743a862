//! Thread-group scheduler.
//!
//! Actions are bucketed by thread tag in first-seen order. Each bucket runs on
//! its own OS thread inside one `std::thread::scope`, so every worker has
//! joined before [`run_groups`] returns. Within a group the first hard failure
//! cancels everything after it.

use crate::action::{Action, Outcome, Runtime};
use crate::codes;
use crate::report::{ActionReport, FailureSite, GroupReport};
use std::time::Instant;

/// Actions sharing one thread tag, in declaration order.
#[derive(Debug)]
pub struct ThreadGroup {
    tag: String,
    actions: Vec<Action>,
}

impl ThreadGroup {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// What one worker hands back after its group finished.
#[derive(Debug)]
pub struct GroupRun {
    pub report: GroupReport,
    /// When the group's first hard failure happened.
    pub failed_at: Option<Instant>,
}

/// Bucket `actions` by thread tag. Group order is the order in which each tag
/// first appears; each action's `previous` is set to its predecessor in the
/// same group.
pub fn group_actions(actions: Vec<Action>) -> Vec<ThreadGroup> {
    let mut groups: Vec<ThreadGroup> = Vec::new();
    for mut action in actions {
        let idx = match groups.iter().position(|g| g.tag == action.thread()) {
            Some(idx) => idx,
            None => {
                groups.push(ThreadGroup {
                    tag: action.thread().to_string(),
                    actions: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        action.set_previous(group.actions.last().map(|a| a.id().to_string()));
        group.actions.push(action);
    }
    groups
}

/// Run every group on its own thread and wait for all of them.
///
/// Results come back in group order. A worker that cannot be spawned, or that
/// dies, yields a failed group whose unfinished actions stay `pending`.
pub fn run_groups(groups: Vec<ThreadGroup>, runtime: &Runtime) -> Vec<GroupRun> {
    std::thread::scope(|scope| {
        let mut workers = Vec::with_capacity(groups.len());
        for group in groups {
            let tag = group.tag.clone();
            let skeleton: Vec<ActionReport> = group.actions.iter().map(ActionReport::from).collect();
            let spawned = std::thread::Builder::new()
                .name(format!("group-{tag}"))
                .spawn_scoped(scope, move || run_group(group, runtime));
            match spawned {
                Ok(handle) => workers.push((tag, skeleton, Some(handle))),
                Err(e) => {
                    tracing::error!(
                        code = codes::GROUP_PANICKED,
                        thread = %tag,
                        error = %e,
                        "failed to start worker thread"
                    );
                    workers.push((tag, skeleton, None));
                }
            }
        }

        workers
            .into_iter()
            .map(|(tag, skeleton, handle)| match handle.map(|h| h.join()) {
                Some(Ok(run)) => run,
                Some(Err(_)) => {
                    tracing::error!(
                        code = codes::GROUP_PANICKED,
                        thread = %tag,
                        "worker thread panicked"
                    );
                    dead_group(tag, skeleton)
                }
                None => dead_group(tag, skeleton),
            })
            .collect()
    })
}

fn dead_group(thread: String, actions: Vec<ActionReport>) -> GroupRun {
    GroupRun {
        report: GroupReport {
            thread,
            passed: false,
            first_failure: None,
            actions,
        },
        failed_at: Some(Instant::now()),
    }
}

/// Execute one group in order; stop at the first hard failure.
pub fn run_group(mut group: ThreadGroup, runtime: &Runtime) -> GroupRun {
    tracing::info!(
        code = codes::GROUP_STARTED,
        thread = %group.tag,
        actions = group.actions.len(),
        "thread group started"
    );

    let mut failure: Option<(FailureSite, Instant)> = None;
    for action in &mut group.actions {
        if failure.is_some() {
            action.cancel(runtime);
            continue;
        }
        if !action.execute(runtime) && !action.continue_on_failure() {
            failure = Some((
                FailureSite {
                    action: action.id().to_string(),
                    thread: group.tag.clone(),
                },
                Instant::now(),
            ));
        }
    }

    match &failure {
        Some((site, _)) => {
            let cancelled = group
                .actions
                .iter()
                .filter(|a| *a.outcome() == Outcome::Cancelled)
                .count();
            tracing::warn!(
                code = codes::GROUP_ABORTED,
                thread = %group.tag,
                failed_action = %site.action,
                cancelled,
                "thread group aborted"
            );
            if runtime.config.cleanup_on_failure {
                runtime.store.close_all();
            }
        }
        None => {
            tracing::info!(
                code = codes::GROUP_FINISHED,
                thread = %group.tag,
                "thread group finished"
            );
        }
    }

    let (first_failure, failed_at) = match failure {
        Some((site, at)) => (Some(site), Some(at)),
        None => (None, None),
    };
    GroupRun {
        report: GroupReport {
            passed: first_failure.is_none(),
            thread: group.tag,
            first_failure,
            actions: group.actions.iter().map(ActionReport::from).collect(),
        },
        failed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionConfig, ActionContext, ActionKind};
    use crate::config::DriverConfig;
    use crate::error::{DriverError, Result};
    use crate::services::Services;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Appends its id to a shared journal, optionally failing or panicking.
    struct Journal {
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
        panic: bool,
    }

    impl ActionKind for Journal {
        fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
            self.log.lock().push(ctx.action_id.to_string());
            if self.panic {
                panic!("journal panic");
            }
            if self.fail {
                return Err(DriverError::ActionFailed("journal failure".to_string()));
            }
            Ok(())
        }
    }

    fn action(log: &Arc<Mutex<Vec<String>>>, id: &str, thread: &str, fail: bool) -> Action {
        Action::new(
            ActionConfig::new(id, "Journal", thread),
            Box::new(Journal {
                log: Arc::clone(log),
                fail,
                panic: false,
            }),
        )
    }

    fn runtime() -> Runtime {
        Runtime::new(Services::default(), DriverConfig::default())
    }

    #[test]
    fn groups_in_first_seen_order_with_previous_links() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let groups = group_actions(vec![
            action(&log, "a1", "t2", false),
            action(&log, "a2", "t1", false),
            action(&log, "a3", "t2", false),
        ]);
        let tags: Vec<&str> = groups.iter().map(|g| g.tag()).collect();
        assert_eq!(tags, vec!["t2", "t1"]);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].actions()[0].previous(), None);
        assert_eq!(groups[0].actions()[1].previous(), Some("a1"));
        assert_eq!(groups[1].actions()[0].previous(), None);
    }

    #[test]
    fn hard_failure_cancels_rest_of_group_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let groups = group_actions(vec![
            action(&log, "a1", "t1", true),
            action(&log, "a2", "t1", false),
            action(&log, "b1", "t2", false),
            action(&log, "b2", "t2", false),
        ]);
        let runs = run_groups(groups, &runtime());

        let t1 = &runs[0].report;
        assert!(!t1.passed);
        assert_eq!(t1.first_failure.as_ref().unwrap().action, "a1");
        assert_eq!(t1.actions[1].outcome, Outcome::Cancelled);
        assert!(runs[0].failed_at.is_some());

        let t2 = &runs[1].report;
        assert!(t2.passed);
        assert!(t2.actions.iter().all(|a| a.outcome == Outcome::Passed));

        let ran = log.lock().clone();
        assert!(!ran.contains(&"a2".to_string()));
        assert!(ran.contains(&"b2".to_string()));
    }

    #[test]
    fn tolerated_failure_keeps_group_passing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut config = ActionConfig::new("a1", "Journal", "t1");
        config.continue_on_failure = true;
        let first = Action::new(
            config,
            Box::new(Journal {
                log: Arc::clone(&log),
                fail: true,
                panic: false,
            }),
        );
        let groups = group_actions(vec![first, action(&log, "a2", "t1", false)]);
        let runs = run_groups(groups, &runtime());
        assert!(runs[0].report.passed);
        assert!(runs[0].report.actions[0].outcome.is_failed());
        assert_eq!(runs[0].report.actions[1].outcome, Outcome::Passed);
    }

    #[test]
    fn panicking_action_is_a_hard_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let panicky = Action::new(
            ActionConfig::new("p1", "Journal", "t1"),
            Box::new(Journal {
                log: Arc::clone(&log),
                fail: false,
                panic: true,
            }),
        );
        let groups = group_actions(vec![panicky, action(&log, "p2", "t1", false)]);
        let runs = run_groups(groups, &runtime());
        assert!(!runs[0].report.passed);
        assert_eq!(runs[0].report.actions[1].outcome, Outcome::Cancelled);
    }

    struct ExplodingHandle;

    impl crate::store::Closeable for ExplodingHandle {
        fn close(&self) -> Result<()> {
            panic!("close blew up");
        }
    }

    crate::store::closeable_variable!(ExplodingHandle => "exploding handle");

    #[test]
    fn panicking_cleanup_keeps_the_group_report() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let rt = runtime();
        rt.store.store("res", ExplodingHandle);
        let groups = group_actions(vec![
            action(&log, "put", "t1", false),
            action(&log, "fail", "t1", true),
            action(&log, "after", "t1", false),
        ]);
        let runs = run_groups(groups, &rt);

        let t1 = &runs[0].report;
        assert!(!t1.passed);
        assert_eq!(t1.first_failure.as_ref().unwrap().action, "fail");
        assert_eq!(t1.actions[0].outcome, Outcome::Passed);
        assert!(t1.actions[1].outcome.is_failed());
        assert_eq!(t1.actions[2].outcome, Outcome::Cancelled);
    }

    #[test]
    fn declaration_order_holds_within_each_group() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut actions = Vec::new();
        for i in 0..20 {
            let thread = if i % 2 == 0 { "even" } else { "odd" };
            actions.push(action(&log, &format!("x{i:02}"), thread, false));
        }
        run_groups(group_actions(actions), &runtime());

        let ran = log.lock().clone();
        let evens: Vec<&String> = ran.iter().filter(|id| id[1..].parse::<u32>().unwrap() % 2 == 0).collect();
        let mut sorted = evens.clone();
        sorted.sort();
        assert_eq!(evens, sorted);
        assert_eq!(ran.len(), 20);
    }
}
