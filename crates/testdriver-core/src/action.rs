//! The action contract: configuration, parameters, and the execute/cancel
//! lifecycle shared by every action type.
//!
//! An [`Action`] is built once from an [`ActionConfig`] by the registry and
//! executed at most once per run. Type-specific behaviour lives behind the
//! [`ActionKind`] trait; `Action` owns the bookkeeping around it (repeat,
//! failure capture, outcome, ordering link).

use crate::codes;
use crate::config::DriverConfig;
use crate::error::{error_chain, DriverError, Result};
use crate::services::Services;
use crate::store::VariableStore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// Ordered, raw (pre-substitution) parameters of one action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    owner: String,
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            entries: Vec::new(),
        }
    }

    /// Append a parameter. Names are unique within one action.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(DriverError::DuplicateParameter {
                action: self.owner.clone(),
                param: name,
            });
        }
        self.entries.push((name, value.into()));
        Ok(())
    }

    /// Insert or replace.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn required(&self, name: &str) -> Result<String> {
        self.get(name)
            .map(str::to_string)
            .ok_or_else(|| self.missing(name))
    }

    pub fn optional(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_string)
    }

    /// Parse `name` if present, otherwise return `default`.
    pub fn parse_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => self.parse_value(name, raw),
        }
    }

    /// Parse `name` if present.
    pub fn parse_optional<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.get(name)
            .map(|raw| self.parse_value(name, raw))
            .transpose()
    }

    pub fn parse_required<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.required(name)?;
        self.parse_value(name, &raw)
    }

    fn parse_value<T: FromStr>(&self, name: &str, raw: &str) -> Result<T> {
        raw.trim()
            .parse::<T>()
            .map_err(|_| DriverError::InvalidParameter {
                action: self.owner.clone(),
                param: name.to_string(),
                value: raw.to_string(),
            })
    }

    pub fn missing(&self, name: &str) -> DriverError {
        DriverError::MissingParameter {
            action: self.owner.clone(),
            param: name.to_string(),
        }
    }

    pub fn invalid(&self, name: &str, value: &str) -> DriverError {
        DriverError::InvalidParameter {
            action: self.owner.clone(),
            param: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ActionConfig
// ---------------------------------------------------------------------------

/// One `<Action>` element after include inlining.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionConfig {
    pub id: String,
    pub action_type: String,
    pub thread: String,
    pub continue_on_failure: bool,
    /// How many times the body runs; always at least 1.
    pub repeat: u32,
    pub repeat_interval: Duration,
    pub params: Params,
    /// Nested `<Action>` elements (composite actions only).
    pub children: Vec<ActionConfig>,
    /// File the element was read from.
    pub source: PathBuf,
}

impl ActionConfig {
    pub fn new(
        id: impl Into<String>,
        action_type: impl Into<String>,
        thread: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            params: Params::new(id.clone()),
            id,
            action_type: action_type.into(),
            thread: thread.into(),
            continue_on_failure: false,
            repeat: 1,
            repeat_interval: Duration::ZERO,
            children: Vec::new(),
            source: PathBuf::new(),
        }
    }

    /// Builder-style parameter setter for programmatic construction.
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.set(name, value);
        self
    }
}

// ---------------------------------------------------------------------------
// Runtime / ActionContext
// ---------------------------------------------------------------------------

/// State shared by every thread group for the duration of one run.
pub struct Runtime {
    pub store: VariableStore,
    pub services: Services,
    pub config: DriverConfig,
}

impl Runtime {
    pub fn new(services: Services, config: DriverConfig) -> Self {
        Self {
            store: VariableStore::new(),
            services,
            config,
        }
    }
}

/// What an action body sees while it runs.
pub struct ActionContext<'a> {
    pub runtime: &'a Runtime,
    pub action_id: &'a str,
    pub thread: &'a str,
}

impl<'a> ActionContext<'a> {
    pub fn store(&self) -> &'a VariableStore {
        &self.runtime.store
    }

    pub fn services(&self) -> &'a Services {
        &self.runtime.services
    }

    pub fn config(&self) -> &'a DriverConfig {
        &self.runtime.config
    }

    /// Substitute `${NAME}` references from the environment.
    pub fn resolve(&self, raw: &str) -> String {
        substitute_env(raw)
    }

    /// Emit a detail line tagged with this action.
    pub fn detail(&self, message: &str) {
        tracing::info!(
            code = codes::ACTION_DETAIL,
            action = %self.action_id,
            thread = %self.thread,
            "{message}"
        );
    }
}

fn env_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Replace `${NAME}` with the environment value; unknown names stay verbatim.
pub fn substitute_env(raw: &str) -> String {
    if !raw.contains("${") {
        return raw.to_string();
    }
    env_ref()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Type-specific behaviour of an action.
///
/// Constructors validate parameters up front; `run` does the work and returns
/// `Err` on any failure.
pub trait ActionKind: Send {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()>;

    /// Called instead of `run` when an earlier action in the group aborted it.
    fn cancel(&mut self, _ctx: &ActionContext<'_>) {}
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Passed,
    Failed { reason: String },
    Cancelled,
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

pub struct Action {
    config: ActionConfig,
    kind: Box<dyn ActionKind>,
    previous: Option<String>,
    outcome: Outcome,
    elapsed: Duration,
}

impl Action {
    pub fn new(config: ActionConfig, kind: Box<dyn ActionKind>) -> Self {
        Self {
            config,
            kind,
            previous: None,
            outcome: Outcome::Pending,
            elapsed: Duration::ZERO,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn action_type(&self) -> &str {
        &self.config.action_type
    }

    pub fn thread(&self) -> &str {
        &self.config.thread
    }

    pub fn continue_on_failure(&self) -> bool {
        self.config.continue_on_failure
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Id of the action scheduled just before this one on the same thread.
    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn set_previous(&mut self, previous: Option<String>) {
        self.previous = previous;
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Run the body (`repeat` times). Never panics and never returns an
    /// error: failures are logged, recorded in [`Action::outcome`], and
    /// reported as `false`.
    pub fn execute(&mut self, runtime: &Runtime) -> bool {
        let started = Instant::now();
        tracing::info!(
            code = codes::ACTION_STARTED,
            action = %self.config.id,
            action_type = %self.config.action_type,
            thread = %self.config.thread,
            after = self.previous.as_deref().unwrap_or("-"),
            "action started"
        );

        let ctx = ActionContext {
            runtime,
            action_id: &self.config.id,
            thread: &self.config.thread,
        };
        let kind = &mut self.kind;
        let mut failure = None;
        for iteration in 0..self.config.repeat {
            if iteration > 0 && !self.config.repeat_interval.is_zero() {
                std::thread::sleep(self.config.repeat_interval);
            }
            let result = panic::catch_unwind(AssertUnwindSafe(|| kind.run(&ctx)));
            let reason = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => error_chain(&e),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            failure = Some(if self.config.repeat > 1 {
                format!("iteration {} of {}: {reason}", iteration + 1, self.config.repeat)
            } else {
                reason
            });
            break;
        }
        self.elapsed = started.elapsed();

        match failure {
            None => {
                tracing::info!(
                    code = codes::ACTION_PASSED,
                    action = %self.config.id,
                    thread = %self.config.thread,
                    elapsed_ms = self.elapsed.as_millis() as u64,
                    "action passed"
                );
                self.outcome = Outcome::Passed;
                true
            }
            Some(reason) => {
                if self.config.continue_on_failure {
                    tracing::warn!(
                        code = codes::ACTION_TOLERATED,
                        action = %self.config.id,
                        thread = %self.config.thread,
                        reason = %reason,
                        "action failed; continuing"
                    );
                } else {
                    tracing::error!(
                        code = codes::ACTION_FAILED,
                        action = %self.config.id,
                        thread = %self.config.thread,
                        reason = %reason,
                        "action failed"
                    );
                }
                self.outcome = Outcome::Failed { reason };
                false
            }
        }
    }

    /// Skip this action because an earlier one in its group aborted.
    pub fn cancel(&mut self, runtime: &Runtime) {
        let ctx = ActionContext {
            runtime,
            action_id: &self.config.id,
            thread: &self.config.thread,
        };
        let kind = &mut self.kind;
        if panic::catch_unwind(AssertUnwindSafe(|| kind.cancel(&ctx))).is_err() {
            tracing::warn!(action = %self.config.id, "cancel hook panicked");
        }
        tracing::info!(
            code = codes::ACTION_CANCELLED,
            action = %self.config.id,
            thread = %self.config.thread,
            "action cancelled"
        );
        self.outcome = Outcome::Cancelled;
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.config.id)
            .field("type", &self.config.action_type)
            .field("thread", &self.config.thread)
            .field("outcome", &self.outcome)
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
