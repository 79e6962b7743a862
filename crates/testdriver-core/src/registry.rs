//! Action factory: a closed table from type tag to constructor.
//!
//! Constructors validate every parameter they need before returning, so a
//! script with a missing parameter or an unknown type fails while loading,
//! before any thread group starts.

use crate::action::{Action, ActionConfig, ActionKind};
use crate::actions;
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use std::collections::BTreeMap;

/// Everything a constructor may consult besides its own config.
pub struct BuildContext<'a> {
    pub registry: &'a ActionRegistry,
    pub config: &'a DriverConfig,
}

impl BuildContext<'_> {
    /// Build a nested action (used by composite actions).
    pub fn build(&self, config: &ActionConfig) -> Result<Action> {
        self.registry.build(config, self.config)
    }
}

pub type Constructor = fn(&ActionConfig, &BuildContext<'_>) -> Result<Box<dyn ActionKind>>;

pub struct ActionRegistry {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Add or replace the constructor for `tag`.
    pub fn register(&mut self, tag: &'static str, constructor: Constructor) -> &mut Self {
        self.constructors.insert(tag, constructor);
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    pub fn build(&self, config: &ActionConfig, driver: &DriverConfig) -> Result<Action> {
        let constructor =
            self.constructors
                .get(config.action_type.as_str())
                .ok_or_else(|| DriverError::UnknownActionType {
                    action: config.id.clone(),
                    action_type: config.action_type.clone(),
                })?;
        let ctx = BuildContext {
            registry: self,
            config: driver,
        };
        let kind = constructor(config, &ctx)?;
        Ok(Action::new(config.clone(), kind))
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        default_registry()
    }
}

/// Registry with every built-in action type.
pub fn default_registry() -> ActionRegistry {
    let mut r = ActionRegistry::empty();
    r.register("SetVariable", actions::basic::set_variable)
        .register("RemoveVariable", actions::basic::remove_variable)
        .register("CompareStrings", actions::basic::compare_strings)
        .register("Sleep", actions::basic::sleep)
        .register("CompositeAction", actions::composite::composite)
        .register("CreateConnection", actions::messaging::create_connection)
        .register("CloseConnection", actions::messaging::close_connection)
        .register("CreateSession", actions::messaging::create_session)
        .register("CloseSession", actions::messaging::close_session)
        .register("CreateProducer", actions::messaging::create_producer)
        .register("CreateConsumer", actions::messaging::create_consumer)
        .register("SendMessage", actions::messaging::send_message)
        .register("ReceiveMessage", actions::messaging::receive_message)
        .register("CommitSession", actions::messaging::commit_session)
        .register("RollbackSession", actions::messaging::rollback_session)
        .register("SyncAction", actions::sync::sync_action)
        .register("BindObject", actions::naming::bind_object)
        .register("LookupObject", actions::naming::lookup_object)
        .register("ShellAction", actions::shell::shell_action)
        .register("RestAction", actions::rest::rest_action);
    r
}
