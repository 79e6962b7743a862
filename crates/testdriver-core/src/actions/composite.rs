//! `CompositeAction`: a named block of nested actions run in order on the
//! parent's thread, usually combined with `repeat`.
//!
//! Inside the block the thread-group rules apply: a failing child that is not
//! `continueOnFailure` fails the composite and cancels the remaining children.

use crate::action::{Action, ActionConfig, ActionContext, ActionKind};
use crate::error::{DriverError, Result};
use crate::registry::BuildContext;

struct Composite {
    children: Vec<Action>,
}

pub fn composite(config: &ActionConfig, ctx: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let mut children = Vec::with_capacity(config.children.len());
    let mut previous: Option<String> = None;
    for child_config in &config.children {
        let mut child = ctx.build(child_config)?;
        let id = child.id().to_string();
        child.set_previous(previous.replace(id));
        children.push(child);
    }
    Ok(Box::new(Composite { children }))
}

impl ActionKind for Composite {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let mut failed: Option<String> = None;
        for child in &mut self.children {
            if failed.is_some() {
                child.cancel(ctx.runtime);
                continue;
            }
            if !child.execute(ctx.runtime) && !child.continue_on_failure() {
                failed = Some(child.id().to_string());
            }
        }
        match failed {
            Some(id) => Err(DriverError::ActionFailed(format!(
                "nested action '{id}' failed"
            ))),
            None => Ok(()),
        }
    }

    fn cancel(&mut self, ctx: &ActionContext<'_>) {
        for child in &mut self.children {
            child.cancel(ctx.runtime);
        }
    }
}
