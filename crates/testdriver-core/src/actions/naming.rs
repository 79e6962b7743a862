//! `BindObject` / `LookupObject`: move values between the variable store and
//! the naming directory.

use crate::action::{ActionConfig, ActionContext, ActionKind};
use crate::error::{DriverError, Result};
use crate::registry::BuildContext;

struct BindObject {
    name: String,
    var: String,
}

pub fn bind_object(config: &ActionConfig, _: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    Ok(Box::new(BindObject {
        name: p.required("name")?,
        var: p.required("var")?,
    }))
}

impl ActionKind for BindObject {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let value = ctx
            .store()
            .get(&self.var)
            .ok_or_else(|| DriverError::UndefinedVariable(self.var.clone()))?;
        let name = ctx.resolve(&self.name);
        ctx.services().directory.bind(&name, value)?;
        ctx.detail(&format!("bound '{}' as '{name}'", self.var));
        Ok(())
    }
}

struct LookupObject {
    name: String,
    store_as: String,
}

pub fn lookup_object(config: &ActionConfig, _: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    Ok(Box::new(LookupObject {
        name: p.required("name")?,
        store_as: p.required("store_as")?,
    }))
}

impl ActionKind for LookupObject {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let name = ctx.resolve(&self.name);
        let value = ctx.services().directory.lookup(&name)?;
        ctx.store().store_shared(self.store_as.clone(), value);
        Ok(())
    }
}
