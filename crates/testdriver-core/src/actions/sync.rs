//! `SyncAction`: coordinate thread groups through named conditions.

use crate::action::{ActionConfig, ActionContext, ActionKind};
use crate::error::Result;
use crate::registry::BuildContext;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
    Init,
    Set,
    Wait,
    Reset,
    Delete,
    Get,
}

struct SyncAction {
    request: Request,
    condition: String,
    value: i64,
    timeout: Duration,
    store_as: Option<String>,
}

pub fn sync_action(config: &ActionConfig, ctx: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    let raw = p.required("request")?;
    let request = match raw.to_ascii_lowercase().as_str() {
        "init" => Request::Init,
        "set" => Request::Set,
        "wait" => Request::Wait,
        "reset" => Request::Reset,
        "delete" => Request::Delete,
        "get" => Request::Get,
        _ => return Err(p.invalid("request", &raw)),
    };
    let condition = p.required("condition")?;
    let value: i64 = p.parse_or("value", 1)?;
    let timeout = p
        .parse_optional::<u64>("timeout_ms")?
        .map_or_else(|| ctx.config.sync_timeout(), Duration::from_millis);
    let store_as = p.optional("store_as");
    if request == Request::Get && store_as.is_none() {
        return Err(p.missing("store_as"));
    }
    Ok(Box::new(SyncAction {
        request,
        condition,
        value,
        timeout,
        store_as,
    }))
}

impl ActionKind for SyncAction {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let sync = &ctx.services().sync;
        let condition = ctx.resolve(&self.condition);
        match self.request {
            Request::Init => sync.init(&condition),
            Request::Set => sync.set(&condition, self.value),
            Request::Wait => {
                ctx.detail(&format!(
                    "waiting up to {}ms for '{condition}' >= {}",
                    self.timeout.as_millis(),
                    self.value
                ));
                sync.wait(&condition, self.value, self.timeout)
            }
            Request::Reset => sync.reset(&condition),
            Request::Delete => sync.delete(&condition),
            Request::Get => {
                let value = sync.get(&condition)?;
                if let Some(name) = &self.store_as {
                    ctx.store().store(name.clone(), value);
                }
                Ok(())
            }
        }
    }
}
