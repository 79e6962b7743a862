//! Naming service: bind administered objects under a name and look them up
//! from any thread group.

use crate::error::{DriverError, Result};
use crate::store::Variable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub trait Directory: Send + Sync {
    /// Bind `value` under `name`, replacing any previous binding.
    fn bind(&self, name: &str, value: Arc<dyn Variable>) -> Result<()>;
    fn lookup(&self, name: &str) -> Result<Arc<dyn Variable>>;
    fn unbind(&self, name: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<String, Arc<dyn Variable>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Directory for InMemoryDirectory {
    fn bind(&self, name: &str, value: Arc<dyn Variable>) -> Result<()> {
        self.entries.write().insert(name.to_string(), value);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Variable>> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::NameNotBound(name.to_string()))
    }

    fn unbind(&self, name: &str) -> Result<()> {
        self.entries
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DriverError::NameNotBound(name.to_string()))
    }
}
