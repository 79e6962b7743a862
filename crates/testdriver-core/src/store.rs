//! Variable store shared by every thread group of a test run.
//!
//! Actions pass results to later actions by name: a connection handle created
//! on one thread can be closed by an action on another. The store does no type
//! checking on `store`; a mismatch surfaces as [`DriverError::TypeMismatch`]
//! when a reader asks for a concrete type with [`VariableStore::get_as`].

use crate::action::panic_message;
use crate::codes;
use crate::error::{error_chain, DriverError, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Variable / Closeable
// ---------------------------------------------------------------------------

/// A stored handle that owns an open resource.
pub trait Closeable: Send + Sync {
    /// Release the resource. Closing twice must be harmless.
    fn close(&self) -> Result<()>;
}

/// Anything an action can put in the store.
pub trait Variable: Any + Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Short label used in type-mismatch errors.
    fn type_label(&self) -> &'static str;

    /// Resource handles return themselves so the failure sweep can close them.
    fn as_closeable(&self) -> Option<&dyn Closeable> {
        None
    }
}

/// Implement [`Variable`] for types that hold no resources.
macro_rules! plain_variable {
    ($($ty:ty => $label:expr),* $(,)?) => {
        $(
            impl $crate::store::Variable for $ty {
                fn into_any(
                    self: ::std::sync::Arc<Self>,
                ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                    self
                }

                fn type_label(&self) -> &'static str {
                    $label
                }
            }
        )*
    };
}

/// Implement [`Variable`] for resource handles that also implement
/// [`Closeable`].
macro_rules! closeable_variable {
    ($($ty:ty => $label:expr),* $(,)?) => {
        $(
            impl $crate::store::Variable for $ty {
                fn into_any(
                    self: ::std::sync::Arc<Self>,
                ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                    self
                }

                fn type_label(&self) -> &'static str {
                    $label
                }

                fn as_closeable(&self) -> Option<&dyn $crate::store::Closeable> {
                    Some(self)
                }
            }
        )*
    };
}

pub(crate) use closeable_variable;
pub(crate) use plain_variable;

plain_variable!(
    String => "string",
    i64 => "integer",
    f64 => "float",
    bool => "boolean",
    Vec<u8> => "bytes",
    Vec<String> => "string list",
);

// ---------------------------------------------------------------------------
// VariableStore
// ---------------------------------------------------------------------------

/// Thread-safe name → value map. Cloning shares the same underlying map.
#[derive(Clone, Default)]
pub struct VariableStore {
    inner: Arc<RwLock<HashMap<String, Arc<dyn Variable>>>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Variable>> {
        self.inner.read().get(name).cloned()
    }

    /// Fetch `name` as a concrete type.
    pub fn get_as<T: Variable>(&self, name: &str) -> Result<Arc<T>> {
        let value = self
            .get(name)
            .ok_or_else(|| DriverError::UndefinedVariable(name.to_string()))?;
        let actual = value.type_label();
        value.into_any().downcast::<T>().map_err(|_| DriverError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
            actual,
        })
    }

    /// Store `value` under `name`, replacing whatever was there.
    pub fn store<V: Variable>(&self, name: impl Into<String>, value: V) {
        self.store_shared(name, Arc::new(value));
    }

    pub fn store_shared(&self, name: impl Into<String>, value: Arc<dyn Variable>) {
        self.inner.write().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Variable>> {
        self.inner.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Snapshot of every stored value.
    pub fn all_values(&self) -> Vec<Arc<dyn Variable>> {
        self.inner.read().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Best-effort sweep: close every stored value that owns a resource.
    /// Failures and panics are logged and skipped. Returns how many closed cleanly.
    pub fn close_all(&self) -> usize {
        // Snapshot first; closing must not run under the store lock.
        let entries: Vec<(String, Arc<dyn Variable>)> = self
            .inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        let mut closed = 0;
        for (name, value) in entries {
            let Some(resource) = value.as_closeable() else {
                continue;
            };
            let error = match panic::catch_unwind(AssertUnwindSafe(|| resource.close())) {
                Ok(Ok(())) => {
                    closed += 1;
                    continue;
                }
                Ok(Err(e)) => error_chain(&e),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            tracing::warn!(
                code = codes::CLEANUP_FAILED,
                variable = %name,
                error = %error,
                "failed to close stored resource"
            );
        }
        tracing::info!(code = codes::CLEANUP_SWEEP, closed, "cleanup sweep finished");
        closed
    }
}

impl fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableStore")
            .field("names", &self.names())
            .finish()
    }
}
