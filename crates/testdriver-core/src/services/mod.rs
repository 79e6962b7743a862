//! External collaborators that actions call into.
//!
//! Each capability is a trait so a run can be pointed at a real provider; the
//! defaults are in-process implementations good enough for scripts that only
//! talk to themselves.

pub mod directory;
pub mod messaging;
pub mod sync;

pub use directory::{Directory, InMemoryDirectory};
pub use messaging::{LoopbackBroker, Message, MessagingProvider};
pub use sync::{InProcessSync, SyncService};

use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub messaging: Arc<dyn MessagingProvider>,
    pub sync: Arc<dyn SyncService>,
    pub directory: Arc<dyn Directory>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            messaging: Arc::new(LoopbackBroker::new()),
            sync: Arc::new(InProcessSync::new()),
            directory: Arc::new(InMemoryDirectory::new()),
        }
    }
}
