//! Message-queue capability used by the messaging actions, plus an in-process
//! loopback broker.
//!
//! The loopback broker keeps one FIFO queue per destination name. Transacted
//! sessions buffer sends until `commit`; messages they receive go back to the
//! front of their queue on `rollback` (or on close without commit).

use crate::error::{DriverError, Result};
use crate::store::{closeable_variable, plain_variable, Closeable};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub body: String,
    pub properties: BTreeMap<String, String>,
}

impl Message {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            properties: BTreeMap::new(),
        }
    }
}

plain_variable!(Message => "message");

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub client_id: Option<String>,
    pub url: Option<String>,
}

pub trait MessagingProvider: Send + Sync {
    fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn Connection>>;
}

pub trait Connection: Send + Sync {
    fn client_id(&self) -> &str;
    fn create_session(&self, transacted: bool) -> Result<Arc<dyn Session>>;
    /// Closes every session created from this connection too.
    fn close(&self) -> Result<()>;
    fn is_closed(&self) -> bool;
}

pub trait Session: Send + Sync {
    fn transacted(&self) -> bool;
    fn send(&self, destination: &str, message: Message) -> Result<()>;
    /// `Ok(None)` when nothing arrived before the timeout.
    fn receive(&self, destination: &str, timeout: Duration) -> Result<Option<Message>>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn is_closed(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Handles kept in the variable store
// ---------------------------------------------------------------------------

pub struct ConnectionHandle(pub Arc<dyn Connection>);

impl Closeable for ConnectionHandle {
    fn close(&self) -> Result<()> {
        self.0.close()
    }
}

pub struct SessionHandle(pub Arc<dyn Session>);

impl Closeable for SessionHandle {
    fn close(&self) -> Result<()> {
        self.0.close()
    }
}

pub struct Producer {
    pub session: Arc<dyn Session>,
    pub destination: String,
}

impl Producer {
    pub fn send(&self, message: Message) -> Result<()> {
        self.session.send(&self.destination, message)
    }
}

pub struct Consumer {
    pub session: Arc<dyn Session>,
    pub destination: String,
}

impl Consumer {
    pub fn receive(&self, timeout: Duration) -> Result<Option<Message>> {
        self.session.receive(&self.destination, timeout)
    }
}

closeable_variable!(ConnectionHandle => "connection", SessionHandle => "session");
plain_variable!(Producer => "producer", Consumer => "consumer");

// ---------------------------------------------------------------------------
// LoopbackBroker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Queues {
    by_destination: Mutex<HashMap<String, VecDeque<Message>>>,
    arrived: Condvar,
}

impl Queues {
    fn publish(&self, destination: &str, messages: impl IntoIterator<Item = Message>) {
        let mut queues = self.by_destination.lock();
        queues
            .entry(destination.to_string())
            .or_default()
            .extend(messages);
        self.arrived.notify_all();
    }

    fn requeue_front(&self, returned: Vec<(String, Message)>) {
        if returned.is_empty() {
            return;
        }
        let mut queues = self.by_destination.lock();
        // newest first, so the oldest ends up at the very front
        for (destination, message) in returned.into_iter().rev() {
            queues.entry(destination).or_default().push_front(message);
        }
        self.arrived.notify_all();
    }

    fn take(
        &self,
        destination: &str,
        timeout: Duration,
        is_open: impl Fn() -> bool,
    ) -> Result<Option<Message>> {
        let deadline = Instant::now() + timeout;
        let mut queues = self.by_destination.lock();
        loop {
            if !is_open() {
                return Err(DriverError::Closed("session".to_string()));
            }
            if let Some(message) = queues.get_mut(destination).and_then(VecDeque::pop_front) {
                return Ok(Some(message));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.arrived.wait_until(&mut queues, deadline);
        }
    }

    fn wake_all(&self) {
        let _guard = self.by_destination.lock();
        self.arrived.notify_all();
    }
}

/// In-process provider; every connection from one broker shares its queues.
#[derive(Default)]
pub struct LoopbackBroker {
    queues: Arc<Queues>,
    next_client: AtomicU64,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently waiting on `destination`.
    pub fn depth(&self, destination: &str) -> usize {
        self.queues
            .by_destination
            .lock()
            .get(destination)
            .map_or(0, VecDeque::len)
    }
}

impl MessagingProvider for LoopbackBroker {
    fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn Connection>> {
        let client_id = match &options.client_id {
            Some(id) => id.clone(),
            None => format!(
                "loopback-{}",
                self.next_client.fetch_add(1, Ordering::Relaxed) + 1
            ),
        };
        tracing::debug!(client_id = %client_id, url = ?options.url, "loopback connect");
        Ok(Arc::new(LoopbackConnection {
            client_id,
            queues: Arc::clone(&self.queues),
            closed: Arc::new(AtomicBool::new(false)),
            sessions: Mutex::new(Vec::new()),
        }))
    }
}

struct LoopbackConnection {
    client_id: String,
    queues: Arc<Queues>,
    closed: Arc<AtomicBool>,
    sessions: Mutex<Vec<Arc<LoopbackSession>>>,
}

impl Connection for LoopbackConnection {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn create_session(&self, transacted: bool) -> Result<Arc<dyn Session>> {
        if self.is_closed() {
            return Err(DriverError::Closed(format!("connection '{}'", self.client_id)));
        }
        let session = Arc::new(LoopbackSession {
            queues: Arc::clone(&self.queues),
            transacted,
            connection_closed: Arc::clone(&self.closed),
            closed: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
        });
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let sessions = std::mem::take(&mut *self.sessions.lock());
        for session in sessions {
            session.shutdown();
        }
        // blocked receivers re-check the closed flag
        self.queues.wake_all();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct LoopbackSession {
    queues: Arc<Queues>,
    transacted: bool,
    connection_closed: Arc<AtomicBool>,
    closed: AtomicBool,
    pending: Mutex<Vec<(String, Message)>>,
    delivered: Mutex<Vec<(String, Message)>>,
}

impl LoopbackSession {
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DriverError::Closed("session".to_string()));
        }
        Ok(())
    }

    fn ensure_transacted(&self) -> Result<()> {
        if !self.transacted {
            return Err(DriverError::ActionFailed(
                "session is not transacted".to_string(),
            ));
        }
        Ok(())
    }

    /// Close without the open check; uncommitted work is rolled back.
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pending.lock().clear();
        let returned = std::mem::take(&mut *self.delivered.lock());
        self.queues.requeue_front(returned);
        // receivers blocked on this session re-check the closed flag
        self.queues.wake_all();
    }
}

impl Session for LoopbackSession {
    fn transacted(&self) -> bool {
        self.transacted
    }

    fn send(&self, destination: &str, message: Message) -> Result<()> {
        self.ensure_open()?;
        if self.transacted {
            self.pending.lock().push((destination.to_string(), message));
        } else {
            self.queues.publish(destination, [message]);
        }
        Ok(())
    }

    fn receive(&self, destination: &str, timeout: Duration) -> Result<Option<Message>> {
        self.ensure_open()?;
        let received = self
            .queues
            .take(destination, timeout, || !self.is_closed())?;
        if self.transacted {
            if let Some(message) = &received {
                self.delivered
                    .lock()
                    .push((destination.to_string(), message.clone()));
            }
        }
        Ok(received)
    }

    fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        self.ensure_transacted()?;
        let pending = std::mem::take(&mut *self.pending.lock());
        for (destination, message) in pending {
            self.queues.publish(&destination, [message]);
        }
        self.delivered.lock().clear();
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        self.ensure_transacted()?;
        self.pending.lock().clear();
        let returned = std::mem::take(&mut *self.delivered.lock());
        self.queues.requeue_front(returned);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.connection_closed.load(Ordering::SeqCst)
    }
}
