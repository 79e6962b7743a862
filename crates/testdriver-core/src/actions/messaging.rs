//! Messaging actions. Each one is a thin shim over the message-queue
//! capability: it looks up handles by variable name, makes one call, and
//! stores any new handle for later actions.

use crate::action::{ActionConfig, ActionContext, ActionKind};
use crate::error::{DriverError, Result};
use crate::registry::BuildContext;
use crate::services::messaging::{
    ConnectOptions, ConnectionHandle, Consumer, Message, Producer, SessionHandle,
};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

struct CreateConnection {
    conn_id: String,
    client_id: Option<String>,
    url: Option<String>,
}

pub fn create_connection(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    Ok(Box::new(CreateConnection {
        conn_id: p.required("conn_id")?,
        client_id: p.optional("client_id"),
        url: p.optional("url"),
    }))
}

impl ActionKind for CreateConnection {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let options = ConnectOptions {
            client_id: self.client_id.as_deref().map(|c| ctx.resolve(c)),
            url: self.url.as_deref().map(|u| ctx.resolve(u)),
        };
        let connection = ctx.services().messaging.connect(&options)?;
        ctx.detail(&format!(
            "connected as '{}', stored as '{}'",
            connection.client_id(),
            self.conn_id
        ));
        ctx.store()
            .store(self.conn_id.clone(), ConnectionHandle(connection));
        Ok(())
    }
}

struct CloseConnection {
    conn_id: String,
}

pub fn close_connection(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    Ok(Box::new(CloseConnection {
        conn_id: config.params.required("conn_id")?,
    }))
}

impl ActionKind for CloseConnection {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let handle = ctx.store().get_as::<ConnectionHandle>(&self.conn_id)?;
        handle.0.close()
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

struct CreateSession {
    conn_id: String,
    session_id: String,
    transacted: bool,
}

pub fn create_session(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    Ok(Box::new(CreateSession {
        conn_id: p.required("conn_id")?,
        session_id: p.required("session_id")?,
        transacted: p.parse_or("transacted", false)?,
    }))
}

impl ActionKind for CreateSession {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let conn = ctx.store().get_as::<ConnectionHandle>(&self.conn_id)?;
        let session = conn.0.create_session(self.transacted)?;
        ctx.store()
            .store(self.session_id.clone(), SessionHandle(session));
        Ok(())
    }
}

/// Which session operation a [`SessionOp`] performs.
#[derive(Debug, Clone, Copy)]
enum Op {
    Close,
    Commit,
    Rollback,
}

struct SessionOp {
    session_id: String,
    op: Op,
}

fn session_op(config: &ActionConfig, op: Op) -> Result<Box<dyn ActionKind>> {
    Ok(Box::new(SessionOp {
        session_id: config.params.required("session_id")?,
        op,
    }))
}

pub fn close_session(config: &ActionConfig, _: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    session_op(config, Op::Close)
}

pub fn commit_session(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    session_op(config, Op::Commit)
}

pub fn rollback_session(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    session_op(config, Op::Rollback)
}

impl ActionKind for SessionOp {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let session = ctx.store().get_as::<SessionHandle>(&self.session_id)?;
        match self.op {
            Op::Close => session.0.close(),
            Op::Commit => session.0.commit(),
            Op::Rollback => session.0.rollback(),
        }
    }
}

// ---------------------------------------------------------------------------
// Producers / consumers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Producer,
    Consumer,
}

struct CreateEndpoint {
    session_id: String,
    store_as: String,
    destination: String,
    endpoint: Endpoint,
}

pub fn create_producer(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    Ok(Box::new(CreateEndpoint {
        session_id: p.required("session_id")?,
        store_as: p.required("producer_id")?,
        destination: p.required("destination")?,
        endpoint: Endpoint::Producer,
    }))
}

pub fn create_consumer(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    Ok(Box::new(CreateEndpoint {
        session_id: p.required("session_id")?,
        store_as: p.required("consumer_id")?,
        destination: p.required("destination")?,
        endpoint: Endpoint::Consumer,
    }))
}

impl ActionKind for CreateEndpoint {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let session = ctx.store().get_as::<SessionHandle>(&self.session_id)?;
        if session.0.is_closed() {
            return Err(DriverError::Closed(format!("session '{}'", self.session_id)));
        }
        let destination = ctx.resolve(&self.destination);
        let session = session.0.clone();
        match self.endpoint {
            Endpoint::Producer => ctx.store().store(
                self.store_as.clone(),
                Producer {
                    session,
                    destination,
                },
            ),
            Endpoint::Consumer => ctx.store().store(
                self.store_as.clone(),
                Consumer {
                    session,
                    destination,
                },
            ),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Send / receive
// ---------------------------------------------------------------------------

struct SendMessage {
    producer_id: String,
    body: String,
    count: u32,
}

pub fn send_message(config: &ActionConfig, _: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    let producer_id = p.required("producer_id")?;
    let body = p.required("body")?;
    let count: u32 = p.parse_or("count", 1)?;
    if count == 0 {
        return Err(p.invalid("count", "0"));
    }
    Ok(Box::new(SendMessage {
        producer_id,
        body,
        count,
    }))
}

impl ActionKind for SendMessage {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let producer = ctx.store().get_as::<Producer>(&self.producer_id)?;
        let body = ctx.resolve(&self.body);
        for _ in 0..self.count {
            producer.send(Message::text(body.clone()))?;
        }
        ctx.detail(&format!(
            "sent {} message(s) to '{}'",
            self.count, producer.destination
        ));
        Ok(())
    }
}

struct ReceiveMessage {
    consumer_id: String,
    timeout: Duration,
    store_as: Option<String>,
    expected_body: Option<String>,
}

pub fn receive_message(
    config: &ActionConfig,
    ctx: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    let consumer_id = p.required("consumer_id")?;
    let timeout = p
        .parse_optional::<u64>("timeout_ms")?
        .map_or_else(|| ctx.config.receive_timeout(), Duration::from_millis);
    Ok(Box::new(ReceiveMessage {
        consumer_id,
        timeout,
        store_as: p.optional("message_id"),
        expected_body: p.optional("expected_body"),
    }))
}

impl ActionKind for ReceiveMessage {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let consumer = ctx.store().get_as::<Consumer>(&self.consumer_id)?;
        let message = consumer
            .receive(self.timeout)?
            .ok_or_else(|| DriverError::ReceiveTimeout {
                destination: consumer.destination.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?;

        if let Some(expected) = &self.expected_body {
            let expected = ctx.resolve(expected);
            if message.body != expected {
                return Err(DriverError::ActionFailed(format!(
                    "received body {:?}, expected {expected:?}",
                    message.body
                )));
            }
        }
        if let Some(name) = &self.store_as {
            ctx.store().store(name.clone(), message);
        }
        Ok(())
    }
}
