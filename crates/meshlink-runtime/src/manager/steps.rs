//! The connect sequence
//!
//! 1. open the transport session and hand it to the manager
//! 2. request the configuration and await its completion
//! 3. request the node database and await the database-ready gate
//!
//! A retry of step 3 sends the database request again, so a link glitch
//! midway through the download restarts it instead of waiting on a gate
//! nothing will open. Steps run on the runner's task. Anything touching
//! manager state goes through the internal mailbox and is answered over a
//! oneshot.

use std::future::Future;
use std::sync::Arc;

use meshlink_core::{Device, MeshError, MeshResult, RetryConfig, Transport};
use tokio::sync::{mpsc, oneshot};

use super::messages::{HandshakeRequest, Internal};
use crate::step_runner::{SequentialStepRunner, Step};
use crate::waiter::Gate;

pub(crate) const OPEN_SESSION: &str = "open transport session";
pub(crate) const WANT_CONFIG: &str = "want config";
pub(crate) const WANT_DATABASE: &str = "want database";

pub(crate) struct ConnectContext {
    pub run: u64,
    pub device: Device,
    pub transport: Arc<dyn Transport>,
    pub mailbox: mpsc::UnboundedSender<Internal>,
    pub database_ready: Gate,
}

pub(crate) fn connect_sequence(ctx: ConnectContext, retry: RetryConfig) -> SequentialStepRunner {
    let ctx = Arc::new(ctx);
    SequentialStepRunner::new(retry)
        .with_step(step(OPEN_SESSION, &ctx, open_session))
        .with_step(step(WANT_CONFIG, &ctx, send_want_config))
        .with_step(step(WANT_DATABASE, &ctx, send_want_database))
}

fn step<F, Fut>(name: &'static str, ctx: &Arc<ConnectContext>, f: F) -> Step
where
    F: Fn(Arc<ConnectContext>) -> Fut + Send + 'static,
    Fut: Future<Output = MeshResult<()>> + Send + 'static,
{
    let ctx = ctx.clone();
    Step::new(name, move || f(ctx.clone()))
}

async fn open_session(ctx: Arc<ConnectContext>) -> MeshResult<()> {
    let (connection, events) = ctx.transport.open(&ctx.device).await?;
    let (reply, response) = oneshot::channel();
    ctx.mailbox
        .send(Internal::SessionOpened {
            run: ctx.run,
            connection,
            events,
            reply,
        })
        .map_err(|_| MeshError::Cancelled)?;
    response.await.unwrap_or(Err(MeshError::Cancelled))
}

/// Send the configuration request and wait for its completion
pub(crate) async fn send_want_config(ctx: Arc<ConnectContext>) -> MeshResult<()> {
    request_handshake(&ctx, HandshakeRequest::Config).await
}

/// Send the node-database request, wait for its first entry or completion,
/// then for the database-ready gate
pub(crate) async fn send_want_database(ctx: Arc<ConnectContext>) -> MeshResult<()> {
    request_handshake(&ctx, HandshakeRequest::Database).await?;
    ctx.database_ready.wait().await
}

async fn request_handshake(ctx: &ConnectContext, request: HandshakeRequest) -> MeshResult<()> {
    let (reply, response) = oneshot::channel();
    ctx.mailbox
        .send(Internal::Handshake {
            run: ctx.run,
            request,
            reply,
        })
        .map_err(|_| MeshError::Cancelled)?;
    let waiter = response.await.unwrap_or(Err(MeshError::Cancelled))?;
    waiter.await
}
