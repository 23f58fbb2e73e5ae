//! QueuedApiService - the request entry point of a peer
//!
//! `call` validates a request, wraps it in a [`Command`] and queues it by
//! priority. One execute loop drains the queue and runs commands against the
//! core, at most `query_limit` at a time.

use crate::queue::PriorityQueue;
use crate::{EnqueueError, ServiceError};
use futures_util::StreamExt;
use std::sync::Arc;
use tessera_core::{Command, RemoteNamespaceCore, Request, Response};
use tessera_model::ErrorKind;
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

const CLOSED: &str = "closed";

#[async_trait::async_trait]
pub trait ApiService: Send + Sync {
    /// Submit a request. Rejections are answered on the returned channel too.
    async fn call(&self, request: Request) -> oneshot::Receiver<Response>;

    /// Submit a request and wait for its response.
    async fn request(&self, request: Request) -> Response {
        let kind = request.kind();
        self.call(request)
            .await
            .await
            .unwrap_or_else(|_| Response::error(kind, ErrorKind::Shutdown, CLOSED))
    }
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub queue_capacity: usize,
    /// Commands running at once; 0 means unlimited.
    pub query_limit: usize,
    /// Wait for queue space instead of answering "try again".
    pub wait_for_capacity: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            query_limit: 1,
            wait_for_capacity: false,
        }
    }
}

pub struct QueuedApiService {
    core: Arc<RemoteNamespaceCore>,
    queue: Arc<PriorityQueue<Command>>,
    wait_for_capacity: bool,
    shutdown_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedApiService {
    /// Start the execute loop over `core`.
    pub fn start(core: Arc<RemoteNamespaceCore>, options: ServiceOptions) -> Self {
        let queue = Arc::new(PriorityQueue::new(options.queue_capacity));
        let limit = (options.query_limit > 0).then(|| Arc::new(Semaphore::new(options.query_limit)));
        let shutdown_token = CancellationToken::new();
        let worker = tokio::spawn(execute_loop(
            core.clone(),
            queue.clone(),
            limit,
            shutdown_token.clone(),
        ));
        Self {
            core,
            queue,
            wait_for_capacity: options.wait_for_capacity,
            shutdown_token,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn core(&self) -> &Arc<RemoteNamespaceCore> {
        &self.core
    }

    pub fn validate(&self, request: &Request) -> Result<(), ServiceError> {
        match request {
            Request::Query(query) => Ok(query.validate(self.core.functions())?),
            Request::Replicate(_) | Request::Reflect(_) => Ok(()),
        }
    }

    /// Stop the execute loop, fail whatever is still queued and close the core.
    pub async fn close_api(&self) {
        self.shutdown_token.cancel();
        self.queue.close();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Execute loop ended abnormally");
            }
        }
        let pending = self.queue.take_pending();
        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "Failing queued commands");
        }
        for command in pending {
            command.fail(ErrorKind::Shutdown, CLOSED);
        }
        self.core.close().await;
    }
}

#[async_trait::async_trait]
impl ApiService for QueuedApiService {
    async fn call(&self, request: Request) -> oneshot::Receiver<Response> {
        let (command, rx) = Command::new(request);
        if let Err(e) = self.validate(command.request()) {
            tracing::debug!(error = %e, "Rejected request");
            command.fail(e.kind(), e.to_string());
            return rx;
        }

        let priority = command.priority();
        let queued = if self.wait_for_capacity {
            self.queue.enqueue(priority, command).await
        } else {
            self.queue.try_enqueue(priority, command)
        };
        if let Err(EnqueueError { reason, item }) = queued {
            let e = ServiceError::from(reason);
            item.fail(e.kind(), e.to_string());
        }
        rx
    }
}

async fn execute_loop(
    core: Arc<RemoteNamespaceCore>,
    queue: Arc<PriorityQueue<Command>>,
    limit: Option<Arc<Semaphore>>,
    shutdown_token: CancellationToken,
) {
    let commands = queue.drain();
    tokio::pin!(commands);
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => break,
            Some(_) = running.join_next(), if !running.is_empty() => {}
            next = commands.next() => {
                let Some(command) = next else { break };
                let permit = match &limit {
                    Some(limit) => tokio::select! {
                        _ = shutdown_token.cancelled() => {
                            command.fail(ErrorKind::Shutdown, CLOSED);
                            break;
                        }
                        permit = limit.clone().acquire_owned() => permit.ok(),
                    },
                    None => None,
                };
                let core = core.clone();
                running.spawn(async move {
                    command.run(&core).await;
                    drop(permit);
                });
            }
        }
    }

    while running.join_next().await.is_some() {}
    tracing::debug!("Execute loop stopped");
}
