//! Tubes - the single points through which blobs reach the CAS
//!
//! Each tube is a bounded channel drained by one consumer task. The consumer
//! forks uploads up to a fixed parallelism and answers every request on its
//! own oneshot, so replies pair 1:1 with requests whatever order uploads
//! finish in. Successful uploads are written through to the cache.

use crate::CoreError;
use std::sync::Arc;
use tessera_cache::{Cache, CacheError, IndexCache, NamespaceCache};
use tessera_model::{Address, Index, Namespace};
use tessera_store::{RemoteStore, StoreError};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

type Reply = oneshot::Sender<Result<Address, CoreError>>;

pub(crate) struct TubeRequest<T> {
    value: T,
    reply: Reply,
}

/// A blob kind a tube can carry.
#[async_trait::async_trait]
pub(crate) trait Blob: Send + Sync + 'static {
    const KIND: &'static str;

    async fn add(&self, store: &dyn RemoteStore) -> Result<Address, StoreError>;

    fn write_through(&self, cache: &dyn Cache, address: &Address) -> Result<(), CacheError>;
}

#[async_trait::async_trait]
impl Blob for Namespace {
    const KIND: &'static str = "namespace";

    async fn add(&self, store: &dyn RemoteStore) -> Result<Address, StoreError> {
        store.add_namespace(self).await
    }

    fn write_through(&self, cache: &dyn Cache, address: &Address) -> Result<(), CacheError> {
        cache.set_namespace(address, self)
    }
}

#[async_trait::async_trait]
impl Blob for Index {
    const KIND: &'static str = "index";

    async fn add(&self, store: &dyn RemoteStore) -> Result<Address, StoreError> {
        store.add_index(self).await
    }

    fn write_through(&self, cache: &dyn Cache, address: &Address) -> Result<(), CacheError> {
        cache.set_index(address, self)
    }
}

/// Sending half of a tube.
pub(crate) struct Tube<T> {
    tx: mpsc::Sender<TubeRequest<T>>,
}

impl<T: Blob> Tube<T> {
    pub(crate) fn new(
        capacity: usize,
        parallelism: usize,
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn Cache>,
    ) -> (Self, TubeConsumer<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let consumer = TubeConsumer {
            rx,
            store,
            cache,
            uploads: Arc::new(Semaphore::new(parallelism.max(1))),
        };
        (Self { tx }, consumer)
    }

    /// Store `value` and return its address once the CAS has it.
    pub(crate) async fn persist(&self, value: T) -> Result<Address, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TubeRequest { value, reply })
            .await
            .map_err(|_| CoreError::Shutdown)?;
        rx.await.map_err(|_| CoreError::Shutdown)?
    }
}

pub(crate) struct TubeConsumer<T> {
    rx: mpsc::Receiver<TubeRequest<T>>,
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn Cache>,
    uploads: Arc<Semaphore>,
}

impl<T: Blob> TubeConsumer<T> {
    /// Serve requests until `shutdown_token` is cancelled, then fail what is
    /// still queued and wait for uploads already running.
    pub(crate) async fn run(mut self, shutdown_token: CancellationToken) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => break,
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                msg = self.rx.recv() => {
                    let Some(request) = msg else { break };
                    let permit = tokio::select! {
                        _ = shutdown_token.cancelled() => {
                            let _ = request.reply.send(Err(CoreError::Shutdown));
                            break;
                        }
                        permit = self.uploads.clone().acquire_owned() => permit,
                    };
                    let Ok(permit) = permit else {
                        let _ = request.reply.send(Err(CoreError::Shutdown));
                        break;
                    };
                    let store = self.store.clone();
                    let cache = self.cache.clone();
                    in_flight.spawn(async move {
                        let result = upload(&request.value, store.as_ref(), cache.as_ref()).await;
                        let _ = request.reply.send(result);
                        drop(permit);
                    });
                }
            }
        }

        self.rx.close();
        let mut failed = 0usize;
        while let Ok(request) = self.rx.try_recv() {
            let _ = request.reply.send(Err(CoreError::Shutdown));
            failed += 1;
        }
        while in_flight.join_next().await.is_some() {}
        tracing::debug!(tube = T::KIND, failed, "Tube consumer stopped");
    }
}

async fn upload<T: Blob>(value: &T, store: &dyn RemoteStore, cache: &dyn Cache) -> Result<Address, CoreError> {
    let address = value.add(store).await?;
    if let Err(e) = value.write_through(cache, &address) {
        tracing::warn!(blob = T::KIND, address = %address, error = %e, "Cache write-through failed");
    }
    Ok(address)
}
