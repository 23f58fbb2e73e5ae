//! RemoteNamespaceCore - owner of the merged index
//!
//! All blob writes go through the namespace and index tubes. A write reaches
//! the [`MemoryImage`] only after its index is in the CAS, and a pulse task
//! later stores the image as a new index and moves HEAD to it.
//!
//! Three background tasks run until [`RemoteNamespaceCore::close`]: one
//! consumer per tube and the pulse.

use crate::api::{ReflectKind, Request, RequestKind, Response};
use crate::search::{DumpSearcher, SearchResult, Searcher, SelectSearcher};
use crate::tube::{Tube, TubeConsumer};
use crate::CoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_cache::{Cache, HeadCache, IndexCache, MemoryImage, NamespaceCache};
use tessera_model::{join_all, Address, Index, Join, KeyStore, Link, Namespace, PublicKey, Table};
use tessera_query::{FunctionNamespace, JoinQuery, Query, QueryError, SelectQuery};
use tessera_store::RemoteStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const UPDATE_OK: &str = "Update ok";
const UPDATE_OK_WITH_FAILURES: &str = "Update ok with load failures";

/// Tunables of a core.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// How often a dirty image is written out and HEAD moved.
    pub pulse_interval: Duration,
    /// Accept links and namespaces without checking their signatures.
    pub is_public_index: bool,
    pub tube_capacity: usize,
    /// Concurrent CAS uploads per tube.
    pub upload_parallelism: usize,
    pub functions: FunctionNamespace,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            pulse_interval: Duration::from_secs(5),
            is_public_index: false,
            tube_capacity: 32,
            upload_parallelism: 4,
            functions: FunctionNamespace::standard(),
        }
    }
}

/// Collaborators a core is started with.
pub struct CoreConfig {
    pub store: Arc<dyn RemoteStore>,
    pub cache: Arc<dyn Cache>,
    pub image: MemoryImage,
    pub keys: Arc<KeyStore>,
    pub options: CoreOptions,
}

impl CoreConfig {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<dyn Cache>, keys: Arc<KeyStore>) -> Self {
        Self {
            store,
            cache,
            image: MemoryImage::new(),
            keys,
            options: CoreOptions::default(),
        }
    }

    pub fn options(mut self, options: CoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn image(mut self, image: MemoryImage) -> Self {
        self.image = image;
        self
    }
}

/// State shared between the core and its pulse task.
struct CoreState {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn Cache>,
    head: HeadCache,
    image: MemoryImage,
    keys: Arc<KeyStore>,
    functions: FunctionNamespace,
    is_public_index: bool,
    /// Set by every join that changed the image, cleared by a flush.
    dirty: AtomicBool,
    namespace_tube: Tube<Namespace>,
    index_tube: Tube<Index>,
}

impl CoreState {
    /// Keys a link must be signed by, or `None` for a public index.
    fn trusted_keys(&self) -> Result<Option<Vec<PublicKey>>, CoreError> {
        if self.is_public_index {
            return Ok(None);
        }
        Ok(Some(self.keys.get_all_public_keys()?))
    }

    fn trusts(link: &Link, keys: &Option<Vec<PublicKey>>) -> bool {
        keys.as_deref().map_or(true, |keys| link.is_verified_by_any(keys))
    }

    async fn load_index(&self, address: &Address) -> Result<Index, CoreError> {
        match self.cache.get_index(address) {
            Ok(index) => return Ok(index),
            Err(e) if e.is_miss() => {}
            Err(e) => tracing::warn!(address = %address, error = %e, "Index cache read failed"),
        }
        let index = self.store.cat_index(address).await?;
        if let Err(e) = self.cache.set_index(address, &index) {
            tracing::warn!(address = %address, error = %e, "Index cache write failed");
        }
        Ok(index)
    }

    async fn load_namespace(&self, address: &Address) -> Result<Namespace, CoreError> {
        match self.cache.get_namespace(address) {
            Ok(namespace) => return Ok(namespace),
            Err(e) if e.is_miss() => {}
            Err(e) => tracing::warn!(address = %address, error = %e, "Namespace cache read failed"),
        }
        let namespace = self.store.cat_namespace(address).await?;
        if let Err(e) = self.cache.set_namespace(address, &namespace) {
            tracing::warn!(address = %address, error = %e, "Namespace cache write failed");
        }
        Ok(namespace)
    }

    /// Persist `index`, then join it into the image.
    async fn insert_index(&self, index: Index) -> Result<Address, CoreError> {
        let address = self.index_tube.persist(index.clone()).await?;
        if self.image.join_index(&index)? {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(address)
    }

    async fn flush(&self) -> Result<Option<Address>, CoreError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(None);
        }
        match self.write_head().await {
            Ok(address) => Ok(Some(address)),
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn write_head(&self) -> Result<Address, CoreError> {
        let index = self.image.get_index()?;
        let address = self.index_tube.persist(index).await?;
        self.commit_head(address.clone())?;
        tracing::debug!(head = %address, "Head moved");
        Ok(address)
    }

    fn commit_head(&self, address: Address) -> Result<(), CoreError> {
        let mut txn = self.head.begin_write_transaction()?;
        txn.set_head(address);
        txn.commit()?;
        Ok(())
    }
}

async fn pulse(state: Arc<CoreState>, interval: Duration, shutdown_token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = state.flush().await {
                    tracing::warn!(error = %e, "Pulse failed, retrying next tick");
                }
            }
        }
    }
    tracing::debug!("Pulse stopped");
}

pub struct RemoteNamespaceCore {
    state: Arc<CoreState>,
    /// Stops the tubes. The pulse runs on a child token so it can be
    /// stopped first.
    shutdown_token: CancellationToken,
    pulse_token: CancellationToken,
    pulse: Mutex<Option<JoinHandle<()>>>,
    tubes: Mutex<Vec<JoinHandle<()>>>,
}

impl RemoteNamespaceCore {
    /// Seed the image from HEAD, if any, and start the background tasks.
    pub async fn start(config: CoreConfig) -> Result<Self, CoreError> {
        let CoreConfig {
            store,
            cache,
            image,
            keys,
            options,
        } = config;

        let head = HeadCache::open(cache.clone())?;
        let (namespace_tube, namespace_consumer): (_, TubeConsumer<Namespace>) = Tube::new(
            options.tube_capacity,
            options.upload_parallelism,
            store.clone(),
            cache.clone(),
        );
        let (index_tube, index_consumer): (_, TubeConsumer<Index>) = Tube::new(
            options.tube_capacity,
            options.upload_parallelism,
            store.clone(),
            cache.clone(),
        );

        let state = Arc::new(CoreState {
            store,
            cache,
            head,
            image,
            keys,
            functions: options.functions,
            is_public_index: options.is_public_index,
            dirty: AtomicBool::new(false),
            namespace_tube,
            index_tube,
        });

        if let Some(address) = state.head.head()? {
            let index = state.load_index(&address).await?;
            state.image.join_index(&index)?;
            tracing::info!(head = %address, links = index.link_count(), "Seeded image from head");
        }

        let shutdown_token = CancellationToken::new();
        let pulse_token = shutdown_token.child_token();
        let tubes = vec![
            tokio::spawn(namespace_consumer.run(shutdown_token.clone())),
            tokio::spawn(index_consumer.run(shutdown_token.clone())),
        ];
        let pulse = tokio::spawn(pulse(state.clone(), options.pulse_interval, pulse_token.clone()));

        Ok(Self {
            state,
            shutdown_token,
            pulse_token,
            pulse: Mutex::new(Some(pulse)),
            tubes: Mutex::new(tubes),
        })
    }

    pub fn functions(&self) -> &FunctionNamespace {
        &self.state.functions
    }

    pub fn head(&self) -> Result<Option<Address>, CoreError> {
        Ok(self.state.head.head()?)
    }

    pub fn is_dirty(&self) -> bool {
        self.state.dirty.load(Ordering::Acquire)
    }

    /// Answer one request.
    #[tracing::instrument(skip_all, fields(kind = %request.kind()))]
    pub async fn execute(&self, request: &Request) -> Response {
        match request {
            Request::Query(query) => self.run_query(query).await,
            Request::Replicate(links) => self.replicate(links).await,
            Request::Reflect(kind) => self.reflect(*kind).await,
        }
    }

    /// Store `table` as a namespace of its own and link it into the image.
    /// Returns the address of the single-table index written for it.
    #[tracing::instrument(skip(self, table), fields(rows = table.len()))]
    pub async fn join_table(&self, name: &str, table: Table) -> Result<Address, CoreError> {
        if name.is_empty() {
            return Err(CoreError::EmptyTable);
        }
        if table.is_empty() {
            return Err(QueryError::NoRows.into());
        }

        let namespace_address = self
            .state
            .namespace_tube
            .persist(Namespace::single(name, table))
            .await?;
        let keys = self.state.keys.get_all_private_keys()?;
        let index = Index::single(name, Link::signed(namespace_address, &keys));
        let address = self.state.insert_index(index).await?;
        tracing::debug!(address = %address, "Table joined");
        Ok(address)
    }

    pub async fn run_query(&self, query: &Query) -> Response {
        if let Err(e) = query.validate(&self.state.functions) {
            return Response::from_error(RequestKind::Query, &e.into());
        }
        match query {
            Query::Select(select) => self.select(select).await,
            Query::Join(join) => self.join(join).await,
        }
    }

    async fn select(&self, query: &SelectQuery) -> Response {
        let mut searcher = SelectSearcher::new(query, &self.state.functions);
        if let Err(e) = self.load_traverse(&mut searcher).await {
            return Response::from_error(RequestKind::Query, &e);
        }
        let msg = if searcher.failures().is_empty() {
            "Select ok"
        } else {
            "Select ok with load failures"
        };
        Response::ok(RequestKind::Query, msg).with_namespace(searcher.finish())
    }

    async fn join(&self, query: &JoinQuery) -> Response {
        let keys = match self.state.keys.get_all_private_keys() {
            Ok(keys) => keys,
            Err(e) => return Response::from_error(RequestKind::Query, &e.into()),
        };
        match self.join_table(&query.table, query.to_table(&keys)).await {
            Ok(address) => Response::ok(RequestKind::Query, "Join ok").with_path(address),
            Err(e) => Response::from_error(RequestKind::Query, &e),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn reflect(&self, kind: ReflectKind) -> Response {
        let result = match kind {
            ReflectKind::HeadPath => self
                .head()
                .and_then(|head| head.ok_or(CoreError::NoHead))
                .map(|head| Response::ok(RequestKind::Reflect, "Reflect ok").with_path(head)),
            ReflectKind::Index => self
                .state
                .image
                .get_index()
                .map(|index| Response::ok(RequestKind::Reflect, "Reflect ok").with_index(index))
                .map_err(CoreError::from),
            ReflectKind::DumpNamespace => {
                let mut dump = DumpSearcher::new();
                self.load_traverse(&mut dump).await.map(|()| {
                    let msg = if dump.failures().is_empty() {
                        "Dump ok"
                    } else {
                        "Dump ok with load failures"
                    };
                    Response::ok(RequestKind::Reflect, msg).with_namespace(dump.finish())
                })
            }
        };
        result.unwrap_or_else(|e| Response::from_error(RequestKind::Reflect, &e))
    }

    /// Merge the indices behind `links` into the image.
    ///
    /// Links that are untrusted or fail to load are skipped and reported in
    /// the message; only a failure to store the merged index is an error.
    #[tracing::instrument(skip_all, fields(links = links.len()))]
    pub async fn replicate(&self, links: &[Link]) -> Response {
        match self.try_replicate(links).await {
            Ok(0) => Response::ok(RequestKind::Replicate, UPDATE_OK),
            Ok(failures) => {
                tracing::info!(failures, "Replicated with load failures");
                Response::ok(RequestKind::Replicate, UPDATE_OK_WITH_FAILURES)
            }
            Err(e) => Response::from_error(RequestKind::Replicate, &e),
        }
    }

    async fn try_replicate(&self, links: &[Link]) -> Result<usize, CoreError> {
        let keys = self.state.trusted_keys()?;
        let mut loaded = Vec::with_capacity(links.len());
        let mut failures = 0;

        for link in links {
            if !CoreState::trusts(link, &keys) {
                tracing::warn!(address = %link.address(), "Skipping link without a trusted signature");
                failures += 1;
                continue;
            }
            match self.state.load_index(link.address()).await {
                Ok(index) => loaded.push(index),
                Err(e) => {
                    tracing::warn!(address = %link.address(), error = %e, "Index load failed");
                    failures += 1;
                }
            }
        }

        if !loaded.is_empty() {
            let index: Index = join_all(loaded);
            self.state.insert_index(index).await?;
        }
        Ok(failures)
    }

    /// Feed the namespaces `searcher` selects from the image to it, one at a
    /// time, until it breaks or the links run out. Unless the index is
    /// public, untrusted links are not loaded and reach the searcher as
    /// [`CoreError::Untrusted`] failures.
    pub async fn load_traverse(&self, searcher: &mut dyn Searcher) -> Result<(), CoreError> {
        let index = match self.state.image.get_index() {
            Ok(index) => index,
            Err(e) => {
                let _ = searcher.search(SearchResult::IndexLoadFailure { error: e.into() })?;
                return Ok(());
            }
        };
        let keys = self.state.trusted_keys()?;

        for link in searcher.reachable(&index) {
            let address = link.address().clone();
            let result = if !CoreState::trusts(&link, &keys) {
                SearchResult::NamespaceLoadFailure {
                    error: CoreError::Untrusted(address.clone()),
                    address,
                }
            } else {
                match self.state.load_namespace(&address).await {
                    Ok(namespace) => SearchResult::Namespace { address, namespace },
                    Err(error) => SearchResult::NamespaceLoadFailure { address, error },
                }
            };
            if searcher.search(result)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Do what a pulse tick does now. Returns the new head, or `None` when
    /// nothing changed since the last flush.
    pub async fn flush(&self) -> Result<Option<Address>, CoreError> {
        self.state.flush().await
    }

    /// Stop the pulse, flush once more, then stop the tubes and wait for
    /// them. Requests still queued in a tube fail with [`CoreError::Shutdown`].
    pub async fn close(&self) {
        self.pulse_token.cancel();
        let pulse = self.pulse.lock().await.take();
        if let Some(pulse) = pulse {
            if let Err(e) = pulse.await {
                tracing::warn!(error = %e, "Pulse ended abnormally");
            }
        }

        if !self.shutdown_token.is_cancelled() {
            if let Err(e) = self.state.flush().await {
                tracing::warn!(error = %e, "Final flush failed");
            }
            self.shutdown_token.cancel();
        }
        let tubes = std::mem::take(&mut *self.tubes.lock().await);
        for task in tubes {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Tube consumer ended abnormally");
            }
        }
    }
}

impl Drop for RemoteNamespaceCore {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
