//! End-to-end behaviour of RemoteNamespaceCore over an in-memory peer.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_cache::{Cache, HeadStore, MemoryCache};
use tessera_core::{
    CoreConfig, CoreError, CoreOptions, ReflectKind, RemoteNamespaceCore, Response, SearchResult, Searcher,
};
use tessera_model::{join_all, Address, Entry, ErrorKind, Index, KeyStore, Link, Namespace, PrivateKey, Row, Table};
use tessera_query::{JoinQuery, JoinRow, Query, SelectQuery};
use tessera_store::{MemoryNetwork, MemoryPeer, PeerStore, RemoteStore, StoreError};
use tokio::sync::{Notify, Semaphore};

fn single(table: &str, row: &str, entry: &str, text: &str) -> Namespace {
    Namespace::single(
        table,
        Table::new().with_row(row, Row::new().with_entry(entry, Entry::from_texts([text]))),
    )
}

fn options(is_public_index: bool) -> CoreOptions {
    CoreOptions {
        pulse_interval: Duration::from_secs(3600),
        is_public_index,
        ..CoreOptions::default()
    }
}

struct Fixture {
    peer: Arc<MemoryPeer>,
    store: Arc<PeerStore<MemoryPeer>>,
    cache: Arc<MemoryCache>,
    keys: Arc<KeyStore>,
    core: RemoteNamespaceCore,
}

impl Fixture {
    async fn start(is_public_index: bool) -> Self {
        let peer = Arc::new(MemoryPeer::new("local", &MemoryNetwork::new()));
        let store = Arc::new(PeerStore::new(peer.clone()));
        let cache = Arc::new(MemoryCache::default());
        let keys = Arc::new(KeyStore::new());
        keys.put_private_key(PrivateKey::generate()).unwrap();
        let core = RemoteNamespaceCore::start(
            CoreConfig::new(store.clone(), cache.clone(), keys.clone()).options(options(is_public_index)),
        )
        .await
        .unwrap();
        Self {
            peer,
            store,
            cache,
            keys,
            core,
        }
    }

    fn private_keys(&self) -> Vec<PrivateKey> {
        self.keys.get_all_private_keys().unwrap()
    }

    async fn index(&self) -> Index {
        self.core.reflect(ReflectKind::Index).await.index.unwrap()
    }
}

fn assert_ok(response: &Response) {
    assert!(response.err.is_none(), "unexpected error: {response}");
}

#[tokio::test]
async fn replicate_is_idempotent() {
    let fx = Fixture::start(true).await;
    let na = fx.store.add_namespace(&single("cars", "car10", "driver", "Mr Blogs")).await.unwrap();
    let index = Index::single("cars", Link::unsigned(na));
    let ia = fx.store.add_index(&index).await.unwrap();

    let response = fx.core.replicate(&[Link::unsigned(ia.clone())]).await;
    assert_ok(&response);
    assert_eq!(response.msg, "Update ok");
    assert_eq!(fx.core.flush().await.unwrap(), Some(ia.clone()));

    assert_eq!(fx.core.reflect(ReflectKind::HeadPath).await.path, Some(ia.clone()));
    assert_eq!(fx.index().await, index);
    let dump = fx.core.reflect(ReflectKind::DumpNamespace).await;
    assert_eq!(dump.namespace, Some(single("cars", "car10", "driver", "Mr Blogs")));

    let again = fx.core.replicate(&[Link::unsigned(ia.clone())]).await;
    assert_ok(&again);
    assert!(!fx.core.is_dirty());
    assert_eq!(fx.core.flush().await.unwrap(), None);
    assert_eq!(fx.index().await, index);
    assert_eq!(fx.core.head().unwrap(), Some(ia));
}

#[tokio::test]
async fn join_table_then_select_returns_it() {
    let fx = Fixture::start(false).await;
    let table = JoinQuery::new("cars")
        .row(JoinRow::new("car10").set("driver", "Mr Blogs"))
        .to_table(&fx.private_keys());

    let ib = fx.core.join_table("cars", table.clone()).await.unwrap();

    let stored = fx.store.cat_index(&ib).await.unwrap();
    let public = fx.keys.get_all_public_keys().unwrap();
    assert!(stored.links("cars").all(|link| link.is_verified_by_any(&public)));
    assert_eq!(fx.index().await, stored);

    let response = fx.core.run_query(&SelectQuery::new("cars").limit(10).into()).await;
    assert_ok(&response);
    assert_eq!(response.namespace, Some(Namespace::single("cars", table)));
}

#[tokio::test]
async fn join_query_answers_with_index_path() {
    let fx = Fixture::start(false).await;
    let query: Query = JoinQuery::new("cars")
        .row(JoinRow::new("car10").set("driver", "Mr Blogs"))
        .into();

    let response = fx.core.run_query(&query).await;
    assert_ok(&response);
    let path = response.path.unwrap();
    assert_eq!(fx.store.cat_index(&path).await.unwrap(), fx.index().await);

    let invalid = fx.core.run_query(&JoinQuery::new("cars").into()).await;
    assert_eq!(invalid.err.unwrap().kind, ErrorKind::Input);
}

#[tokio::test]
async fn dump_merges_all_tables() {
    let fx = Fixture::start(true).await;
    let namespaces = [
        single("ta", "r", "e", "a"),
        single("tb", "r", "e", "b"),
        single("tc", "r", "e", "c"),
    ];
    let mut index = Index::new();
    for (table, namespace) in ["ta", "tb", "tc"].into_iter().zip(&namespaces) {
        let address = fx.store.add_namespace(namespace).await.unwrap();
        index.add_link(table, Link::unsigned(address));
    }
    let ii = fx.store.add_index(&index).await.unwrap();

    assert_ok(&fx.core.replicate(&[Link::unsigned(ii)]).await);

    let dump = fx.core.reflect(ReflectKind::DumpNamespace).await;
    assert_ok(&dump);
    assert_eq!(dump.msg, "Dump ok");
    assert_eq!(dump.namespace, Some(join_all(namespaces)));
}

#[tokio::test]
async fn dump_records_missing_namespaces() {
    let fx = Fixture::start(true).await;
    let present = fx.store.add_namespace(&single("ta", "r", "e", "a")).await.unwrap();
    let index = Index::single("ta", Link::unsigned(present))
        .with_link("tb", Link::unsigned(Address::new("QmMissing").unwrap()));
    let ii = fx.store.add_index(&index).await.unwrap();
    assert_ok(&fx.core.replicate(&[Link::unsigned(ii)]).await);

    let dump = fx.core.reflect(ReflectKind::DumpNamespace).await;
    assert_ok(&dump);
    assert_eq!(dump.msg, "Dump ok with load failures");
    assert_eq!(dump.namespace, Some(single("ta", "r", "e", "a")));
}

/// Stops after the first namespace it sees.
#[derive(Default)]
struct FirstOnly {
    seen: Vec<Address>,
}

impl Searcher for FirstOnly {
    fn reachable(&self, index: &Index) -> Vec<Link> {
        index.links("cars").cloned().collect()
    }

    fn search(&mut self, result: SearchResult) -> Result<ControlFlow<()>, CoreError> {
        if let SearchResult::Namespace { address, .. } = result {
            self.seen.push(address);
        }
        Ok(ControlFlow::Break(()))
    }
}

#[tokio::test]
async fn traverse_stops_reading_after_break() {
    let fx = Fixture::start(true).await;
    let mut index = Index::new();
    for driver in ["A", "B", "C"] {
        let address = fx.store.add_namespace(&single("cars", driver, "driver", driver)).await.unwrap();
        index.add_link("cars", Link::unsigned(address));
    }
    let ii = fx.store.add_index(&index).await.unwrap();
    assert_ok(&fx.core.replicate(&[Link::unsigned(ii)]).await);

    let before = fx.peer.cat_count();
    let mut searcher = FirstOnly::default();
    fx.core.load_traverse(&mut searcher).await.unwrap();

    assert_eq!(searcher.seen.len(), 1);
    assert_eq!(fx.peer.cat_count(), before + 1);
}

/// Passes through to a real store but can be told to refuse indices.
struct RefusingIndexStore {
    inner: PeerStore<MemoryPeer>,
    refuse: AtomicBool,
}

#[async_trait::async_trait]
impl RemoteStore for RefusingIndexStore {
    async fn add_namespace(&self, namespace: &Namespace) -> Result<Address, StoreError> {
        self.inner.add_namespace(namespace).await
    }

    async fn cat_namespace(&self, address: &Address) -> Result<Namespace, StoreError> {
        self.inner.cat_namespace(address).await
    }

    async fn add_index(&self, index: &Index) -> Result<Address, StoreError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(tessera_store::PeerError::Down.into());
        }
        self.inner.add_index(index).await
    }

    async fn cat_index(&self, address: &Address) -> Result<Index, StoreError> {
        self.inner.cat_index(address).await
    }
}

#[tokio::test]
async fn failed_index_write_leaves_image_untouched() {
    let store = Arc::new(RefusingIndexStore {
        inner: PeerStore::new(Arc::new(MemoryPeer::new("local", &MemoryNetwork::new()))),
        refuse: AtomicBool::new(false),
    });
    let keys = Arc::new(KeyStore::new());
    keys.put_private_key(PrivateKey::generate()).unwrap();
    let core = RemoteNamespaceCore::start(
        CoreConfig::new(store.clone(), Arc::new(MemoryCache::default()), keys).options(options(false)),
    )
    .await
    .unwrap();

    core.join_table("cars", single("cars", "car10", "driver", "A").get_table("cars").unwrap().clone())
        .await
        .unwrap();
    let head = core.flush().await.unwrap();
    assert!(head.is_some());
    let image = core.reflect(ReflectKind::Index).await.index;

    store.refuse.store(true, Ordering::SeqCst);
    let err = core
        .join_table("people", single("people", "ada", "age", "36").get_table("people").unwrap().clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientIo);

    assert_eq!(core.reflect(ReflectKind::Index).await.index, image);
    assert!(!core.is_dirty());
    assert_eq!(core.flush().await.unwrap(), None);
    assert_eq!(core.head().unwrap(), head);
}

#[tokio::test]
async fn untrusted_link_is_skipped() {
    let fx = Fixture::start(false).await;
    let na = fx.store.add_namespace(&single("cars", "car10", "driver", "A")).await.unwrap();
    let stranger = PrivateKey::generate();
    let ia = fx
        .store
        .add_index(&Index::single("cars", Link::signed(na, std::slice::from_ref(&stranger))))
        .await
        .unwrap();

    let response = fx.core.replicate(&[Link::signed(ia, &[stranger])]).await;
    assert_ok(&response);
    assert_eq!(response.msg, "Update ok with load failures");
    assert_eq!(fx.index().await, Index::new());
    assert!(!fx.core.is_dirty());
}

#[tokio::test]
async fn trusted_link_is_merged_alongside_failures() {
    let fx = Fixture::start(false).await;
    let keys = fx.private_keys();
    let na = fx.store.add_namespace(&single("cars", "car10", "driver", "A")).await.unwrap();
    let index = Index::single("cars", Link::signed(na, &keys));
    let ia = fx.store.add_index(&index).await.unwrap();

    let response = fx
        .core
        .replicate(&[
            Link::signed(ia, &keys),
            Link::signed(Address::new("QmMissing").unwrap(), &keys),
        ])
        .await;
    assert_eq!(response.msg, "Update ok with load failures");
    assert_eq!(fx.index().await, index);
    assert!(fx.core.is_dirty());
}

#[tokio::test]
async fn private_traverse_reports_untrusted_namespaces() {
    let fx = Fixture::start(false).await;
    let keys = fx.private_keys();
    let signed = fx.store.add_namespace(&single("cars", "car10", "driver", "A")).await.unwrap();
    let unsigned = fx.store.add_namespace(&single("cars", "car11", "driver", "B")).await.unwrap();
    let index = Index::single("cars", Link::signed(signed, &keys)).with_link("cars", Link::unsigned(unsigned));
    let ia = fx.store.add_index(&index).await.unwrap();

    let response = fx.core.replicate(&[Link::signed(ia, &keys)]).await;
    assert_ok(&response);
    assert_eq!(response.msg, "Update ok");

    let before = fx.peer.cat_count();
    let dump = fx.core.reflect(ReflectKind::DumpNamespace).await;
    assert_ok(&dump);
    assert_eq!(dump.msg, "Dump ok with load failures");
    assert_eq!(dump.namespace, Some(single("cars", "car10", "driver", "A")));

    let select = fx.core.run_query(&SelectQuery::new("cars").limit(10).into()).await;
    assert_ok(&select);
    assert_eq!(select.msg, "Select ok with load failures");
    assert_eq!(select.namespace, Some(single("cars", "car10", "driver", "A")));
    // The unsigned namespace is never read.
    assert_eq!(fx.peer.cat_count(), before + 1);
}

#[tokio::test]
async fn head_path_without_head_is_an_error() {
    let fx = Fixture::start(true).await;
    let response = fx.core.reflect(ReflectKind::HeadPath).await;
    assert_eq!(response.msg, tessera_core::ERROR_MSG);
    assert_eq!(response.err.unwrap().kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn restart_seeds_image_from_head() {
    let fx = Fixture::start(false).await;
    let table = single("cars", "car10", "driver", "A").get_table("cars").unwrap().clone();
    fx.core.join_table("cars", table).await.unwrap();
    let image = fx.index().await;
    fx.core.close().await;
    assert!(fx.cache.load_head().unwrap().is_some());

    let cache: Arc<dyn Cache> = fx.cache.clone();
    let restarted = RemoteNamespaceCore::start(
        CoreConfig::new(fx.store.clone(), cache, fx.keys.clone()).options(options(false)),
    )
    .await
    .unwrap();
    assert_eq!(restarted.reflect(ReflectKind::Index).await.index, Some(image));
    assert!(!restarted.is_dirty());
    restarted.close().await;
}

#[tokio::test]
async fn closed_core_refuses_writes() {
    let fx = Fixture::start(true).await;
    fx.core.close().await;
    fx.core.close().await;

    let table = single("cars", "car10", "driver", "A").get_table("cars").unwrap().clone();
    let err = fx.core.join_table("cars", table).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn pulse_moves_head() {
    let peer = Arc::new(MemoryPeer::new("local", &MemoryNetwork::new()));
    let keys = Arc::new(KeyStore::new());
    let options = CoreOptions {
        pulse_interval: Duration::from_secs(1),
        is_public_index: true,
        ..CoreOptions::default()
    };
    let core = RemoteNamespaceCore::start(
        CoreConfig::new(Arc::new(PeerStore::new(peer)), Arc::new(MemoryCache::default()), keys).options(options),
    )
    .await
    .unwrap();

    let table = single("cars", "car10", "driver", "A").get_table("cars").unwrap().clone();
    let joined = core.join_table("cars", table).await.unwrap();
    assert_eq!(core.head().unwrap(), None);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(core.head().unwrap(), Some(joined));
    assert!(!core.is_dirty());
}

/// Holds index uploads until released.
struct HeldIndexStore {
    inner: PeerStore<MemoryPeer>,
    hold: AtomicBool,
    entered: Notify,
    gate: Semaphore,
}

#[async_trait::async_trait]
impl RemoteStore for HeldIndexStore {
    async fn add_namespace(&self, namespace: &Namespace) -> Result<Address, StoreError> {
        self.inner.add_namespace(namespace).await
    }

    async fn cat_namespace(&self, address: &Address) -> Result<Namespace, StoreError> {
        self.inner.cat_namespace(address).await
    }

    async fn add_index(&self, index: &Index) -> Result<Address, StoreError> {
        if self.hold.load(Ordering::SeqCst) {
            self.entered.notify_one();
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        self.inner.add_index(index).await
    }

    async fn cat_index(&self, address: &Address) -> Result<Index, StoreError> {
        self.inner.cat_index(address).await
    }
}

#[tokio::test(start_paused = true)]
async fn close_keeps_head_written_by_running_pulse() {
    let store = Arc::new(HeldIndexStore {
        inner: PeerStore::new(Arc::new(MemoryPeer::new("local", &MemoryNetwork::new()))),
        hold: AtomicBool::new(false),
        entered: Notify::new(),
        gate: Semaphore::new(0),
    });
    let cache = Arc::new(MemoryCache::default());
    let options = CoreOptions {
        pulse_interval: Duration::from_secs(1),
        is_public_index: true,
        ..CoreOptions::default()
    };
    let core = RemoteNamespaceCore::start(
        CoreConfig::new(store.clone(), cache.clone(), Arc::new(KeyStore::new())).options(options),
    )
    .await
    .unwrap();

    let table = single("cars", "car10", "driver", "A").get_table("cars").unwrap().clone();
    core.join_table("cars", table).await.unwrap();
    let image = core.reflect(ReflectKind::Index).await.index.unwrap();

    // Let the pulse start writing the image, then close while it waits.
    store.hold.store(true, Ordering::SeqCst);
    store.entered.notified().await;
    tokio::join!(core.close(), async {
        tokio::task::yield_now().await;
        store.gate.add_permits(8);
    });

    let expected = store.inner.add_index(&image).await.unwrap();
    assert_eq!(cache.load_head().unwrap(), Some(expected));
    assert!(!core.is_dirty());
}
