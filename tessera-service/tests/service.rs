//! QueuedApiService in front of a live core.

use std::sync::Arc;
use std::time::Duration;
use tessera_cache::MemoryCache;
use tessera_core::{CoreConfig, CoreOptions, ReflectKind, RemoteNamespaceCore, Request, ERROR_MSG};
use tessera_model::{ErrorKind, KeyStore, PrivateKey};
use tessera_query::{JoinQuery, JoinRow, Operand, SelectQuery, Where};
use tessera_service::{ApiService, QueuedApiService, ServiceOptions};
use tessera_store::{MemoryNetwork, MemoryPeer, PeerStore};

async fn service(options: ServiceOptions) -> QueuedApiService {
    let peer = Arc::new(MemoryPeer::new("local", &MemoryNetwork::new()));
    let keys = Arc::new(KeyStore::new());
    keys.put_private_key(PrivateKey::generate()).unwrap();
    let core = RemoteNamespaceCore::start(
        CoreConfig::new(Arc::new(PeerStore::new(peer)), Arc::new(MemoryCache::default()), keys).options(
            CoreOptions {
                pulse_interval: Duration::from_secs(3600),
                ..CoreOptions::default()
            },
        ),
    )
    .await
    .unwrap();
    QueuedApiService::start(Arc::new(core), options)
}

fn join(driver: &str) -> Request {
    Request::Query(
        JoinQuery::new("cars")
            .row(JoinRow::new("car10").set("driver", driver))
            .into(),
    )
}

#[tokio::test]
async fn join_is_visible_to_a_later_select() {
    let api = service(ServiceOptions::default()).await;

    let joined = api.request(join("Mr Blogs")).await;
    assert!(joined.err.is_none(), "{joined}");
    assert!(joined.path.is_some());

    let select = SelectQuery::new("cars")
        .filter(Where::predicate("str_eq", vec![Operand::entry("driver"), Operand::literal("Mr Blogs")]))
        .limit(5);
    let selected = api.request(Request::Query(select.into())).await;
    let rows = selected.namespace.unwrap();
    assert!(rows.get_table("cars").and_then(|t| t.get_row("car10")).is_some());

    api.close_api().await;
}

#[tokio::test]
async fn invalid_requests_are_answered_without_running() {
    let api = service(ServiceOptions::default()).await;

    let zero_limit = api.request(Request::Query(SelectQuery::new("cars").limit(0).into())).await;
    assert_eq!(zero_limit.msg, ERROR_MSG);
    assert_eq!(zero_limit.err.unwrap().kind, ErrorKind::Input);

    let unknown = SelectQuery::new("cars").filter(Where::predicate("str_shout", vec![Operand::RowKey]));
    let unknown = api.request(Request::Query(unknown.into())).await;
    assert_eq!(unknown.err.unwrap().kind, ErrorKind::Input);

    let no_rows = api.request(Request::Query(JoinQuery::new("cars").into())).await;
    assert_eq!(no_rows.err.unwrap().kind, ErrorKind::Input);

    api.close_api().await;
}

#[tokio::test]
async fn unlimited_concurrency_runs_everything() {
    let api = service(ServiceOptions {
        query_limit: 0,
        wait_for_capacity: true,
        ..ServiceOptions::default()
    })
    .await;

    let mut receivers = Vec::new();
    for i in 0..16 {
        receivers.push(api.call(join(&format!("driver-{i}"))).await);
    }
    for rx in receivers {
        let response = rx.await.unwrap();
        assert!(response.err.is_none(), "{response}");
    }

    let index = api.request(Request::Reflect(ReflectKind::Index)).await.index.unwrap();
    assert!(index.link_count() >= 1);
    api.close_api().await;
}

#[tokio::test]
async fn requests_after_close_fail_as_shutdown() {
    let api = service(ServiceOptions::default()).await;
    api.close_api().await;

    let response = api.request(Request::Reflect(ReflectKind::Index)).await;
    assert_eq!(response.err.unwrap().kind, ErrorKind::Shutdown);
}
