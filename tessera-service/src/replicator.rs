//! Replicator - bridges the local core and remote peers over pub/sub
//!
//! A publish loop announces the local HEAD, signed by every private key, on
//! each topic once per interval. One subscribe loop per topic turns incoming
//! announcements into `Replicate` requests, forwarding at most one record per
//! interval tick.

use crate::ApiService;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{ReflectKind, Request};
use tessera_model::{KeyStore, Link};
use tessera_store::{DataPeer, Subscription};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ReplicatorOptions {
    pub topics: Vec<String>,
    pub interval: Duration,
}

impl Default for ReplicatorOptions {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            interval: Duration::from_secs(10),
        }
    }
}

pub struct Replicator {
    api: Arc<dyn ApiService>,
    keys: Arc<KeyStore>,
    peer: Arc<dyn DataPeer>,
    options: ReplicatorOptions,
}

impl Replicator {
    pub fn new(
        api: Arc<dyn ApiService>,
        keys: Arc<KeyStore>,
        peer: Arc<dyn DataPeer>,
        options: ReplicatorOptions,
    ) -> Self {
        Self {
            api,
            keys,
            peer,
            options,
        }
    }

    /// Spawn the publish loop and one subscribe loop per topic.
    pub fn start(self) -> ReplicatorHandle {
        let this = Arc::new(self);
        let shutdown_token = CancellationToken::new();
        let mut tasks = vec![tokio::spawn(this.clone().publish_loop(shutdown_token.clone()))];
        for topic in &this.options.topics {
            tasks.push(tokio::spawn(
                this.clone().subscribe_loop(topic.clone(), shutdown_token.clone()),
            ));
        }
        tracing::info!(topics = this.options.topics.len(), "Replicator started");
        ReplicatorHandle { shutdown_token, tasks }
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn publish_loop(self: Arc<Self>, shutdown_token: CancellationToken) {
        let mut ticker = self.ticker();
        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => break,
                _ = ticker.tick() => self.publish_head().await,
            }
        }
        tracing::debug!("Publish loop stopped");
    }

    async fn publish_head(&self) {
        let response = self.api.request(Request::Reflect(ReflectKind::HeadPath)).await;
        let Some(head) = response.path else {
            if let Some(err) = response.err {
                tracing::debug!(error = %err, "No head to publish");
            }
            return;
        };
        let keys = match self.keys.get_all_private_keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read signing keys");
                return;
            }
        };
        let payload = Link::signed(head, &keys).to_string().into_bytes();
        for topic in &self.options.topics {
            if let Err(e) = self.peer.publish(topic, payload.clone()).await {
                tracing::warn!(topic = %topic, error = %e, "Publish failed");
            }
        }
    }

    async fn subscribe_loop(self: Arc<Self>, topic: String, shutdown_token: CancellationToken) {
        let mut ticker = self.ticker();
        loop {
            let subscribed = tokio::select! {
                _ = shutdown_token.cancelled() => break,
                subscribed = self.peer.subscribe(&topic) => subscribed,
            };
            match subscribed {
                Ok(subscription) => {
                    tracing::debug!(topic = %topic, "Subscribed");
                    if self.follow(&topic, subscription, &mut ticker, &shutdown_token).await.is_break() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(topic = %topic, error = %e, "Subscribe failed"),
            }
            // Back off one tick before subscribing again.
            tokio::select! {
                _ = shutdown_token.cancelled() => break,
                _ = ticker.tick() => {}
            }
        }
        tracing::debug!(topic = %topic, "Subscribe loop stopped");
    }

    /// Forward records until the subscription fails (`Continue`) or the
    /// replicator stops (`Break`).
    async fn follow(
        &self,
        topic: &str,
        mut subscription: Box<dyn Subscription>,
        ticker: &mut tokio::time::Interval,
        shutdown_token: &CancellationToken,
    ) -> ControlFlow<()> {
        loop {
            let record = tokio::select! {
                _ = shutdown_token.cancelled() => return ControlFlow::Break(()),
                record = subscription.next() => record,
            };
            match record {
                Ok(record) => {
                    tracing::trace!(topic, from = %record.from, seq_no = record.seq_no, "Announcement");
                    self.forward(topic, &record.data).await;
                }
                Err(e) => {
                    tracing::warn!(topic, error = %e, "Subscription failed, resubscribing");
                    return ControlFlow::Continue(());
                }
            }
            tokio::select! {
                _ = shutdown_token.cancelled() => return ControlFlow::Break(()),
                _ = ticker.tick() => {}
            }
        }
    }

    async fn forward(&self, topic: &str, data: &[u8]) {
        let text = match std::str::from_utf8(data) {
            Ok(text) => text.trim(),
            Err(e) => {
                tracing::warn!(topic, error = %e, "Ignoring non-UTF-8 announcement");
                return;
            }
        };
        let link: Link = match text.parse() {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(topic, payload = text, error = %e, "Ignoring invalid announcement");
                return;
            }
        };
        let address = link.address().clone();
        let response = self.api.request(Request::Replicate(vec![link])).await;
        match response.err {
            Some(err) => tracing::warn!(topic, address = %address, error = %err, "Replicate failed"),
            None => tracing::debug!(topic, address = %address, msg = %response.msg, "Replicated"),
        }
    }
}

pub struct ReplicatorHandle {
    shutdown_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ReplicatorHandle {
    /// Cancel every loop and wait for it to finish.
    pub async fn stop(self) {
        self.shutdown_token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Replicator task ended abnormally");
            }
        }
        tracing::info!("Replicator stopped");
    }
}
