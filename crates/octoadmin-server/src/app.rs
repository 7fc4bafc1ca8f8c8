//! Process-wide wiring of the request pipeline, cache store and presence registry.

use std::sync::Arc;

use octoadmin_cache::CacheStore;
use octoadmin_pipeline::{ExecutionMetrics, Pipeline, PipelineBuilder};
use octoadmin_presence::{BroadcastNotifier, PresenceChange, PresenceRegistry};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// Shared services of one admin process. Cloning shares the same instances.
#[derive(Clone)]
pub struct AdminCore {
    config: Arc<AppConfig>,
    cache: Arc<CacheStore>,
    notifier: Arc<BroadcastNotifier>,
    presence: Arc<PresenceRegistry>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
}

impl AdminCore {
    /// Builds the services from `config`. `register` adds handlers, validators and
    /// an authorizer to the pipeline before it is frozen.
    pub fn new<F>(config: AppConfig, register: F) -> Self
    where
        F: FnOnce(PipelineBuilder) -> PipelineBuilder,
    {
        let cache = Arc::new(CacheStore::new(config.cache.store_config()));
        let notifier = Arc::new(BroadcastNotifier::with_capacity(
            config.presence.channel_capacity,
        ));
        let presence = Arc::new(PresenceRegistry::with_notifier(notifier.clone()));

        let builder = Pipeline::builder()
            .config(config.pipeline.clone())
            .cache(Arc::clone(&cache))
            .execution_metrics(Arc::new(ExecutionMetrics::new()));
        let pipeline = Arc::new(register(builder).build());

        Self {
            config: Arc::new(config),
            cache,
            notifier,
            presence,
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    pub fn subscribe_presence(&self) -> broadcast::Receiver<PresenceChange> {
        self.notifier.subscribe()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Starts the expiry sweeper and the presence change log.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!(
            sweep_interval_secs = self.config.cache.sweep_interval_secs,
            failure_policy = ?self.config.pipeline.failure_policy,
            "starting admin core"
        );
        vec![
            self.cache.spawn_sweeper(self.shutdown.clone()),
            self.spawn_presence_log(),
        ]
    }

    /// Signals background tasks to stop.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("shutting down admin core");
            self.shutdown.cancel();
        }
    }

    fn spawn_presence_log(&self) -> JoinHandle<()> {
        let mut changes = self.notifier.subscribe();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) => debug!(
                            context = %change.context,
                            members = change.members.len(),
                            "presence changed"
                        ),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "presence log lagged behind");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}

impl std::fmt::Debug for AdminCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCore")
            .field("cache", &self.cache)
            .field("presence", &self.presence)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octoadmin_presence::PresenceEntry;
    use std::time::Duration;

    #[tokio::test]
    async fn test_start_and_shutdown_stop_background_tasks() {
        let core = AdminCore::new(AppConfig::default(), |b| b);
        let tasks = core.start();
        assert_eq!(tasks.len(), 2);

        core.shutdown();
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .expect("task stops on shutdown")
                .unwrap();
        }
        assert!(core.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_presence_changes_reach_subscribers() {
        let core = AdminCore::new(AppConfig::default(), |b| b);
        let mut rx = core.subscribe_presence();

        core.presence()
            .connect(PresenceEntry::new("alice", "Alice"))
            .await;

        let change = rx.recv().await.unwrap();
        assert_eq!(change.members.len(), 1);
        assert_eq!(change.members[0].identity, "alice");
    }

    #[test]
    fn test_pipeline_shares_the_cache_store() {
        let core = AdminCore::new(AppConfig::default(), |b| b);
        assert!(Arc::ptr_eq(core.cache(), core.pipeline().cache()));
    }
}
