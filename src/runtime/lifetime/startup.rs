//! Server startup: builds every shared component from the static config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::analytics::http_sink::{HttpUsageNotifier, HttpWarehouseSink};
use crate::analytics::reconciler::ClickStore;
use crate::analytics::{
    AnalyticsQuery, ClickDispatcher, GeoIpLookup, GeoResolver, LocalNotifier, MaxMindProvider,
    NoopSink, ReconcileOptions, Reconciler, UsageNotifier, WarehouseSink,
};
use crate::api::services::CronGate;
use crate::buffer::{ClickBuffer, MemoryClickBuffer, RedisClickBuffer};
use crate::cache::LinkCache;
use crate::config::StaticConfig;
use crate::kv::{KvStore, MemoryKvStore, RedisKvStore};
use crate::limiter::RateLimiter;
use crate::routing::Classifier;
use crate::services::{DomainGate, LinkResolver, UsageService};
use crate::session::SessionService;
use crate::storage::SeaOrmStorage;

/// Everything the HTTP server shares across workers.
pub struct StartupContext {
    pub storage: Arc<SeaOrmStorage>,
    pub classifier: Arc<Classifier>,
    pub resolver: Arc<LinkResolver>,
    pub usage: Arc<UsageService>,
    pub dispatcher: Arc<ClickDispatcher>,
    pub reconciler: Arc<Reconciler>,
    pub analytics: Arc<AnalyticsQuery>,
    pub sessions: Arc<SessionService>,
    pub limiter: Arc<RateLimiter>,
    pub buffer: Arc<dyn ClickBuffer>,
    pub cron_gate: Arc<CronGate>,
}

/// Builds storage, caches and the analytics pipeline in dependency order.
pub async fn prepare_server_startup(config: &StaticConfig) -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install rustls crypto provider: {:?}", e))?;

    check_secret_strength(config);

    let storage = Arc::new(
        SeaOrmStorage::new(&config.database)
            .await
            .context("Failed to create storage backend")?,
    );
    info!("Using storage backend: {}", storage.get_backend_name());

    let (kv, buffer): (Arc<dyn KvStore>, Arc<dyn ClickBuffer>) = if config.redis.enabled {
        let kv = RedisKvStore::new(&config.redis.url, &config.redis.key_prefix)
            .context("Failed to connect the Redis KV store")?;
        let click_buffer = RedisClickBuffer::new(&config.redis.url, &config.redis.key_prefix)
            .context("Failed to connect the Redis click buffer")?;
        info!("Redis backing rate limits, de-dup and the click buffer");
        (Arc::new(kv), Arc::new(click_buffer))
    } else {
        debug!("Redis disabled, using in-process KV store and click buffer");
        (
            Arc::new(MemoryKvStore::new()),
            Arc::new(MemoryClickBuffer::new()),
        )
    };

    let classifier = Arc::new(Classifier::new(
        &config.domains.root_domain,
        config.cache.classifier_capacity,
    ));

    let link_cache = Arc::new(LinkCache::new(
        config.cache.link_capacity,
        Duration::from_secs(config.cache.link_ttl_secs),
    ));

    let usage = Arc::new(UsageService::new(
        storage.clone(),
        config.cache.usage_capacity,
        Duration::from_secs(config.cache.usage_ttl_secs),
    ));

    let domains = Arc::new(DomainGate::new(
        storage.clone(),
        config.cache.domain_capacity,
        Duration::from_secs(config.cache.domain_ttl_secs),
    ));

    let resolver = Arc::new(LinkResolver::new(
        storage.clone(),
        link_cache,
        usage.clone(),
        domains,
        &config.domains.root_domain,
    ));

    let warehouse: Arc<dyn WarehouseSink> =
        match HttpWarehouseSink::from_config(&config.dispatch.warehouse) {
            Some(sink) => {
                info!(
                    "Warehouse sink enabled: {}",
                    config.dispatch.warehouse.endpoint.as_deref().unwrap_or("")
                );
                Arc::new(sink)
            }
            None => {
                warn!("No warehouse endpoint configured, click events stay buffer-only");
                Arc::new(NoopSink)
            }
        };

    let notifier: Arc<dyn UsageNotifier> = match &config.dispatch.usage_endpoint {
        Some(endpoint) => {
            info!("Usage increments go to {}", endpoint);
            Arc::new(HttpUsageNotifier::new(
                endpoint.clone(),
                config.dispatch.warehouse.timeout_secs,
            ))
        }
        None => Arc::new(LocalNotifier::new(usage.clone())),
    };

    let dispatcher = Arc::new(ClickDispatcher::new(
        kv.clone(),
        buffer.clone(),
        warehouse,
        notifier,
        usage.clone(),
        Arc::new(build_geo_resolver(config)),
        Duration::from_secs(config.dispatch.dedup_window_secs),
    ));

    let click_store: Arc<dyn ClickStore> = storage.clone();
    let reconciler = Arc::new(Reconciler::new(
        buffer.clone(),
        click_store,
        usage.clone(),
        Duration::from_secs(config.reconciler.txn_timeout_secs),
    ));

    let analytics = Arc::new(AnalyticsQuery::new(storage.clone()));
    let sessions = Arc::new(SessionService::new(&config.session));
    let limiter = Arc::new(RateLimiter::new(kv, &config.rate_limit));
    let cron_gate = Arc::new(CronGate::new(&config.reconciler));

    if config.reconciler.interval_secs > 0 {
        spawn_reconcile_schedule(reconciler.clone(), config);
    }

    debug!(
        "Pre-startup processing finished in {:?}",
        start_time.elapsed()
    );

    Ok(StartupContext {
        storage,
        classifier,
        resolver,
        usage,
        dispatcher,
        reconciler,
        analytics,
        sessions,
        limiter,
        buffer,
        cron_gate,
    })
}

fn build_geo_resolver(config: &StaticConfig) -> GeoResolver {
    let provider = match config.analytics.maxminddb_path.as_deref() {
        Some(path) if !path.is_empty() => match MaxMindProvider::new(path) {
            Ok(provider) => {
                info!("MaxMind database loaded from {}", path);
                Some(Arc::new(provider) as Arc<dyn GeoIpLookup>)
            }
            Err(e) => {
                warn!(
                    "Failed to open MaxMind database {}: {}, header geo only",
                    path, e
                );
                None
            }
        },
        _ => None,
    };

    GeoResolver::new(provider)
}

/// Periodic reconcile driven from inside the process. Deployments that
/// trigger via the signed cron endpoint leave `interval_secs` at 0.
fn spawn_reconcile_schedule(reconciler: Arc<Reconciler>, config: &StaticConfig) {
    let interval = Duration::from_secs(config.reconciler.interval_secs);
    let lookback = chrono::Duration::hours(config.reconciler.lookback_hours as i64);
    let options = ReconcileOptions {
        max_batch_size: config.reconciler.max_batch_size,
        dry_run: false,
    };

    info!("Internal reconcile schedule: every {:?}", interval);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let to = chrono::Utc::now();
            let report = reconciler.reconcile(to - lookback, to, &options).await;
            if report.failed > 0 {
                warn!(
                    "Scheduled reconcile: {} clicks failed, members stay buffered",
                    report.failed
                );
            }
        }
    });
}

fn check_secret_strength(config: &StaticConfig) {
    if !config.session.jwt_secret.is_empty() && config.session.jwt_secret.len() < 32 {
        warn!("WARNING: Session JWT secret is shorter than 32 bytes. Consider a stronger secret.");
    }
    if !config.reconciler.signing_key.is_empty() && config.reconciler.signing_key.len() < 32 {
        warn!("WARNING: Cron signing key is shorter than 32 bytes. Consider a stronger key.");
    }
}
