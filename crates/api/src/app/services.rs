//! Service wiring: stores, client cache, notification bus, clock.
//!
//! - `database_url` set → Postgres stores, otherwise in-memory stores
//! - `redis_url` set (and the `redis` feature on) → Redis pub/sub notifications,
//!   otherwise an in-process bus

use std::sync::Arc;

use rolegate_auth::{
    ClientRoleCache, InMemoryClientStorage, InMemoryOnboardingStore, InMemoryRoleStore, OnboardingStore,
    OnboardingTracker, RoleChangedEnvelope, RoleResolver, RoleStore,
};
use rolegate_core::{Clock, SystemClock};
use rolegate_events::{EventBus, InMemoryBusError, InMemoryEventBus, Subscription};
use rolegate_infra::AppConfig;
use rolegate_infra::store::{PostgresOnboardingStore, PostgresRoleStore};

#[cfg(feature = "redis")]
use rolegate_infra::event_bus::{ROLE_CHANGED_CHANNEL, RedisBusError, RedisPubSubEventBus};

pub type RoleCacheHandle = Arc<ClientRoleCache<Arc<InMemoryClientStorage>>>;
pub type Resolver = RoleResolver<Arc<dyn RoleStore>, RoleCacheHandle, NotificationBus>;
pub type Onboarding = OnboardingTracker<Arc<dyn OnboardingStore>>;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    InMemory(#[from] InMemoryBusError),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] RedisBusError),
}

/// Role-changed transport chosen at startup.
#[derive(Clone)]
pub enum NotificationBus {
    InMemory(Arc<InMemoryEventBus<RoleChangedEnvelope>>),
    #[cfg(feature = "redis")]
    Redis(RedisPubSubEventBus<RoleChangedEnvelope>),
}

impl EventBus<RoleChangedEnvelope> for NotificationBus {
    type Error = NotifyError;

    fn publish(&self, message: RoleChangedEnvelope) -> Result<(), Self::Error> {
        match self {
            NotificationBus::InMemory(bus) => Ok(bus.publish(message)?),
            #[cfg(feature = "redis")]
            NotificationBus::Redis(bus) => Ok(bus.publish(message)?),
        }
    }

    fn subscribe(&self) -> Subscription<RoleChangedEnvelope> {
        match self {
            NotificationBus::InMemory(bus) => bus.subscribe(),
            #[cfg(feature = "redis")]
            NotificationBus::Redis(bus) => bus.subscribe(),
        }
    }
}

pub struct AppServices {
    pub resolver: Resolver,
    pub onboarding: Onboarding,
}

impl AppServices {
    /// Assemble services from already-built stores.
    pub fn new(
        config: &AppConfig,
        role_store: Arc<dyn RoleStore>,
        onboarding_store: Arc<dyn OnboardingStore>,
        bus: NotificationBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(ClientRoleCache::new(
            Arc::new(InMemoryClientStorage::new()),
            config.roles.cache_freshness(),
            clock.clone(),
        ));
        let resolver = RoleResolver::new(role_store, cache, bus, clock.clone())
            .with_policy(config.roles.test_mode_policy());
        let onboarding = OnboardingTracker::new(onboarding_store, clock);

        Self { resolver, onboarding }
    }

    /// In-memory stores and bus; used for local development and tests.
    pub fn in_memory(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryRoleStore::new()),
            Arc::new(InMemoryOnboardingStore::new()),
            NotificationBus::InMemory(Arc::new(InMemoryEventBus::new())),
            clock,
        )
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus = build_bus(config)?;

    let services = match &config.database_url {
        Some(url) => {
            let pool = rolegate_infra::store::connect(url).await?;
            tracing::info!("using postgres role and onboarding stores");
            AppServices::new(
                config,
                Arc::new(PostgresRoleStore::new(pool.clone())),
                Arc::new(PostgresOnboardingStore::new(pool)),
                bus,
                clock,
            )
        }
        None => {
            tracing::warn!("database_url not set; using in-memory stores (state is lost on restart)");
            AppServices::new(
                config,
                Arc::new(InMemoryRoleStore::new()),
                Arc::new(InMemoryOnboardingStore::new()),
                bus,
                clock,
            )
        }
    };

    Ok(services)
}

fn build_bus(config: &AppConfig) -> anyhow::Result<NotificationBus> {
    match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let bus = RedisPubSubEventBus::new(url, ROLE_CHANGED_CHANNEL)?;
            tracing::info!(channel = ROLE_CHANGED_CHANNEL, "using redis role-change notifications");
            Ok(NotificationBus::Redis(bus))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("redis_url set but the redis feature is disabled; notifications stay in-process");
            Ok(NotificationBus::InMemory(Arc::new(InMemoryEventBus::new())))
        }
        None => Ok(NotificationBus::InMemory(Arc::new(InMemoryEventBus::new()))),
    }
}
