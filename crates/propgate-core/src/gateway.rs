//! Wiring from configuration to a ready dispatcher.

use std::sync::Arc;

use serde_json::Value;
use time::Date;

use crate::cache::{CacheMode, TtlCache};
use crate::comparables::ComparablesPolicy;
use crate::config::GatewayConfig;
use crate::context::ContextStore;
use crate::dispatcher::QueryDispatcher;
use crate::error::{ConfigError, QueryError};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::normalize::{AddressNormalizer, PlacesNormalizer};
use crate::params::ParamBag;
use crate::registry::EndpointRegistry;
use crate::resolvers::FallbackResolvers;
use crate::throttling::UpstreamThrottle;
use crate::transport::Transport;

/// Builder for [`Gateway`].
///
/// Starts from [`GatewayConfig::default`]; [`GatewayBuilder::from_env`] overlays
/// the `PROPGATE_*` environment. Tests inject an in-memory [`HttpClient`].
#[derive(Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    http: Option<Arc<dyn HttpClient>>,
    registry: Option<EndpointRegistry>,
    normalizer: Option<Arc<dyn AddressNormalizer>>,
    throttle: Option<UpstreamThrottle>,
    today: Option<fn() -> Date>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new().with_config(GatewayConfig::from_env()?))
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_registry(mut self, registry: EndpointRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Overrides the normalizer otherwise built from `places_api_key`.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn AddressNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_throttle(mut self, throttle: UpstreamThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn with_today(mut self, today: fn() -> Date) -> Self {
        self.today = Some(today);
        self
    }

    /// Fails only when the upstream API key is missing.
    pub fn build(self) -> Result<Gateway, ConfigError> {
        let config = self.config;
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));

        let mut transport = Transport::new(&config, Arc::clone(&http))?;
        if let Some(throttle) = self.throttle {
            transport = transport.with_throttle(throttle);
        }

        let cache = TtlCache::new(config.cache_ttl);
        let resolvers = Arc::new(FallbackResolvers::new(
            Arc::new(transport),
            cache,
            ContextStore::new(),
            config.resolver_attempts,
            config.resolver_delay,
        ));

        let registry = Arc::new(self.registry.unwrap_or_default());
        let mut dispatcher = QueryDispatcher::new(Arc::clone(&registry), Arc::clone(&resolvers));

        let normalizer = self.normalizer.or_else(|| {
            config.places_api_key.as_ref().map(|key| {
                Arc::new(PlacesNormalizer::new(Arc::clone(&http), key.clone()).with_timeout_ms(config.timeout_ms))
                    as Arc<dyn AddressNormalizer>
            })
        });
        if let Some(normalizer) = normalizer {
            dispatcher = dispatcher.with_normalizer(normalizer);
        }
        if let Some(today) = self.today {
            dispatcher = dispatcher.with_today(today);
        }

        let dispatcher = Arc::new(dispatcher);
        tracing::debug!(
            base_url = %config.base_url,
            endpoints = registry.len(),
            "gateway ready"
        );

        Ok(Gateway {
            comparables: ComparablesPolicy::new(Arc::clone(&dispatcher)),
            dispatcher,
            resolvers,
            config,
        })
    }
}

/// Entry point for callers: dispatcher, resolvers and comparables policy
/// sharing one cache and one context store.
#[derive(Debug, Clone)]
pub struct Gateway {
    dispatcher: Arc<QueryDispatcher>,
    resolvers: Arc<FallbackResolvers>,
    comparables: ComparablesPolicy,
    config: GatewayConfig,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn dispatcher(&self) -> &QueryDispatcher {
        &self.dispatcher
    }

    pub fn resolvers(&self) -> &FallbackResolvers {
        &self.resolvers
    }

    pub fn comparables(&self) -> &ComparablesPolicy {
        &self.comparables
    }

    pub fn registry(&self) -> &EndpointRegistry {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn query(&self, endpoint_id: &str, params: ParamBag) -> Result<Value, QueryError> {
        self.dispatcher.execute(endpoint_id, params).await
    }

    pub async fn query_cached(
        &self,
        endpoint_id: &str,
        params: ParamBag,
        mode: CacheMode,
    ) -> Result<Value, QueryError> {
        self.dispatcher
            .execute_cached(endpoint_id, params, mode)
            .await
    }
}
