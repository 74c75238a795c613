//! Fallback resolvers that derive missing identifiers.
//!
//! Every resolver follows the same shape: consult the [`ContextStore`], then
//! the [`TtlCache`], then perform the lookup through the [`Transport`] inside
//! its own fixed-delay attempt loop, and finally merge what it learned back
//! into both. Exhausted attempts degrade to `None`; they never fail the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::cache::TtlCache;
use crate::context::{address_key, id_key, ContextStore};
use crate::error::StructuredError;
use crate::geo::{self, NEIGHBORHOOD_SUBTYPE, SCHOOL_SUBTYPE};
use crate::params::{bag, ParamBag};
use crate::registry::{
    ADDRESS1_PARAM, ADDRESS2_PARAM, COMMUNITY_PROFILE_PATH, GEO_ID_PARAM, ID_PARAM,
    PROPERTY_DETAIL_PATH, SCHOOL_PROFILE_PATH,
};
use crate::retry::RetryConfig;
use crate::transport::{FetchOptions, Transport};

/// First record of a property-detail style payload.
pub fn first_property(payload: &Value) -> Option<&Value> {
    payload.get("property")?.as_array()?.first()
}

/// Canonical property identifier of a record, as text.
pub fn extract_property_id(record: &Value) -> Option<String> {
    let identifier = record.get("identifier")?;
    ["attomId", "Id", "id"]
        .iter()
        .filter_map(|field| identifier.get(*field))
        .find_map(|value| match value {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
}

fn discover_geo_ids(record: &Value) -> BTreeMap<String, String> {
    record
        .get("location")
        .map(geo::discover)
        .unwrap_or_default()
}

/// What a single property-detail lookup taught us.
#[derive(Debug, Clone, Default)]
struct Discovery {
    id: Option<String>,
    geo_ids: BTreeMap<String, String>,
}

impl Discovery {
    fn from_payload(payload: &Value) -> Self {
        first_property(payload)
            .map(|record| Self {
                id: extract_property_id(record),
                geo_ids: discover_geo_ids(record),
            })
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct FallbackResolvers {
    transport: Arc<Transport>,
    cache: TtlCache,
    contexts: ContextStore,
    retry: RetryConfig,
    ttl: Duration,
}

impl FallbackResolvers {
    /// `attempts` whole lookups per resolution, `delay` apart.
    pub fn new(
        transport: Arc<Transport>,
        cache: TtlCache,
        contexts: ContextStore,
        attempts: u32,
        delay: Duration,
    ) -> Self {
        let ttl = cache.default_ttl();
        Self {
            transport,
            cache,
            contexts,
            retry: RetryConfig::fixed(delay, attempts.max(1) - 1),
            ttl,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    /// Property identifier for an address pair; `None` when not found or
    /// when every attempt failed.
    pub async fn resolve_id_from_address(&self, address1: &str, address2: &str) -> Option<String> {
        let key = address_key(address1, address2);
        if let Some(id) = self.contexts.resolved_id(&key) {
            return Some(id);
        }
        let cache_key = format!("id:{key}");
        if let Some(id) = self.cache.get(&cache_key).await.as_ref().and_then(Value::as_str) {
            self.contexts.merge(&key, Some(id), &BTreeMap::new());
            return Some(id.to_owned());
        }

        let query = address_query(address1, address2);
        let discovery = self.lookup_detail("property id from address", &query).await?;
        self.remember(&key, &discovery).await;
        if discovery.id.is_none() {
            tracing::debug!(address = %key, "no property record matched address");
        }
        discovery.id
    }

    /// Geo id of `subtype` for an address pair.
    ///
    /// Every subtype discovered by the lookup is merged into the address
    /// context, so later requests for other subtypes need no upstream call.
    pub async fn resolve_geo_id_from_address(
        &self,
        address1: &str,
        address2: &str,
        subtype: &str,
    ) -> Option<String> {
        let key = address_key(address1, address2);
        let query = address_query(address1, address2);
        self.resolve_geo_id(&key, &query, subtype).await
    }

    /// Geo id of `subtype` for an already-known property identifier.
    pub async fn resolve_geo_id_from_id(&self, id: &str, subtype: &str) -> Option<String> {
        let key = id_key(id);
        let query = bag([(ID_PARAM, json!(id.trim()))]);
        self.resolve_geo_id(&key, &query, subtype).await
    }

    async fn resolve_geo_id(&self, key: &str, query: &ParamBag, subtype: &str) -> Option<String> {
        if let Some(code) = self.contexts.geo_id(key, subtype) {
            return Some(code);
        }
        let cache_key = format!("geo:{key}");
        if let Some(cached) = self.cache.get(&cache_key).await {
            let geo_ids = geo_map_from_value(&cached);
            self.contexts.merge(key, None, &geo_ids);
            return geo_ids.get(&subtype.to_ascii_uppercase()).cloned();
        }

        let discovery = self.lookup_detail("geo id", query).await?;
        self.remember(key, &discovery).await;
        let code = discovery.geo_ids.get(&subtype.to_ascii_uppercase()).cloned();
        if code.is_none() {
            tracing::debug!(subject = %key, subtype, "lookup carried no geo id of requested subtype");
        }
        code
    }

    /// School profile for a geo id. Returns `None` without any network call
    /// unless the id carries the school prefix.
    pub async fn school_by_geo_id(&self, geo_id: &str) -> Option<Value> {
        self.profile_by_geo_id(geo_id, SCHOOL_SUBTYPE, SCHOOL_PROFILE_PATH, "school")
            .await
    }

    /// Community profile for a geo id. Returns `None` without any network
    /// call unless the id carries the neighborhood prefix.
    pub async fn community_by_geo_id(&self, geo_id: &str) -> Option<Value> {
        self.profile_by_geo_id(geo_id, NEIGHBORHOOD_SUBTYPE, COMMUNITY_PROFILE_PATH, "community")
            .await
    }

    async fn profile_by_geo_id(
        &self,
        geo_id: &str,
        prefix: &str,
        path: &'static str,
        kind: &'static str,
    ) -> Option<Value> {
        if !geo::has_prefix(geo_id, prefix) {
            tracing::debug!(geo_id, kind, "geo id lacks required subtype prefix");
            return None;
        }
        let cache_key = format!("{kind}:{}", geo_id.trim());
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Some(cached);
        }

        let query = bag([(GEO_ID_PARAM, json!(geo_id.trim()))]);
        let options = FetchOptions::default();
        let payload = self
            .with_attempts(kind, || self.transport.fetch(path, &query, &options))
            .await?;
        self.cache
            .set(cache_key, payload.clone(), Some(self.ttl))
            .await;
        Some(payload)
    }

    async fn lookup_detail(&self, what: &'static str, query: &ParamBag) -> Option<Discovery> {
        let options = FetchOptions::default();
        let payload = self
            .with_attempts(what, || {
                self.transport.fetch(PROPERTY_DETAIL_PATH, query, &options)
            })
            .await?;
        Some(Discovery::from_payload(&payload))
    }

    /// Merges a discovery into the context and caches positive results only.
    async fn remember(&self, key: &str, discovery: &Discovery) {
        self.contexts
            .merge(key, discovery.id.as_deref(), &discovery.geo_ids);

        if let Some(id) = &discovery.id {
            self.cache
                .set(format!("id:{key}"), json!(id), Some(self.ttl))
                .await;
        }
        if !discovery.geo_ids.is_empty() {
            let known = self
                .contexts
                .snapshot(key)
                .map(|context| context.geo_ids_by_subtype)
                .unwrap_or_default();
            self.cache
                .set(format!("geo:{key}"), json!(known), Some(self.ttl))
                .await;
        }
    }

    /// Runs `operation` up to the resolver budget, logging and swallowing
    /// each failure. `None` once every attempt has failed.
    async fn with_attempts<T, F, Fut>(&self, what: &str, mut operation: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StructuredError>>,
    {
        let attempts = self.retry.total_attempts();
        for attempt in 0..attempts {
            match operation().await {
                Ok(value) => return Some(value),
                Err(error) => {
                    tracing::warn!(
                        resolver = what,
                        attempt = attempt + 1,
                        attempts,
                        error = %error,
                        "fallback lookup failed"
                    );
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }
        tracing::warn!(resolver = what, attempts, "fallback lookup exhausted; continuing without it");
        None
    }
}

fn address_query(address1: &str, address2: &str) -> ParamBag {
    bag([
        (ADDRESS1_PARAM, json!(address1.trim())),
        (ADDRESS2_PARAM, json!(address2.trim())),
    ])
}

fn geo_map_from_value(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(subtype, code)| Some((subtype.clone(), code.as_str()?.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}
