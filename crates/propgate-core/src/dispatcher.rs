//! Query dispatcher: the orchestrator between callers and the upstream.
//!
//! A call moves through `validate → dedup → resolve fallback → inject derived
//! params → execute → return`. Identical concurrent calls (same endpoint and
//! same normalized parameters) share a single round-trip: the first caller
//! leads and every later caller waits for the leader's settled result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use time::{Date, OffsetDateTime};
use tokio::sync::oneshot;

use crate::cache::CacheMode;
use crate::derived::{self, AddressComponents};
use crate::error::QueryError;
use crate::geo::ZIP_SUBTYPE;
use crate::normalize::{normalize_best_effort, AddressNormalizer, NormalizedAddress};
use crate::params::{self, get_str, is_present, ParamBag};
use crate::registry::{
    has_address_pair, DerivedParam, EndpointDescriptor, EndpointRegistry, FallbackStrategy,
    ADDRESS1_PARAM, ADDRESS2_PARAM, BULK_ENDPOINT, GEO_ID_PARAM, ID_PARAM,
};
use crate::resolvers::{first_property, FallbackResolvers};
use crate::transport::{self, FetchOptions};

type Settled = Result<Value, QueryError>;
type Waiters = Vec<oneshot::Sender<Settled>>;

/// Deterministic key for an endpoint call: `endpoint:k=v&k=v` in key order,
/// encoded exactly as the query string goes over the wire. `null` values are
/// dropped so they key the same as absent ones.
pub fn cache_key(endpoint_id: &str, params: &ParamBag) -> String {
    format!("{endpoint_id}:{}", transport::serialize_query(params))
}

fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// In-flight map shared by every call on one dispatcher.
#[derive(Debug, Clone, Default)]
struct InFlight {
    inner: Arc<Mutex<HashMap<String, Waiters>>>,
}

enum Flight {
    Leader(LeaderGuard),
    Follower(oneshot::Receiver<Settled>),
}

impl InFlight {
    /// Checks and registers in one critical section, before any await.
    fn join_or_lead(&self, key: &str) -> Flight {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Flight::Follower(rx)
            }
            None => {
                entries.insert(key.to_owned(), Vec::new());
                Flight::Leader(LeaderGuard {
                    flights: self.clone(),
                    key: key.to_owned(),
                    settled: false,
                })
            }
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Waiters>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owned by the leading caller. Removes the in-flight entry whether the
/// leader settles normally or its future is dropped mid-flight; in the latter
/// case waiters observe their sender being dropped.
struct LeaderGuard {
    flights: InFlight,
    key: String,
    settled: bool,
}

impl LeaderGuard {
    fn settle(mut self, result: &Settled) {
        let waiters = self.flights.lock().remove(&self.key).unwrap_or_default();
        self.settled = true;
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.flights.lock().remove(&self.key);
        }
    }
}

/// Address pair as used for resolution, after best-effort normalization.
#[derive(Debug, Clone)]
struct SubjectAddress {
    line1: String,
    line2: String,
    normalized: Option<NormalizedAddress>,
}

impl SubjectAddress {
    fn components(&self) -> AddressComponents {
        match &self.normalized {
            Some(normalized) => normalized.components.clone(),
            None => AddressComponents::split(&self.line1, &self.line2),
        }
    }
}

pub struct QueryDispatcher {
    registry: Arc<EndpointRegistry>,
    resolvers: Arc<FallbackResolvers>,
    normalizer: Option<Arc<dyn AddressNormalizer>>,
    in_flight: InFlight,
    today: fn() -> Date,
}

impl std::fmt::Debug for QueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("endpoints", &self.registry.len())
            .field("normalizer", &self.normalizer.is_some())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl QueryDispatcher {
    pub fn new(registry: Arc<EndpointRegistry>, resolvers: Arc<FallbackResolvers>) -> Self {
        Self {
            registry,
            resolvers,
            normalizer: None,
            in_flight: InFlight::default(),
            today: today_utc,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn AddressNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Overrides the clock used for derived date windows.
    pub fn with_today(mut self, today: fn() -> Date) -> Self {
        self.today = today;
        self
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn resolvers(&self) -> &FallbackResolvers {
        &self.resolvers
    }

    /// Number of keys with a round-trip currently in flight.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Resolves and executes `endpoint_id` with the caller's loose parameters.
    pub async fn execute(&self, endpoint_id: &str, params: ParamBag) -> Result<Value, QueryError> {
        let descriptor = self.registry.get(endpoint_id)?;

        let unsatisfied = descriptor.unsatisfied_params(&params);
        if !unsatisfied.is_empty() {
            return Err(QueryError::InvalidQuery {
                endpoint: endpoint_id.to_owned(),
                missing: unsatisfied.into_iter().map(str::to_owned).collect(),
            });
        }

        let key = cache_key(endpoint_id, &params);
        match self.in_flight.join_or_lead(&key) {
            Flight::Follower(receiver) => {
                tracing::debug!(endpoint = %endpoint_id, key = %key, "joining in-flight request");
                receiver
                    .await
                    .unwrap_or_else(|_| Err(QueryError::Abandoned { key }))
            }
            Flight::Leader(guard) => {
                let result = self.run(descriptor, params).await;
                guard.settle(&result);
                result
            }
        }
    }

    /// [`execute`](Self::execute) behind the response cache, honoring the
    /// descriptor's cache policy. Endpoints without a memory policy always
    /// go upstream.
    pub async fn execute_cached(
        &self,
        endpoint_id: &str,
        params: ParamBag,
        mode: CacheMode,
    ) -> Result<Value, QueryError> {
        let descriptor = self.registry.get(endpoint_id)?;
        let policy = descriptor.cache_policy;
        if mode == CacheMode::Bypass || !policy.use_memory {
            return self.execute(endpoint_id, params).await;
        }

        let cache = self.resolvers.cache();
        let key = format!("response:{}", cache_key(endpoint_id, &params));
        if mode == CacheMode::Use {
            if let Some(cached) = cache.get(&key).await {
                tracing::debug!(endpoint = %endpoint_id, "serving cached response");
                return Ok(cached);
            }
        }

        let payload = self.execute(endpoint_id, params).await?;
        cache
            .set(key, payload.clone(), Some(Duration::from_secs(policy.ttl_seconds)))
            .await;
        Ok(payload)
    }

    async fn run(&self, descriptor: &EndpointDescriptor, mut params: ParamBag) -> Settled {
        let mut subject = None;

        if self.needs_address(descriptor, &params) {
            subject = self.subject_address(&params).await;
        }

        if let Some(payload) = self
            .resolve_fallback(descriptor, &mut params, subject.as_ref())
            .await
        {
            return Ok(payload);
        }

        let today = (self.today)();
        for rule in descriptor.derived {
            match rule {
                DerivedParam::AddressComponents => {
                    if let Some(subject) = &subject {
                        subject.components().fill(&mut params);
                    }
                }
                window => derived::apply_window(&mut params, window, today),
            }
        }

        params.retain(|name, _| descriptor.accepts(name));

        tracing::debug!(endpoint = %descriptor.id, "executing upstream request");
        self.resolvers
            .transport()
            .fetch(descriptor.path, &params, &FetchOptions::default())
            .await
            .map_err(QueryError::from)
    }

    /// True when some missing required parameter would be filled from the
    /// caller's address pair.
    fn needs_address(&self, descriptor: &EndpointDescriptor, params: &ParamBag) -> bool {
        if !has_address_pair(params) {
            return false;
        }
        let address_fallback = match descriptor.fallback {
            FallbackStrategy::AddressToId | FallbackStrategy::TryBulkFirst => {
                !is_present(params, descriptor.id_param)
            }
            FallbackStrategy::AddressToGeoId => !is_present(params, GEO_ID_PARAM),
            FallbackStrategy::None | FallbackStrategy::IdToId => false,
        };
        let fills_components = descriptor
            .derived
            .iter()
            .any(|rule| matches!(rule, DerivedParam::AddressComponents));
        address_fallback || (fills_components && !descriptor.missing_params(params).is_empty())
    }

    async fn subject_address(&self, params: &ParamBag) -> Option<SubjectAddress> {
        let line1 = get_str(params, ADDRESS1_PARAM)?;
        let line2 = get_str(params, ADDRESS2_PARAM)?;

        let normalized = match &self.normalizer {
            Some(normalizer) => normalize_best_effort(normalizer.as_ref(), &line1, &line2).await,
            None => None,
        };
        let (line1, line2) = normalized
            .as_ref()
            .and_then(NormalizedAddress::address_lines)
            .unwrap_or((line1, line2));

        Some(SubjectAddress {
            line1,
            line2,
            normalized,
        })
    }

    /// Fills identifiers the endpoint needs. Returns a payload only when the
    /// all-fields record can stand in for the endpoint call.
    async fn resolve_fallback(
        &self,
        descriptor: &EndpointDescriptor,
        params: &mut ParamBag,
        subject: Option<&SubjectAddress>,
    ) -> Option<Value> {
        match descriptor.fallback {
            FallbackStrategy::None => None,
            FallbackStrategy::AddressToId => {
                self.fill_id(descriptor, params, subject).await;
                None
            }
            FallbackStrategy::TryBulkFirst => {
                self.fill_id(descriptor, params, subject).await;
                let id = get_str(params, descriptor.id_param)?;
                self.try_bulk(descriptor, &id).await
            }
            FallbackStrategy::AddressToGeoId => {
                if is_present(params, GEO_ID_PARAM) {
                    return None;
                }
                let subject = subject?;
                let subtype = descriptor.preferred_geo_subtype.unwrap_or(ZIP_SUBTYPE);
                let geo_id = self
                    .resolvers
                    .resolve_geo_id_from_address(&subject.line1, &subject.line2, subtype)
                    .await;
                self.insert_resolved(descriptor, params, GEO_ID_PARAM, geo_id);
                None
            }
            FallbackStrategy::IdToId => {
                if is_present(params, GEO_ID_PARAM) {
                    return None;
                }
                let id = get_str(params, ID_PARAM)?;
                let subtype = descriptor.preferred_geo_subtype.unwrap_or(ZIP_SUBTYPE);
                let geo_id = self.resolvers.resolve_geo_id_from_id(&id, subtype).await;
                self.insert_resolved(descriptor, params, GEO_ID_PARAM, geo_id);
                None
            }
        }
    }

    async fn fill_id(
        &self,
        descriptor: &EndpointDescriptor,
        params: &mut ParamBag,
        subject: Option<&SubjectAddress>,
    ) {
        if is_present(params, descriptor.id_param) {
            return;
        }
        let Some(subject) = subject else {
            return;
        };
        let id = self
            .resolvers
            .resolve_id_from_address(&subject.line1, &subject.line2)
            .await;
        self.insert_resolved(descriptor, params, descriptor.id_param, id);
    }

    fn insert_resolved(
        &self,
        descriptor: &EndpointDescriptor,
        params: &mut ParamBag,
        name: &str,
        value: Option<String>,
    ) {
        match value {
            Some(value) => {
                params.insert(name.to_owned(), Value::String(value));
            }
            None => {
                tracing::warn!(
                    endpoint = %descriptor.id,
                    param = name,
                    "fallback could not resolve parameter; calling endpoint without it"
                );
            }
        }
    }

    /// Fetches the all-fields record once and returns it when its first
    /// property carries every field the endpoint would have returned.
    async fn try_bulk(&self, descriptor: &EndpointDescriptor, id: &str) -> Option<Value> {
        let bulk = self.registry.get(BULK_ENDPOINT).ok()?;
        let cache = self.resolvers.cache();
        let cache_key = format!("bulk:{}", id.trim());

        let payload = match cache.get(&cache_key).await {
            Some(payload) => payload,
            None => {
                let query = params::bag([(bulk.id_param, json!(id.trim()))]);
                let options = FetchOptions::default().with_max_retries(0);
                match self.resolvers.transport().fetch(bulk.path, &query, &options).await {
                    Ok(payload) => {
                        cache.set(cache_key, payload.clone(), None).await;
                        payload
                    }
                    Err(error) => {
                        tracing::debug!(
                            endpoint = %descriptor.id,
                            error = %error,
                            "all-fields record unavailable; calling endpoint directly"
                        );
                        return None;
                    }
                }
            }
        };

        let record = first_property(&payload)?;
        let complete = descriptor
            .bulk_fields
            .iter()
            .all(|field| record.get(*field).is_some_and(|value| !value.is_null()));
        if complete {
            tracing::debug!(endpoint = %descriptor.id, "served from all-fields record");
            Some(payload)
        } else {
            None
        }
    }
}
