//! Comparable-sales lookups with a single widened retry.
//!
//! When the upstream reports that it could not locate the subject property,
//! the search is widened around the subject's building size and reissued
//! exactly once. A failure of the widened call propagates unchanged.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::dispatcher::QueryDispatcher;
use crate::error::{QueryError, UpstreamSignal};
use crate::params::{get_str, is_present, ParamBag};
use crate::registry::{ADDRESS1_PARAM, ADDRESS2_PARAM, ID_PARAM, PROPERTY_DETAIL_ENDPOINT};
use crate::resolvers::first_property;

pub const ADDRESS_ENDPOINT: &str = "salesComparablesAddress";
pub const PROP_ID_ENDPOINT: &str = "salesComparablesPropId";

/// Building size assumed when the subject's size cannot be looked up.
pub const DEFAULT_BUILDING_SIZE: f64 = 2_000.0;
/// Share of the building size used as the widened square-footage range.
pub const SIZE_RANGE_RATIO: f64 = 0.3;
pub const WIDENED_YEAR_BUILT_RANGE: u32 = 20;

const SIZE_FIELDS: [&str; 3] = ["universalsize", "livingsize", "bldgsize"];

#[derive(Debug, Clone)]
pub struct ComparablesPolicy {
    dispatcher: Arc<QueryDispatcher>,
    default_size: f64,
}

impl ComparablesPolicy {
    pub fn new(dispatcher: Arc<QueryDispatcher>) -> Self {
        Self {
            dispatcher,
            default_size: DEFAULT_BUILDING_SIZE,
        }
    }

    pub fn with_default_size(mut self, default_size: f64) -> Self {
        self.default_size = default_size;
        self
    }

    /// Comparables for an address (`address1`/`address2` or explicit
    /// `street`/`city`/`state`/`zip` components).
    pub async fn by_address(&self, params: ParamBag) -> Result<Value, QueryError> {
        self.execute(ADDRESS_ENDPOINT, params).await
    }

    /// Comparables for a known property identifier (`propId`), or an address
    /// pair resolved to one.
    pub async fn by_prop_id(&self, params: ParamBag) -> Result<Value, QueryError> {
        self.execute(PROP_ID_ENDPOINT, params).await
    }

    pub async fn execute(&self, endpoint_id: &str, params: ParamBag) -> Result<Value, QueryError> {
        let error = match self.dispatcher.execute(endpoint_id, params.clone()).await {
            Ok(payload) => return Ok(payload),
            Err(error) => error,
        };
        if error.signal() != Some(UpstreamSignal::NoRecordFound) {
            return Err(error);
        }

        let size = self.building_size(&params).await;
        let widened = widen(params, size);
        tracing::info!(
            endpoint = %endpoint_id,
            building_size = size,
            "subject not located; retrying once with widened search"
        );
        self.dispatcher.execute(endpoint_id, widened).await
    }

    /// Subject building size from a property-detail lookup, or the default.
    async fn building_size(&self, params: &ParamBag) -> f64 {
        let Some(subject) = subject_query(params) else {
            return self.default_size;
        };
        match self.dispatcher.execute(PROPERTY_DETAIL_ENDPOINT, subject).await {
            Ok(payload) => building_size_of(&payload).unwrap_or(self.default_size),
            Err(error) => {
                tracing::debug!(error = %error, "building size lookup failed; using default");
                self.default_size
            }
        }
    }
}

/// Widened copy of `params`: square-footage range from `size`, fixed year
/// tolerance. Caller-supplied values for both are replaced.
pub fn widen(mut params: ParamBag, size: f64) -> ParamBag {
    let range = (SIZE_RANGE_RATIO * size).round() as i64;
    params.insert(String::from("sqFeetRange"), json!(range));
    params.insert(
        String::from("yearBuiltRange"),
        json!(WIDENED_YEAR_BUILT_RANGE),
    );
    params
}

/// First positive size under `property[0].building.size`.
pub fn building_size_of(payload: &Value) -> Option<f64> {
    let size = first_property(payload)?.get("building")?.get("size")?;
    SIZE_FIELDS
        .iter()
        .filter_map(|field| size.get(*field))
        .filter_map(|value| match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
        .find(|size| *size > 0.0)
}

/// Property-detail parameters identifying the same subject.
fn subject_query(params: &ParamBag) -> Option<ParamBag> {
    let mut subject = ParamBag::new();
    if let Some(id) = get_str(params, "propId").or_else(|| get_str(params, ID_PARAM)) {
        subject.insert(ID_PARAM.to_owned(), json!(id));
        return Some(subject);
    }
    if is_present(params, ADDRESS1_PARAM) && is_present(params, ADDRESS2_PARAM) {
        for name in [ADDRESS1_PARAM, ADDRESS2_PARAM] {
            subject.insert(name.to_owned(), params[name].clone());
        }
        return Some(subject);
    }

    let street = get_str(params, "street")?;
    let city = get_str(params, "city")?;
    let mut line2 = city;
    if let Some(state) = get_str(params, "state") {
        line2.push_str(", ");
        line2.push_str(&state);
    }
    if let Some(zip) = get_str(params, "zip") {
        line2.push(' ');
        line2.push_str(&zip);
    }
    subject.insert(ADDRESS1_PARAM.to_owned(), json!(street));
    subject.insert(ADDRESS2_PARAM.to_owned(), json!(line2));
    Some(subject)
}
