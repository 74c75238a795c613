//! Best-effort address normalization through a geocoding collaborator.
//!
//! The gateway never fails a query because normalization failed: callers use
//! [`normalize_best_effort`], which logs the failure and yields `None` so the
//! caller's address is used verbatim.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::derived::AddressComponents;
use crate::error::NormalizeError;
use crate::http_client::{HttpClient, HttpRequest};

pub const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

/// One free-text match offered by the geocoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCandidate {
    /// Opaque identifier used to fetch the candidate's components.
    pub id: String,
    pub description: String,
}

/// Structured form of an address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedAddress {
    pub components: AddressComponents,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl NormalizedAddress {
    /// `("123 Main St", "Anytown, CA 90210")`, or `None` when too sparse.
    pub fn address_lines(&self) -> Option<(String, String)> {
        let components = &self.components;
        let street = components.street.clone()?;
        let city = components.city.as_deref()?;

        let mut second = city.to_owned();
        if let Some(state) = &components.state {
            second.push_str(", ");
            second.push_str(state);
            if let Some(zip) = &components.zip {
                second.push(' ');
                second.push_str(zip);
            }
        }
        Some((street, second))
    }
}

pub type NormalizeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NormalizeError>> + Send + 'a>>;

pub trait AddressNormalizer: Send + Sync {
    /// Zero or more candidates for a free-text address.
    fn candidates<'a>(&'a self, text: &'a str) -> NormalizeFuture<'a, Vec<AddressCandidate>>;

    /// Structured components of one candidate.
    fn details<'a>(&'a self, candidate_id: &'a str) -> NormalizeFuture<'a, NormalizedAddress>;
}

/// Normalizes `address1, address2` through the first candidate, if any.
/// Failures are logged and reported as `None`.
pub async fn normalize_best_effort(
    normalizer: &dyn AddressNormalizer,
    address1: &str,
    address2: &str,
) -> Option<NormalizedAddress> {
    let text = format!("{}, {}", address1.trim(), address2.trim());

    let candidates = match normalizer.candidates(&text).await {
        Ok(candidates) => candidates,
        Err(error) => {
            tracing::warn!(error = %error, "address normalization failed; using address verbatim");
            return None;
        }
    };
    let Some(first) = candidates.first() else {
        tracing::debug!("geocoder offered no candidates; using address verbatim");
        return None;
    };

    match normalizer.details(&first.id).await {
        Ok(normalized) => Some(normalized),
        Err(error) => {
            tracing::warn!(error = %error, candidate = %first.id, "candidate details failed; using address verbatim");
            None
        }
    }
}

/// Places-style autocomplete + details geocoder.
pub struct PlacesNormalizer {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl std::fmt::Debug for PlacesNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacesNormalizer")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PlacesNormalizer {
    pub fn new(http: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_PLACES_BASE_URL.to_owned(),
            api_key: api_key.into(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    async fn get_json<T>(&self, url: String) -> Result<T, NormalizeError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = HttpRequest::get(url).with_timeout_ms(self.timeout_ms);
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|error| NormalizeError::Transport(error.message().to_owned()))?;

        if !response.is_success() {
            return Err(NormalizeError::Status {
                status: response.status.to_string(),
            });
        }
        serde_json::from_str(&response.body).map_err(|error| NormalizeError::Parse(error.to_string()))
    }
}

impl AddressNormalizer for PlacesNormalizer {
    fn candidates<'a>(&'a self, text: &'a str) -> NormalizeFuture<'a, Vec<AddressCandidate>> {
        Box::pin(async move {
            let url = format!(
                "{}/autocomplete/json?input={}&types=address&key={}",
                self.base_url,
                urlencoding::encode(text),
                urlencoding::encode(&self.api_key)
            );
            let payload: AutocompleteResponse = self.get_json(url).await?;
            check_status(&payload.status)?;

            Ok(payload
                .predictions
                .into_iter()
                .map(|prediction| AddressCandidate {
                    id: prediction.place_id,
                    description: prediction.description,
                })
                .collect())
        })
    }

    fn details<'a>(&'a self, candidate_id: &'a str) -> NormalizeFuture<'a, NormalizedAddress> {
        Box::pin(async move {
            let url = format!(
                "{}/details/json?place_id={}&fields=address_component,geometry&key={}",
                self.base_url,
                urlencoding::encode(candidate_id),
                urlencoding::encode(&self.api_key)
            );
            let payload: DetailsResponse = self.get_json(url).await?;
            check_status(&payload.status)?;

            let result = payload
                .result
                .ok_or_else(|| NormalizeError::Parse(String::from("details response has no result")))?;
            Ok(normalized_from_details(&result))
        })
    }
}

fn check_status(status: &str) -> Result<(), NormalizeError> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        other => Err(NormalizeError::Status {
            status: other.to_owned(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct AutocompleteResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    place_id: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    result: Option<PlaceDetails>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PlaceDetails {
    #[serde(default)]
    address_components: Vec<PlaceComponent>,
    geometry: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PlaceComponent {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

impl PlaceComponent {
    fn is(&self, kind: &str) -> bool {
        self.types.iter().any(|candidate| candidate == kind)
    }
}

fn normalized_from_details(details: &PlaceDetails) -> NormalizedAddress {
    let find = |kind: &str| details.address_components.iter().find(|c| c.is(kind));

    let street = match (find("street_number"), find("route")) {
        (Some(number), Some(route)) => Some(format!("{} {}", number.long_name, route.short_name)),
        (None, Some(route)) => Some(route.short_name.clone()),
        _ => None,
    };
    let city = find("locality")
        .or_else(|| find("postal_town"))
        .or_else(|| find("sublocality"))
        .map(|c| c.long_name.clone());

    let location = details
        .geometry
        .as_ref()
        .and_then(|geometry| geometry.get("location"));

    NormalizedAddress {
        components: AddressComponents {
            street,
            city,
            county: find("administrative_area_level_2").map(|c| c.long_name.clone()),
            state: find("administrative_area_level_1").map(|c| c.short_name.clone()),
            zip: find("postal_code").map(|c| c.long_name.clone()),
        },
        latitude: location.and_then(|l| l.get("lat")).and_then(Value::as_f64),
        longitude: location.and_then(|l| l.get("lng")).and_then(Value::as_f64),
    }
}
