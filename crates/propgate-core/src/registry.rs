//! Static catalog of upstream query shapes.
//!
//! # Endpoints
//!
//! | Category | Identifiers | Fallback |
//! |----------|-------------|----------|
//! | property | `propertyDetail`, `propertyBasicProfile`, `propertyExpandedProfile`, `buildingPermits` | address → id |
//! | sale | `saleDetail` / `saleSnapshot` | bulk first / address → geo id |
//! | sales_history | `salesHistoryDetail`, `salesHistorySnapshot` | address → id |
//! | assessment | `assessmentDetail` / `assessmentHistoryDetail` | bulk first / address → id |
//! | valuation | `avmDetail` / `avmHistoryDetail` | bulk first / address → id |
//! | events | `allEventsDetail`, `allEventsSnapshot` | address → id |
//! | trend | `salesTrend` | address → geo id |
//! | school | `schoolProfile`, `schoolDistrict`, `schoolSearch` | address → geo id / id → geo id |
//! | community | `communityProfile`, `poiSearch` | address → geo id / id → geo id |
//! | comparables | `salesComparablesAddress`, `salesComparablesPropId` | address components / address → id |

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Serialize;

use crate::error::QueryError;
use crate::params::{is_present, ParamBag};

pub const ID_PARAM: &str = "attomid";
pub const GEO_ID_PARAM: &str = "geoIdV4";
pub const ADDRESS1_PARAM: &str = "address1";
pub const ADDRESS2_PARAM: &str = "address2";

/// Path parameters of address-addressed endpoints, filled from an address pair.
pub const ADDRESS_COMPONENT_PARAMS: [&str; 5] = ["street", "city", "county", "state", "zip"];

/// How a missing required identifier is derived from other parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    None,
    /// Property identifier resolved from `address1`/`address2`.
    AddressToId,
    /// Geographic identifier of the preferred subtype resolved from an address.
    AddressToGeoId,
    /// Geographic identifier resolved from an already-known property identifier.
    IdToId,
    /// Try the all-fields record first; fall back to address → id.
    TryBulkFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointCategory {
    Property,
    Sale,
    SalesHistory,
    Assessment,
    Valuation,
    Events,
    Trend,
    School,
    Community,
    Comparables,
}

impl EndpointCategory {
    pub const ALL: [Self; 10] = [
        Self::Property,
        Self::Sale,
        Self::SalesHistory,
        Self::Assessment,
        Self::Valuation,
        Self::Events,
        Self::Trend,
        Self::School,
        Self::Community,
        Self::Comparables,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Sale => "sale",
            Self::SalesHistory => "sales_history",
            Self::Assessment => "assessment",
            Self::Valuation => "valuation",
            Self::Events => "events",
            Self::Trend => "trend",
            Self::School => "school",
            Self::Community => "community",
            Self::Comparables => "comparables",
        }
    }
}

impl Display for EndpointCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == needle)
            .ok_or_else(|| format!("unknown endpoint category '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachePolicy {
    pub ttl_seconds: u64,
    pub use_memory: bool,
}

impl CachePolicy {
    pub const fn memory(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            use_memory: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            ttl_seconds: 0,
            use_memory: false,
        }
    }
}

/// Parameters computed by the dispatcher when the caller leaves them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedParam {
    /// `[today - days, today]` as `YYYY/MM/DD` dates.
    LastDays {
        days: i64,
        start: &'static str,
        end: &'static str,
    },
    /// `[this year - years, this year]`.
    LastYears {
        years: i32,
        start: &'static str,
        end: &'static str,
    },
    /// `street`/`city`/`county`/`state`/`zip` from an address pair.
    AddressComponents,
}

/// One upstream query shape. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointDescriptor {
    pub id: &'static str,
    pub category: EndpointCategory,
    pub path: &'static str,
    pub required_params: &'static [&'static str],
    pub optional_params: &'static [&'static str],
    pub fallback: FallbackStrategy,
    pub preferred_geo_subtype: Option<&'static str>,
    pub cache_policy: CachePolicy,
    /// Parameter that carries the property identifier for this endpoint.
    pub id_param: &'static str,
    /// Fields the all-fields record must carry to stand in for this endpoint.
    pub bulk_fields: &'static [&'static str],
    pub derived: &'static [DerivedParam],
}

impl EndpointDescriptor {
    pub const fn new(id: &'static str, category: EndpointCategory, path: &'static str) -> Self {
        Self {
            id,
            category,
            path,
            required_params: &[],
            optional_params: &[],
            fallback: FallbackStrategy::None,
            preferred_geo_subtype: None,
            cache_policy: CachePolicy::memory(3_600),
            id_param: ID_PARAM,
            bulk_fields: &[],
            derived: &[],
        }
    }

    pub const fn required(self, required_params: &'static [&'static str]) -> Self {
        Self {
            required_params,
            ..self
        }
    }

    pub const fn optional(self, optional_params: &'static [&'static str]) -> Self {
        Self {
            optional_params,
            ..self
        }
    }

    pub const fn fallback(self, fallback: FallbackStrategy) -> Self {
        Self { fallback, ..self }
    }

    pub const fn geo_subtype(self, subtype: &'static str) -> Self {
        Self {
            preferred_geo_subtype: Some(subtype),
            ..self
        }
    }

    pub const fn cache(self, cache_policy: CachePolicy) -> Self {
        Self {
            cache_policy,
            ..self
        }
    }

    pub const fn id_param(self, id_param: &'static str) -> Self {
        Self { id_param, ..self }
    }

    pub const fn bulk(self, bulk_fields: &'static [&'static str]) -> Self {
        Self {
            bulk_fields,
            fallback: FallbackStrategy::TryBulkFirst,
            ..self
        }
    }

    pub const fn derive(self, derived: &'static [DerivedParam]) -> Self {
        Self { derived, ..self }
    }

    /// True iff every required name is present; fallback strategy is ignored.
    pub fn has_required_params(&self, params: &ParamBag) -> bool {
        self.missing_params(params).is_empty()
    }

    pub fn missing_params(&self, params: &ParamBag) -> Vec<&'static str> {
        self.required_params
            .iter()
            .copied()
            .filter(|name| !is_present(params, name))
            .collect()
    }

    /// Whether `name` belongs to this endpoint's parameter contract.
    pub fn accepts(&self, name: &str) -> bool {
        self.required_params
            .iter()
            .chain(self.optional_params)
            .any(|declared| declared.eq_ignore_ascii_case(name))
    }

    /// Required parameters the fallback chain could fill from what was supplied.
    pub fn fillable_params(&self, params: &ParamBag) -> Vec<&'static str> {
        let has_address = has_address_pair(params);
        let mut fillable = Vec::new();

        match self.fallback {
            FallbackStrategy::None => {}
            FallbackStrategy::AddressToId | FallbackStrategy::TryBulkFirst => {
                if has_address {
                    fillable.push(self.id_param);
                }
            }
            FallbackStrategy::AddressToGeoId => {
                if has_address {
                    fillable.push(GEO_ID_PARAM);
                }
            }
            FallbackStrategy::IdToId => {
                if is_present(params, ID_PARAM) {
                    fillable.push(GEO_ID_PARAM);
                }
            }
        }

        for derived in self.derived {
            match derived {
                DerivedParam::LastDays { start, end, .. }
                | DerivedParam::LastYears { start, end, .. } => fillable.extend([*start, *end]),
                DerivedParam::AddressComponents => {
                    if has_address {
                        fillable.extend(ADDRESS_COMPONENT_PARAMS);
                    }
                }
            }
        }

        fillable
    }

    /// Required parameters that are neither supplied nor fillable.
    pub fn unsatisfied_params(&self, params: &ParamBag) -> Vec<&'static str> {
        let missing = self.missing_params(params);
        if missing.is_empty() {
            return missing;
        }
        let fillable = self.fillable_params(params);
        missing
            .into_iter()
            .filter(|name| !fillable.contains(name))
            .collect()
    }
}

pub fn has_address_pair(params: &ParamBag) -> bool {
    is_present(params, ADDRESS1_PARAM) && is_present(params, ADDRESS2_PARAM)
}

const PROPERTY_ID: &[&str] = &[ID_PARAM];
const GEO_ID: &[&str] = &[GEO_ID_PARAM];
const DATE_WINDOW: &[&str] = &["startDate", "endDate", "page", "pagesize"];
const LAST_365_DAYS: &[DerivedParam] = &[DerivedParam::LastDays {
    days: 365,
    start: "startDate",
    end: "endDate",
}];
const LAST_5_YEARS: &[DerivedParam] = &[DerivedParam::LastYears {
    years: 5,
    start: "startYear",
    end: "endYear",
}];
const COMPARABLE_FILTERS: &[&str] = &[
    "searchType",
    "minComparables",
    "maxComparables",
    "miles",
    "sqFeetRange",
    "yearBuiltRange",
    "bedroomsRange",
    "bathroomRange",
    "lotSizeRange",
    "saleDateRange",
    "ownerOccupied",
    "distressed",
    "sameCity",
    "useSameTargetCode",
    "include0SalesAmounts",
    "includeFullSalesOnly",
];
const COMPARABLE_ADDRESS_FILTERS: &[&str] = &[
    "county",
    "searchType",
    "minComparables",
    "maxComparables",
    "miles",
    "sqFeetRange",
    "yearBuiltRange",
    "bedroomsRange",
    "bathroomRange",
    "lotSizeRange",
    "saleDateRange",
    "ownerOccupied",
    "distressed",
    "sameCity",
    "useSameTargetCode",
    "include0SalesAmounts",
    "includeFullSalesOnly",
];

pub const PROPERTY_DETAIL_PATH: &str = "/propertyapi/v1.0.0/property/detail";
pub const ALL_EVENTS_DETAIL_PATH: &str = "/propertyapi/v1.0.0/allevents/detail";
pub const SCHOOL_PROFILE_PATH: &str = "/v4/school/profile";
pub const COMMUNITY_PROFILE_PATH: &str = "/v4/neighborhood/community";

/// All-fields record used by [`FallbackStrategy::TryBulkFirst`].
pub const BULK_ENDPOINT: &str = "allEventsDetail";
/// Property-detail record used by resolvers and building-size lookups.
pub const PROPERTY_DETAIL_ENDPOINT: &str = "propertyDetail";

static BUILTIN_ENDPOINTS: &[EndpointDescriptor] = &[
    EndpointDescriptor::new(
        "propertyDetail",
        EndpointCategory::Property,
        PROPERTY_DETAIL_PATH,
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId)
    .cache(CachePolicy::memory(86_400)),
    EndpointDescriptor::new(
        "propertyBasicProfile",
        EndpointCategory::Property,
        "/propertyapi/v1.0.0/property/basicprofile",
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId)
    .cache(CachePolicy::memory(86_400)),
    EndpointDescriptor::new(
        "propertyExpandedProfile",
        EndpointCategory::Property,
        "/propertyapi/v1.0.0/property/expandedprofile",
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId)
    .cache(CachePolicy::memory(86_400)),
    EndpointDescriptor::new(
        "buildingPermits",
        EndpointCategory::Property,
        "/propertyapi/v1.0.0/property/buildingpermits",
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId),
    EndpointDescriptor::new(
        "saleDetail",
        EndpointCategory::Sale,
        "/propertyapi/v1.0.0/sale/detail",
    )
    .required(PROPERTY_ID)
    .bulk(&["sale"]),
    EndpointDescriptor::new(
        "saleSnapshot",
        EndpointCategory::Sale,
        "/propertyapi/v1.0.0/sale/snapshot",
    )
    .required(GEO_ID)
    .optional(DATE_WINDOW)
    .fallback(FallbackStrategy::AddressToGeoId)
    .geo_subtype("ZI")
    .derive(LAST_365_DAYS)
    .cache(CachePolicy::none()),
    EndpointDescriptor::new(
        "salesHistoryDetail",
        EndpointCategory::SalesHistory,
        "/propertyapi/v1.0.0/saleshistory/detail",
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId),
    EndpointDescriptor::new(
        "salesHistorySnapshot",
        EndpointCategory::SalesHistory,
        "/propertyapi/v1.0.0/saleshistory/snapshot",
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId),
    EndpointDescriptor::new(
        "assessmentDetail",
        EndpointCategory::Assessment,
        "/propertyapi/v1.0.0/assessment/detail",
    )
    .required(PROPERTY_ID)
    .bulk(&["assessment"])
    .cache(CachePolicy::memory(86_400)),
    EndpointDescriptor::new(
        "assessmentHistoryDetail",
        EndpointCategory::Assessment,
        "/propertyapi/v1.0.0/assessmenthistory/detail",
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId)
    .cache(CachePolicy::memory(86_400)),
    EndpointDescriptor::new(
        "avmDetail",
        EndpointCategory::Valuation,
        "/propertyapi/v1.0.0/attomavm/detail",
    )
    .required(PROPERTY_ID)
    .bulk(&["avm"]),
    EndpointDescriptor::new(
        "avmHistoryDetail",
        EndpointCategory::Valuation,
        "/propertyapi/v1.0.0/avmhistory/detail",
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId),
    EndpointDescriptor::new(
        "allEventsDetail",
        EndpointCategory::Events,
        ALL_EVENTS_DETAIL_PATH,
    )
    .required(PROPERTY_ID)
    .fallback(FallbackStrategy::AddressToId),
    EndpointDescriptor::new(
        "allEventsSnapshot",
        EndpointCategory::Events,
        "/propertyapi/v1.0.0/allevents/snapshot",
    )
    .required(PROPERTY_ID)
    .optional(DATE_WINDOW)
    .fallback(FallbackStrategy::AddressToId)
    .derive(LAST_365_DAYS)
    .cache(CachePolicy::none()),
    EndpointDescriptor::new(
        "salesTrend",
        EndpointCategory::Trend,
        "/v4/transaction/salestrend",
    )
    .required(GEO_ID)
    .optional(&["interval", "startYear", "endYear"])
    .fallback(FallbackStrategy::AddressToGeoId)
    .geo_subtype("ZI")
    .derive(LAST_5_YEARS)
    .cache(CachePolicy::memory(86_400)),
    EndpointDescriptor::new("schoolProfile", EndpointCategory::School, SCHOOL_PROFILE_PATH)
        .required(GEO_ID)
        .fallback(FallbackStrategy::AddressToGeoId)
        .geo_subtype("SB")
        .cache(CachePolicy::memory(604_800)),
    EndpointDescriptor::new("schoolDistrict", EndpointCategory::School, "/v4/school/district")
        .required(GEO_ID)
        .fallback(FallbackStrategy::AddressToGeoId)
        .geo_subtype("DB")
        .cache(CachePolicy::memory(604_800)),
    EndpointDescriptor::new("schoolSearch", EndpointCategory::School, "/v4/school/search")
        .required(GEO_ID)
        .optional(&["radius", "page", "pageSize"])
        .fallback(FallbackStrategy::IdToId)
        .geo_subtype("SB"),
    EndpointDescriptor::new(
        "communityProfile",
        EndpointCategory::Community,
        COMMUNITY_PROFILE_PATH,
    )
    .required(GEO_ID)
    .fallback(FallbackStrategy::AddressToGeoId)
    .geo_subtype("N2")
    .cache(CachePolicy::memory(604_800)),
    EndpointDescriptor::new("poiSearch", EndpointCategory::Community, "/v4/neighborhood/poi")
        .required(GEO_ID)
        .optional(&["categoryName", "radius"])
        .fallback(FallbackStrategy::IdToId)
        .geo_subtype("ZI"),
    EndpointDescriptor::new(
        "salesComparablesAddress",
        EndpointCategory::Comparables,
        "/property/v2/salescomparables/address/{street}/{city}/{county}/{state}/{zip}",
    )
    .required(&["street", "city", "state", "zip"])
    .optional(COMPARABLE_ADDRESS_FILTERS)
    .derive(&[DerivedParam::AddressComponents])
    .cache(CachePolicy::memory(900)),
    EndpointDescriptor::new(
        "salesComparablesPropId",
        EndpointCategory::Comparables,
        "/property/v2/salescomparables/propid/{propId}",
    )
    .required(&["propId"])
    .optional(COMPARABLE_FILTERS)
    .fallback(FallbackStrategy::AddressToId)
    .id_param("propId")
    .cache(CachePolicy::memory(900)),
];

/// Lookup table from endpoint identifier to descriptor.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    ordered: Vec<EndpointDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EndpointRegistry {
    pub fn builtin() -> Self {
        Self::new(BUILTIN_ENDPOINTS.to_vec())
    }

    /// Later descriptors replace earlier ones with the same identifier.
    pub fn new(descriptors: Vec<EndpointDescriptor>) -> Self {
        let mut ordered: Vec<EndpointDescriptor> = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match index.get(descriptor.id) {
                Some(&position) => ordered[position] = descriptor,
                None => {
                    index.insert(descriptor.id, ordered.len());
                    ordered.push(descriptor);
                }
            }
        }
        Self { ordered, index }
    }

    pub fn get(&self, id: &str) -> Result<&EndpointDescriptor, QueryError> {
        self.index
            .get(id)
            .map(|&position| &self.ordered[position])
            .ok_or_else(|| QueryError::UnknownEndpoint { id: id.to_owned() })
    }

    /// False for unknown identifiers.
    pub fn has_required_params(&self, id: &str, params: &ParamBag) -> bool {
        self.get(id)
            .map(|descriptor| descriptor.has_required_params(params))
            .unwrap_or(false)
    }

    pub fn by_category(&self, category: EndpointCategory) -> Vec<&EndpointDescriptor> {
        self.ordered
            .iter()
            .filter(|descriptor| descriptor.category == category)
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ordered.iter().map(|descriptor| descriptor.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::bag;
    use serde_json::{json, Value};

    #[test]
    fn unknown_endpoint_is_an_error() {
        let registry = EndpointRegistry::builtin();
        assert_eq!(
            registry.get("noSuchThing"),
            Err(QueryError::UnknownEndpoint {
                id: String::from("noSuchThing")
            })
        );
        assert!(!registry.has_required_params("noSuchThing", &ParamBag::new()));
    }

    #[test]
    fn required_params_ignore_fallback_strategy() {
        let registry = EndpointRegistry::builtin();
        let address_only = bag([
            (ADDRESS1_PARAM, json!("123 Main St")),
            (ADDRESS2_PARAM, json!("Anytown, CA 90210")),
        ]);

        for descriptor in registry.iter() {
            let all_required: ParamBag = descriptor
                .required_params
                .iter()
                .map(|name| ((*name).to_owned(), json!("x")))
                .collect();
            assert!(registry.has_required_params(descriptor.id, &all_required), "{}", descriptor.id);

            if !descriptor.required_params.is_empty() {
                assert!(
                    !registry.has_required_params(descriptor.id, &address_only),
                    "{} should not count fallback-fillable params",
                    descriptor.id
                );
            }
        }
    }

    #[test]
    fn null_required_param_counts_as_missing() {
        let registry = EndpointRegistry::builtin();
        let params = bag([(ID_PARAM, Value::Null)]);
        assert!(!registry.has_required_params("salesHistorySnapshot", &params));
    }

    #[test]
    fn address_pair_satisfies_address_strategies() {
        let registry = EndpointRegistry::builtin();
        let params = bag([
            (ADDRESS1_PARAM, json!("123 Main St")),
            (ADDRESS2_PARAM, json!("Anytown, CA 90210")),
        ]);

        for id in ["salesHistorySnapshot", "schoolProfile", "saleDetail", "salesComparablesAddress"] {
            let descriptor = registry.get(id).expect("builtin");
            assert!(descriptor.unsatisfied_params(&params).is_empty(), "{id}");
        }

        let descriptor = registry.get("schoolSearch").expect("builtin");
        assert_eq!(descriptor.unsatisfied_params(&params), vec![GEO_ID_PARAM]);
    }

    #[test]
    fn property_id_satisfies_id_to_id_strategy() {
        let registry = EndpointRegistry::builtin();
        let descriptor = registry.get("poiSearch").expect("builtin");
        let params = bag([(ID_PARAM, json!("1001"))]);
        assert!(descriptor.unsatisfied_params(&params).is_empty());
    }

    #[test]
    fn by_category_filters_descriptors() {
        let registry = EndpointRegistry::builtin();
        let schools: Vec<_> = registry
            .by_category(EndpointCategory::School)
            .into_iter()
            .map(|descriptor| descriptor.id)
            .collect();
        assert_eq!(schools, vec!["schoolProfile", "schoolDistrict", "schoolSearch"]);
    }

    #[test]
    fn bulk_and_detail_endpoints_are_registered() {
        let registry = EndpointRegistry::builtin();
        assert!(registry.get(BULK_ENDPOINT).is_ok());
        assert!(registry.get(PROPERTY_DETAIL_ENDPOINT).is_ok());
        assert_eq!(
            registry.get("saleDetail").expect("builtin").fallback,
            FallbackStrategy::TryBulkFirst
        );
    }

    #[test]
    fn categories_parse_from_cli_spelling() {
        assert_eq!(
            "sales-history".parse::<EndpointCategory>(),
            Ok(EndpointCategory::SalesHistory)
        );
        assert_eq!(" School ".parse::<EndpointCategory>(), Ok(EndpointCategory::School));
        assert!("weather".parse::<EndpointCategory>().is_err());
    }

    #[test]
    fn later_descriptors_replace_earlier_ones() {
        let registry = EndpointRegistry::new(vec![
            EndpointDescriptor::new("a", EndpointCategory::Property, "/one"),
            EndpointDescriptor::new("a", EndpointCategory::Property, "/two"),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").expect("registered").path, "/two");
    }
}
