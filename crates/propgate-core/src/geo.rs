//! Geographic identifier subtypes and multi-code disambiguation.
//!
//! Upstream geo-id fields may hold a single code or a comma-separated list of
//! codes of different subtypes (`"N2:111,SB:222"`). Each known subtype has a
//! prefix set; subtypes without one take the first listed code.

use std::collections::BTreeMap;

use serde_json::Value;

pub const SCHOOL_SUBTYPE: &str = "SB";
pub const SCHOOL_DISTRICT_SUBTYPE: &str = "DB";
pub const NEIGHBORHOOD_SUBTYPE: &str = "N2";
pub const ZIP_SUBTYPE: &str = "ZI";

const SUBTYPE_PREFIXES: &[(&str, &[&str])] = &[
    (SCHOOL_SUBTYPE, &["SB"]),
    (SCHOOL_DISTRICT_SUBTYPE, &["DB", "SD"]),
    ("N1", &["N1"]),
    (NEIGHBORHOOD_SUBTYPE, &["N2"]),
    ("N3", &["N3"]),
    ("N4", &["N4"]),
    (ZIP_SUBTYPE, &["ZI"]),
    ("CO", &["CO"]),
    ("CS", &["CS"]),
    ("PL", &["PL"]),
    ("ST", &["ST"]),
];

/// Prefixes that identify codes of `subtype`; empty when it has no pattern.
pub fn prefixes_for(subtype: &str) -> &'static [&'static str] {
    SUBTYPE_PREFIXES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(subtype))
        .map(|(_, prefixes)| *prefixes)
        .unwrap_or(&[])
}

/// True when `geo_id` starts with the two-letter `prefix`, ignoring case.
pub fn has_prefix(geo_id: &str, prefix: &str) -> bool {
    let geo_id = geo_id.trim();
    geo_id.len() >= prefix.len()
        && geo_id.is_char_boundary(prefix.len())
        && geo_id[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Selects the code for `subtype` from a raw, possibly multi-code value.
///
/// A value without a comma is used as-is. Otherwise the first entry matching
/// the subtype's prefix set wins, falling back to the first entry.
pub fn pick_for_subtype(raw: &str, subtype: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if !raw.contains(',') {
        return Some(raw.to_owned());
    }

    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();
    let prefixes = prefixes_for(subtype);

    entries
        .iter()
        .find(|entry| prefixes.iter().any(|prefix| has_prefix(entry, prefix)))
        .or_else(|| entries.first())
        .map(|entry| (*entry).to_owned())
}

/// The known subtype a standalone code belongs to, if any.
pub fn classify(code: &str) -> Option<&'static str> {
    SUBTYPE_PREFIXES
        .iter()
        .find(|(_, prefixes)| prefixes.iter().any(|prefix| has_prefix(code, prefix)))
        .map(|(subtype, _)| *subtype)
}

/// Every subtype → code pair found in a property record's `location` block.
///
/// Reads the keyed `geoIdV4` object first, then classifies codes in the legacy
/// comma-separated `geoid` string for subtypes not already found.
pub fn discover(location: &Value) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();

    if let Some(keyed) = location.get("geoIdV4").and_then(Value::as_object) {
        for (subtype, raw) in keyed {
            let picked = match raw {
                Value::String(text) => pick_for_subtype(text, subtype),
                Value::Array(items) => {
                    let joined = items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(",");
                    pick_for_subtype(&joined, subtype)
                }
                _ => None,
            };
            if let Some(code) = picked {
                found.insert(subtype.to_ascii_uppercase(), code);
            }
        }
    }

    if let Some(legacy) = location.get("geoid").and_then(Value::as_str) {
        for code in legacy.split(',').map(str::trim).filter(|code| !code.is_empty()) {
            if let Some(subtype) = classify(code) {
                found
                    .entry(subtype.to_owned())
                    .or_insert_with(|| code.to_owned());
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_code_is_used_as_is() {
        assert_eq!(
            pick_for_subtype(" 4bd6a3c5e9f0 ", SCHOOL_SUBTYPE),
            Some(String::from("4bd6a3c5e9f0"))
        );
        assert_eq!(pick_for_subtype("   ", SCHOOL_SUBTYPE), None);
    }

    #[test]
    fn matching_prefix_wins_over_position() {
        assert_eq!(
            pick_for_subtype("N2:111,SB:222", SCHOOL_SUBTYPE),
            Some(String::from("SB:222"))
        );
        assert_eq!(
            pick_for_subtype("SB:222, N2:111", NEIGHBORHOOD_SUBTYPE),
            Some(String::from("N2:111"))
        );
        assert_eq!(
            pick_for_subtype("ZI90210,SD0622710", SCHOOL_DISTRICT_SUBTYPE),
            Some(String::from("SD0622710"))
        );
    }

    #[test]
    fn unmatched_or_patternless_subtypes_take_first_entry() {
        assert_eq!(
            pick_for_subtype("N2:111,ZI:90210", SCHOOL_SUBTYPE),
            Some(String::from("N2:111"))
        );
        assert_eq!(
            pick_for_subtype("RS:1,RS:2", "RS"),
            Some(String::from("RS:1"))
        );
    }

    #[test]
    fn prefix_check_is_case_insensitive_and_utf8_safe() {
        assert!(has_prefix("sb0000076046", "SB"));
        assert!(!has_prefix("N2000000", "SB"));
        assert!(!has_prefix("S", "SB"));
        assert!(!has_prefix("é1", "SB"));
    }

    #[test]
    fn discover_merges_keyed_and_legacy_codes() {
        let location = json!({
            "geoid": "CO06037, CS0692998, DB0622710, N2000000, SB0000076046, ZI90210",
            "geoIdV4": {
                "SB": "N2:111,SB:222",
                "N2": "n2hash"
            }
        });

        let found = discover(&location);

        assert_eq!(found.get("SB").map(String::as_str), Some("SB:222"));
        assert_eq!(found.get("N2").map(String::as_str), Some("n2hash"));
        assert_eq!(found.get("DB").map(String::as_str), Some("DB0622710"));
        assert_eq!(found.get("ZI").map(String::as_str), Some("ZI90210"));
        assert_eq!(found.get("CO").map(String::as_str), Some("CO06037"));
    }

    #[test]
    fn discover_tolerates_missing_fields() {
        assert!(discover(&json!({})).is_empty());
        assert!(discover(&json!({"geoIdV4": null, "geoid": 12})).is_empty());
    }
}
