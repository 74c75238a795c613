//! Per-subject resolution memory shared by the fallback resolvers.
//!
//! Contexts are keyed by a normalized address (or a property identifier) and
//! live for the lifetime of the store. Updates only merge: a subtype resolved
//! once is never removed, only overwritten by a later successful lookup.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// What has been resolved so far for one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub resolved_id: Option<String>,
    pub geo_ids_by_subtype: BTreeMap<String, String>,
}

impl RequestContext {
    /// Adds or overwrites entries from a successful lookup. Never removes.
    pub fn merge(&mut self, resolved_id: Option<&str>, geo_ids: &BTreeMap<String, String>) {
        if let Some(id) = resolved_id.filter(|id| !id.is_empty()) {
            self.resolved_id = Some(id.to_owned());
        }
        for (subtype, code) in geo_ids {
            self.geo_ids_by_subtype
                .insert(subtype.to_ascii_uppercase(), code.clone());
        }
    }

    pub fn geo_id(&self, subtype: &str) -> Option<&str> {
        self.geo_ids_by_subtype
            .get(&subtype.to_ascii_uppercase())
            .map(String::as_str)
    }
}

/// Stable key for an address pair: lowercase, trimmed, whitespace collapsed.
pub fn address_key(address1: &str, address2: &str) -> String {
    format!("{}|{}", normalize_line(address1), normalize_line(address2))
}

/// Key for contexts addressed by a known property identifier.
pub fn id_key(id: &str) -> String {
    format!("#{}", id.trim())
}

fn normalize_line(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Process-wide map of [`RequestContext`]s. Locks are never held across awaits.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    inner: Arc<Mutex<HashMap<String, RequestContext>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, key: &str) -> Option<RequestContext> {
        self.lock().get(key).cloned()
    }

    pub fn resolved_id(&self, key: &str) -> Option<String> {
        self.lock()
            .get(key)
            .and_then(|context| context.resolved_id.clone())
    }

    pub fn geo_id(&self, key: &str, subtype: &str) -> Option<String> {
        self.lock()
            .get(key)
            .and_then(|context| context.geo_id(subtype).map(str::to_owned))
    }

    /// Merges into the context for `key`, creating it on first use.
    pub fn merge(&self, key: &str, resolved_id: Option<&str>, geo_ids: &BTreeMap<String, String>) {
        self.lock()
            .entry(key.to_owned())
            .or_default()
            .merge(resolved_id, geo_ids);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RequestContext>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn address_key_ignores_case_and_spacing() {
        assert_eq!(
            address_key("123  Main St ", "Anytown, CA 90210"),
            address_key("123 main st", " anytown,  ca 90210")
        );
    }

    #[test]
    fn merge_keeps_previously_resolved_subtypes() {
        let store = ContextStore::new();
        let key = address_key("123 Main St", "Anytown, CA 90210");

        store.merge(&key, None, &geo(&[("SB", "SB:222"), ("N2", "N2:111")]));
        store.merge(&key, Some("1001"), &geo(&[("ZI", "ZI90210")]));

        let context = store.snapshot(&key).expect("context created on merge");
        assert_eq!(context.resolved_id.as_deref(), Some("1001"));
        assert_eq!(context.geo_id("sb"), Some("SB:222"));
        assert_eq!(context.geo_id("N2"), Some("N2:111"));
        assert_eq!(context.geo_id("ZI"), Some("ZI90210"));
    }

    #[test]
    fn later_lookup_overwrites_but_empty_id_does_not_clear() {
        let store = ContextStore::new();
        store.merge("k", Some("1001"), &geo(&[("SB", "old")]));
        store.merge("k", Some(""), &geo(&[("SB", "new")]));

        assert_eq!(store.resolved_id("k").as_deref(), Some("1001"));
        assert_eq!(store.geo_id("k", "SB").as_deref(), Some("new"));
    }

    #[test]
    fn unknown_keys_have_no_context() {
        let store = ContextStore::new();
        assert!(store.snapshot("missing").is_none());
        assert!(store.resolved_id("missing").is_none());
        assert!(store.is_empty());
    }
}
