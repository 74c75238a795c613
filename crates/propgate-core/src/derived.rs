//! Parameters the dispatcher computes when callers leave them out.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::macros::format_description;
use time::{Date, Duration};

use crate::params::{is_present, ParamBag};
use crate::registry::DerivedParam;

/// Applies a date or year window rule.
///
/// Unless both bounds were supplied, both are recomputed from `today` so the
/// pair is always consistent; a single supplied bound is overwritten.
pub fn apply_window(params: &mut ParamBag, rule: &DerivedParam, today: Date) {
    match *rule {
        DerivedParam::LastDays { days, start, end } => {
            if is_present(params, start) && is_present(params, end) {
                return;
            }
            let from = today.checked_sub(Duration::days(days)).unwrap_or(Date::MIN);
            params.insert(start.to_owned(), json!(format_date(from)));
            params.insert(end.to_owned(), json!(format_date(today)));
        }
        DerivedParam::LastYears { years, start, end } => {
            if is_present(params, start) && is_present(params, end) {
                return;
            }
            let year = today.year();
            params.insert(start.to_owned(), json!(year - years));
            params.insert(end.to_owned(), json!(year));
        }
        DerivedParam::AddressComponents => {}
    }
}

/// `YYYY/MM/DD`, the upstream's date grammar.
pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]/[month]/[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Structured pieces of a postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressComponents {
    pub street: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl AddressComponents {
    /// Best-effort textual split of `"123 Main St"` / `"Anytown, CA 90210"`.
    pub fn split(address1: &str, address2: &str) -> Self {
        let street = non_empty(address1);
        let mut components = Self {
            street,
            ..Self::default()
        };

        let (city_part, rest) = match address2.split_once(',') {
            Some((city, rest)) => (Some(city), rest),
            None => (None, address2),
        };

        let mut tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.last().is_some_and(|token| looks_like_zip(token)) {
            components.zip = tokens.pop().map(str::to_owned);
        }
        if tokens.last().is_some_and(|token| looks_like_state(token)) {
            components.state = tokens.pop().map(str::to_ascii_uppercase);
        }

        components.city = match city_part {
            Some(city) => non_empty(city),
            None => non_empty(&tokens.join(" ")),
        };
        components
    }

    /// Writes components into `params` without overwriting supplied values.
    pub fn fill(&self, params: &mut ParamBag) {
        let pairs = [
            ("street", &self.street),
            ("city", &self.city),
            ("county", &self.county),
            ("state", &self.state),
            ("zip", &self.zip),
        ];
        for (name, value) in pairs {
            if is_present(params, name) {
                continue;
            }
            if let Some(value) = value {
                params.insert(name.to_owned(), Value::String(value.clone()));
            }
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn looks_like_zip(token: &str) -> bool {
    let (head, tail) = token.split_once('-').unwrap_or((token, ""));
    head.len() == 5
        && head.chars().all(|c| c.is_ascii_digit())
        && (tail.is_empty() || (tail.len() == 4 && tail.chars().all(|c| c.is_ascii_digit())))
}

fn looks_like_state(token: &str) -> bool {
    token.len() == 2 && token.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::bag;
    use time::macros::date;

    const LAST_YEAR: DerivedParam = DerivedParam::LastDays {
        days: 365,
        start: "startDate",
        end: "endDate",
    };
    const LAST_5_YEARS: DerivedParam = DerivedParam::LastYears {
        years: 5,
        start: "startYear",
        end: "endYear",
    };

    #[test]
    fn missing_date_bounds_become_last_365_days() {
        let mut params = ParamBag::new();
        apply_window(&mut params, &LAST_YEAR, date!(2026 - 10 - 18));

        assert_eq!(params.get("startDate"), Some(&json!("2025/10/18")));
        assert_eq!(params.get("endDate"), Some(&json!("2026/10/18")));
    }

    #[test]
    fn supplied_pair_is_respected() {
        let mut params = bag([("startDate", "2020/01/01"), ("endDate", "2020/06/30")]);
        apply_window(&mut params, &LAST_YEAR, date!(2026 - 10 - 18));

        assert_eq!(params.get("startDate"), Some(&json!("2020/01/01")));
        assert_eq!(params.get("endDate"), Some(&json!("2020/06/30")));
    }

    #[test]
    fn single_supplied_bound_is_recomputed_with_its_pair() {
        let mut params = bag([("startDate", "2020/01/01")]);
        apply_window(&mut params, &LAST_YEAR, date!(2026 - 10 - 18));

        assert_eq!(params.get("startDate"), Some(&json!("2025/10/18")));
        assert_eq!(params.get("endDate"), Some(&json!("2026/10/18")));
    }

    #[test]
    fn missing_year_bounds_become_last_five_years() {
        let mut params = bag([("endYear", Value::Null)]);
        apply_window(&mut params, &LAST_5_YEARS, date!(2026 - 01 - 02));

        assert_eq!(params.get("startYear"), Some(&json!(2021)));
        assert_eq!(params.get("endYear"), Some(&json!(2026)));
    }

    #[test]
    fn splits_city_state_zip_line() {
        let components = AddressComponents::split("123 Main St", "Anytown, CA 90210");

        assert_eq!(components.street.as_deref(), Some("123 Main St"));
        assert_eq!(components.city.as_deref(), Some("Anytown"));
        assert_eq!(components.state.as_deref(), Some("CA"));
        assert_eq!(components.zip.as_deref(), Some("90210"));
        assert_eq!(components.county, None);
    }

    #[test]
    fn splits_line_without_comma() {
        let components = AddressComponents::split("1 Elm Rd", "Santa Monica ca 90401-1234");

        assert_eq!(components.city.as_deref(), Some("Santa Monica"));
        assert_eq!(components.state.as_deref(), Some("CA"));
        assert_eq!(components.zip.as_deref(), Some("90401-1234"));
    }

    #[test]
    fn fill_keeps_caller_values() {
        let mut params = bag([("city", "Beverly Hills")]);
        AddressComponents::split("123 Main St", "Anytown, CA 90210").fill(&mut params);

        assert_eq!(params.get("city"), Some(&json!("Beverly Hills")));
        assert_eq!(params.get("street"), Some(&json!("123 Main St")));
        assert!(!params.contains_key("county"));
    }
}
