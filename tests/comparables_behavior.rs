//! Behaviour tests for comparable-sales lookups and their widened retry.

mod support;

use std::sync::Arc;

use propgate_core::params::bag;
use propgate_core::{HttpResponse, UpstreamSignal};
use serde_json::json;

use support::{empty_result, gateway, no_record_response, ScriptedHttpClient};

const COMPARABLES: &str = "/salescomparables/";

fn comparables_found() -> serde_json::Value {
    json!({"status": {"code": 0}, "RESPONSE_GROUP": {"RESPONSE": {"RESPONSE_DATA": {}}}})
}

#[tokio::test]
async fn when_the_subject_is_not_located_the_search_is_widened_once_with_the_default_size() {
    // Given: a first comparables call that cannot locate the subject,
    // and a building-size lookup that returns no data
    let client = Arc::new(
        ScriptedHttpClient::new()
            .route(COMPARABLES, no_record_response())
            .route_json(COMPARABLES, comparables_found())
            .route_json("/property/detail", empty_result()),
    );
    let gateway = gateway(&client);

    // When: comparables are requested for an address
    let result = gateway
        .comparables()
        .by_address(bag([("address1", "123 Main St"), ("address2", "Anytown, CA 90210")]))
        .await;

    // Then: the retry succeeds with a radius derived from the default size
    assert_eq!(result.expect("widened retry succeeds"), comparables_found());
    let urls: Vec<String> = client
        .urls()
        .into_iter()
        .filter(|url| url.contains(COMPARABLES))
        .collect();
    assert_eq!(
        urls,
        vec![
            String::from(
                "https://upstream.test/property/v2/salescomparables/address/123%20Main%20St/Anytown/-/CA/90210"
            ),
            String::from(
                "https://upstream.test/property/v2/salescomparables/address/123%20Main%20St/Anytown/-/CA/90210?sqFeetRange=600&yearBuiltRange=20"
            ),
        ]
    );
}

#[tokio::test]
async fn when_the_widened_retry_also_fails_the_error_propagates_after_one_retry() {
    // Given: an upstream that never locates the subject
    let client = Arc::new(
        ScriptedHttpClient::new()
            .route(COMPARABLES, no_record_response())
            .route_json("/property/detail", empty_result()),
    );
    let gateway = gateway(&client);

    // When: comparables are requested
    let error = gateway
        .comparables()
        .by_address(bag([("address1", "123 Main St"), ("address2", "Anytown, CA 90210")]))
        .await
        .expect_err("both attempts fail");

    // Then: exactly one widened retry was made and its error is returned
    assert_eq!(client.count(COMPARABLES), 2);
    assert_eq!(error.signal(), Some(UpstreamSignal::NoRecordFound));
    assert!(error
        .structured()
        .expect("transport failure")
        .url()
        .contains("yearBuiltRange=20"));
}

#[tokio::test]
async fn when_the_failure_is_unrelated_no_retry_is_made() {
    let client = Arc::new(
        ScriptedHttpClient::new().route(COMPARABLES, HttpResponse::new(500, "internal error")),
    );
    let gateway = gateway(&client);

    let error = gateway
        .comparables()
        .by_prop_id(bag([("propId", "1001")]))
        .await
        .expect_err("server error");

    assert_eq!(error.signal(), None);
    assert_eq!(client.count(COMPARABLES), 1);
    assert_eq!(client.count("/property/detail"), 0);
}

#[tokio::test]
async fn when_the_building_size_is_known_the_radius_is_thirty_percent_of_it() {
    // Given: a subject whose living size is 1850 sq ft
    let client = Arc::new(
        ScriptedHttpClient::new()
            .route(COMPARABLES, no_record_response())
            .route_json(COMPARABLES, comparables_found())
            .route_json(
                "/property/detail",
                json!({
                    "status": {"code": 0},
                    "property": [{"building": {"size": {"livingsize": 1850}}}]
                }),
            ),
    );
    let gateway = gateway(&client);

    // When: comparables are requested by property id with a narrow range
    gateway
        .comparables()
        .by_prop_id(bag([("propId", "1001"), ("sqFeetRange", "50")]))
        .await
        .expect("widened retry succeeds");

    // Then: the size was looked up by id and the caller's range was replaced
    assert!(client
        .last_url("/property/detail")
        .expect("size lookup")
        .ends_with("?attomid=1001"));
    assert_eq!(
        client.last_url(COMPARABLES).expect("retry"),
        "https://upstream.test/property/v2/salescomparables/propid/1001?sqFeetRange=555&yearBuiltRange=20"
    );
}

#[tokio::test]
async fn when_the_first_call_succeeds_nothing_else_is_fetched() {
    let client = Arc::new(ScriptedHttpClient::new().route_json(COMPARABLES, comparables_found()));
    let gateway = gateway(&client);

    gateway
        .comparables()
        .by_prop_id(bag([("propId", "1001"), ("miles", "1")]))
        .await
        .expect("success");

    assert_eq!(
        client.urls(),
        vec![String::from(
            "https://upstream.test/property/v2/salescomparables/propid/1001?miles=1"
        )]
    );
}
