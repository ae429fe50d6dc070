// Assertion helpers for test responses

use crate::TestResponse;
use serde_json::Value;

/// Assert the response status
pub fn assert_status(response: &TestResponse, expected: u16) {
    assert_eq!(
        response.status(),
        expected,
        "expected status {}, got {} with body {}",
        expected,
        response.status(),
        response.text()
    );
}

/// Assert the JSON body equals `expected`
pub fn assert_json(response: &TestResponse, expected: &Value) {
    let actual: Value = response.json();
    assert_eq!(&actual, expected, "JSON body mismatch");
}

/// Assert the response carries header `name` with `expected`
pub fn assert_header(response: &TestResponse, name: &str, expected: &str) {
    match response.header(name) {
        Some(actual) => assert_eq!(actual, expected, "header {} mismatch", name),
        None => panic!("header {} not present", name),
    }
}

pub fn assert_body_contains(response: &TestResponse, needle: &str) {
    let text = response.text();
    assert!(text.contains(needle), "body {:?} does not contain {:?}", text, needle);
}

/// 2xx
pub fn assert_success(response: &TestResponse) {
    assert!(
        (200..300).contains(&response.status()),
        "expected success, got {} with body {}",
        response.status(),
        response.text()
    );
}

/// 4xx
pub fn assert_client_error(response: &TestResponse) {
    assert!(
        (400..500).contains(&response.status()),
        "expected client error, got {}",
        response.status()
    );
}

/// 5xx
pub fn assert_server_error(response: &TestResponse) {
    assert!(
        (500..600).contains(&response.status()),
        "expected server error, got {}",
        response.status()
    );
}

/// Assert a 400 validation body naming `field` with `constraint`
pub fn assert_validation_error(response: &TestResponse, field: &str, constraint: &str) {
    assert_status(response, 400);
    let body: Value = response.json();
    let errors = body["errors"].as_array().cloned().unwrap_or_default();
    let found = errors
        .iter()
        .any(|error| error["field"] == field && error["constraint"] == constraint);
    assert!(found, "no {} error for field {} in {}", constraint, field, body);
}
