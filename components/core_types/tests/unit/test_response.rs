//! Unit tests for Response and status helpers

use core_types::{decode_uri_component, status_text, Response};

#[test]
fn json_body_round_trips() {
    let response = Response::new(200, br#"{"id":7}"#.to_vec())
        .with_header("Content-Type", "application/json");
    let value: serde_json::Value = response.json().unwrap();
    assert_eq!(value["id"], 7);
    assert_eq!(response.content_type(), Some("application/json"));
}

#[test]
fn malformed_json_is_an_error() {
    let response = Response::new(200, b"{oops".to_vec());
    assert!(response.json::<serde_json::Value>().is_err());
}

#[test]
fn ok_range() {
    assert!(Response::new(200, Vec::new()).ok());
    assert!(Response::new(299, Vec::new()).ok());
    assert!(!Response::new(300, Vec::new()).ok());
}

#[test]
fn status_texts() {
    assert_eq!(status_text(204), "No Content");
    assert_eq!(status_text(500), "Internal Server Error");
}

#[test]
fn uri_component_decoding() {
    assert_eq!(decode_uri_component("caf%C3%A9").unwrap(), "café");
    assert!(decode_uri_component("%C3").is_err());
}
