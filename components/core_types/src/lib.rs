//! Core HTTP-like types shared by every mocker component.
//!
//! This crate provides the request/response vocabulary that flows between
//! page contexts, worker contexts and the routing engine. Nothing here
//! performs I/O.
//!
//! # Overview
//!
//! - [`Method`] - HTTP request methods
//! - [`Headers`] - Case-insensitive, ordered header list
//! - [`Body`] / [`Blob`] - Request body shapes accepted by fetch and XHR
//! - [`Request`] / [`RequestInit`] - Normalized request representation
//! - [`Response`] - Native response representation
//! - [`decode_uri_component`] - Strict percent-decoding
//!
//! # Examples
//!
//! ```
//! use core_types::{Method, Request, Response};
//!
//! let request = Request::new(Method::Get, "https://example.com/api");
//! assert_eq!(request.method, Method::Get);
//!
//! let response = Response::new(200, b"ok".to_vec());
//! assert!(response.ok());
//! assert_eq!(response.status_text, "OK");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod body;
mod error;
mod headers;
mod method;
mod request;
mod response;
mod uri;

pub use body::{Blob, Body};
pub use error::CoreError;
pub use headers::Headers;
pub use method::Method;
pub use request::{Request, RequestInit};
pub use response::{is_null_body_status, status_text, Response, ResponseType};
pub use uri::decode_uri_component;

/// Mime type used when a body has no better description.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Mime type for JSON bodies.
pub const JSON_MIME: &str = "application/json";

/// Mime type for url-encoded form bodies.
pub const FORM_MIME: &str = "application/x-www-form-urlencoded";
