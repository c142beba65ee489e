//! Express-style routing of intercepted requests.
//!
//! A [`Router`] is bound to a base URL and holds rules tried in
//! registration order. Every router created in an execution context is
//! appended to that context's [`RouterList`], which offers each
//! intercepted [`FetchEvent`](web_platform::FetchEvent) to the routers in
//! turn until one matches. Handlers receive a [`MockerRequest`] and a
//! [`MockerResponse`] that answers the event exactly once.
//!
//! # Overview
//!
//! - [`Router`] / [`RouteBuilder`] - Rule registration and matching
//! - [`RoutePattern`] / [`CompiledPattern`] - `:param` path patterns
//! - [`MockerRequest`] - Path, query, params and body accessors
//! - [`MockerResponse`] / [`ResponseBody`] - Deferred response builder
//! - [`parse_query`] - Nested bracket query parsing

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod list;
pub mod pattern;
pub mod query;
pub mod request;
pub mod response;
pub mod router;

pub use error::RouterError;
pub use list::RouterList;
pub use pattern::{CompiledPattern, RawParams, RoutePattern};
pub use query::parse_query;
pub use request::MockerRequest;
pub use response::{MockerResponse, ResponseBody};
pub use router::{literal, Handler, RouteBuilder, Router};
