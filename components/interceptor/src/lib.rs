//! Page-level interception of `fetch` and `XMLHttpRequest`.
//!
//! When no worker can intercept a page's requests, the page patches its
//! own request functions instead. Each request is dispatched as a fetch
//! event on the page's scope under the legacy client identity; listeners
//! get a grace period to call `respond_with`, after which the request
//! falls through to the native implementation.
//!
//! # Overview
//!
//! - [`FetchInterceptor`] - Patches and restores a page's fetch slot
//! - [`XhrInterceptor`] / [`InterceptedXhr`] - XHR wrapper delegating to
//!   the native object
//! - [`intercept`] - The shared dispatch-and-wait step
//! - [`FetchInterceptOptions`] - Grace period configuration

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod fetch;
mod patches;
pub mod xhr;

pub use error::InterceptError;
pub use fetch::{intercept, FetchInterceptOptions, FetchInterceptor, LEGACY_GRACE};
pub use xhr::{InterceptedXhr, XhrInterceptor};
