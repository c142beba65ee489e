//! Mock server for requests issued by pages.
//!
//! A page creates a [`Client`] with [`create_client`]; the script it
//! points at creates a [`Server`] with [`create_server`] and registers
//! routes on [`Server::router`]. Where service workers are available the
//! server runs in a worker that intercepts the page's requests. Elsewhere
//! the client falls back to legacy mode: the server runs in the page and
//! the page's `fetch` and `XMLHttpRequest` are patched to consult it.
//!
//! # Overview
//!
//! - [`Client`] / [`ConnectionState`] - Connecting, handshake, reconnection
//! - [`Server`] / [`Storage`] - Routes and the storage bridge
//! - [`ClientRegistry`] - Pages connected to a server context
//! - [`ClientOptions`] / [`ServerOptions`] - Configuration
//!
//! # Example
//!
//! ```no_run
//! use service_mocker::{create_client, create_server, ClientOptions};
//! use web_platform::Browser;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let browser = Browser::new();
//! browser.scripts().define("/server.js", |scope| {
//!     if let Ok(server) = create_server(scope, "/") {
//!         let _ = server.router().get("/api", router::literal("Hello new world!"));
//!     }
//! });
//!
//! let window = browser.open_window("https://app.test/")?;
//! let client = create_client(&window, "/server.js", ClientOptions::default());
//! client.ready().await;
//! let response = window.fetch("/api", Default::default()).await?;
//! assert_eq!(response.text()?, "Hello new world!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod options;
pub mod registry;
pub mod server;
pub mod storage;

pub use client::{create_client, Client, ConnectionState, ControllerCallback};
pub use error::{ClientError, ServerError};
pub use options::{ClientOptions, ServerOptions};
pub use registry::ClientRegistry;
pub use server::{create_server, Server};
pub use storage::Storage;
