//! In-process model of the browser APIs the mocker runs against.
//!
//! Pages, service workers and the network are simulated inside one process
//! so that interception can be exercised natively. Each page and worker is
//! an execution context with its own [`GlobalScope`]; contexts talk to each
//! other only through posted messages.
//!
//! # Overview
//!
//! - [`Browser`] - A profile: windows, registrations, scripts, network
//! - [`Window`] - A page context with patchable `fetch` / XHR slots
//! - [`ServiceWorkerContainer`] / [`ServiceWorkerRegistration`] /
//!   [`ServiceWorker`] - Worker registration and lifecycle
//! - [`GlobalScope`] - Event bus, singletons and native fetch of a context
//! - [`Clients`] - Worker-side view of controlled pages
//! - [`FetchEvent`] - Intercepted request with a one-shot `respond_with`
//! - [`Transport`] / [`StaticNetwork`] - The real network
//! - [`KeyValueStore`] / [`MemoryStore`] - Persistent storage capability
//! - [`NativeXhr`] / [`NetworkXhr`] - XMLHttpRequest capability

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod browser;
pub mod clients;
pub mod error;
pub mod fetch_event;
pub mod network;
pub mod same_origin;
pub mod scope;
pub mod scripts;
pub mod service_worker;
pub mod storage;
pub mod targets;
pub mod window;
pub mod xhr;

pub use browser::{Browser, BrowserBuilder, BrowserConfig};
pub use clients::{Clients, WindowClient};
pub use error::{NetworkError, PlatformError};
pub use fetch_event::{dispatch_fetch, FetchEvent, ResponseFuture, ResponseReceiver};
pub use network::{StaticNetwork, Transport};
pub use same_origin::Origin;
pub use scope::{GlobalScope, ScopeEvent, WeakScope};
pub use scripts::{ScriptRegistry, WorkerScript};
pub use service_worker::{
    ContainerEvent, RegistrationOptions, ServiceWorker, ServiceWorkerContainer,
    ServiceWorkerRegistration, ServiceWorkerState, UpdateViaCache,
};
pub use storage::{KeyValueStore, MemoryStore};
pub use targets::{WindowTarget, WorkerTarget};
pub use window::Window;
pub use xhr::{
    decode_response, format_headers, NativeXhr, NetworkXhr, NetworkXhrFactory, ReadyState,
    XhrEvent, XhrEventKind, XhrFactory, XhrListener, XhrResponse, XhrResponseType, XmlDocument,
};
