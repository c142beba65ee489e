//! Errors raised by clients and servers.

use thiserror::Error;

use interceptor::InterceptError;
use messaging::{Action, MessagingError};
use router::RouterError;
use web_platform::PlatformError;

/// Errors produced on the page side of a connection
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The server answered a handshake step with the wrong action
    #[error("Protocol error: expected `{expected}` in reply to `{request}`, got `{actual}`")]
    Protocol {
        /// Action that was sent
        request: Action,
        /// Action the handshake requires
        expected: Action,
        /// Action that came back
        actual: Action,
    },
    /// The page lost its controller outside of this client's control
    #[error("Service worker controller has been removed, close every tab of this origin and reload")]
    ControllerRemoved,
    /// The registration has no worker to talk to
    #[error("Registration for {0} has no service worker")]
    NoWorker(String),
    /// Connecting failed earlier; the reason is kept as text
    #[error("Client is not connected: {0}")]
    NotConnected(String),
    /// A message round trip failed
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    /// The host environment rejected an operation
    #[error(transparent)]
    Platform(#[from] PlatformError),
    /// Patching the page failed
    #[error(transparent)]
    Intercept(#[from] InterceptError),
}

/// Errors produced in the context running the router
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    /// No connected page can serve a worker-initiated request
    #[error("No active client is found")]
    NoActiveClient,
    /// A message round trip failed
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    /// Creating the router failed
    #[error(transparent)]
    Router(#[from] RouterError),
}
