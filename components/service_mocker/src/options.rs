//! Client and server configuration.
//!
//! Both option structs deserialize from camelCase JSON with every field
//! optional, so a host can pass `{}` or `{"forceLegacy": true}` straight
//! through.

use serde::{Deserialize, Serialize};

use messaging::Timeout;
use web_platform::RegistrationOptions;

/// Options for [`create_client`](crate::create_client)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientOptions {
    /// Run the router in the page even where service workers are available
    pub force_legacy: bool,
    /// Reply timeout for client-initiated requests; `None` or `0` uses the
    /// messaging default
    pub timeout_ms: Option<u64>,
    /// Registration scope, defaulting to the script's directory
    pub scope: Option<String>,
}

impl ClientOptions {
    /// Options forcing legacy mode
    pub fn legacy() -> Self {
        Self {
            force_legacy: true,
            ..Self::default()
        }
    }

    /// Reply timeout for handshake and custom messages
    pub fn timeout(&self) -> Timeout {
        Timeout::from(self.timeout_ms)
    }

    pub(crate) fn registration(&self) -> RegistrationOptions {
        RegistrationOptions {
            scope: self.scope.clone(),
            ..RegistrationOptions::default()
        }
    }
}

/// Options for [`Server::new`](crate::Server::new)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerOptions {
    /// Base URL of the server's router, resolved against the context location
    pub base_url: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            base_url: "/".to_string(),
        }
    }
}
