//! Origins of page and worker contexts.

use std::fmt;
use url::Url;

use crate::PlatformError;

/// An origin tuple (scheme, host, port)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// URL scheme (e.g., "https", "http")
    pub scheme: String,
    /// Host (e.g., "example.com", "localhost")
    pub host: String,
    /// Port number (None means default port for scheme)
    pub port: Option<u16>,
}

impl Origin {
    /// Create a new origin
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.into().to_lowercase(),
            host: host.into().to_lowercase(),
            port,
        }
    }

    /// The origin of a parsed URL
    pub fn from_url(url: &Url) -> Result<Self, PlatformError> {
        let host = url
            .host_str()
            .ok_or_else(|| PlatformError::InvalidUrl(format!("{} has an opaque origin", url)))?;
        Ok(Origin::new(url.scheme(), host, url.port()))
    }

    /// Parse an origin from a URL string
    pub fn parse(url: &str) -> Result<Self, PlatformError> {
        Origin::from_url(&Url::parse(url.trim())?)
    }

    /// Get the effective port (resolving default ports)
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| default_port(&self.scheme))
    }

    /// Two origins are same-origin if scheme, host and effective port match
    pub fn is_same_origin(&self, other: &Origin) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && self.effective_port() == other.effective_port()
    }

    /// Whether a context with this origin counts as a secure context
    pub fn is_potentially_trustworthy(&self) -> bool {
        match self.scheme.as_str() {
            "https" | "wss" => true,
            _ => matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "[::1]")
                || self.host.ends_with(".localhost"),
        }
    }

    /// Serialize origin to string
    pub fn serialize(&self) -> String {
        match self.port {
            Some(port) if port != default_port(&self.scheme) => {
                format!("{}://{}:{}", self.scheme, self.host, port)
            }
            _ => format!("{}://{}", self.scheme, self.host),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

/// Default ports for common schemes
fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" | "ws" => 80,
        "https" | "wss" => 443,
        _ => 0,
    }
}
