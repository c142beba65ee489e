//! Execution context kinds and client identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity token of a page context as seen from a worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    /// Sentinel identity used for every request that originates in a page
    /// running the router itself (legacy mode)
    pub const LEGACY: &'static str = "service-mocker-legacy-client";

    /// Wrap an existing identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh, process-unique identity
    pub fn generate() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(format!("client-{}", NEXT_ID.fetch_add(1, Ordering::SeqCst)))
    }

    /// The legacy sentinel identity
    pub fn legacy() -> Self {
        Self(Self::LEGACY.to_string())
    }

    /// Whether this is the legacy sentinel identity
    pub fn is_legacy(&self) -> bool {
        self.0 == Self::LEGACY
    }

    /// The raw identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a piece of mocker code is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionContext {
    /// A detached worker-like context serving one or more pages
    Worker,
    /// The page itself (legacy mode)
    Page,
}

impl ExecutionContext {
    /// Identity every request from this context is attributed to, when the
    /// context is a page running its own router
    pub fn sentinel_identity(&self) -> Option<ClientId> {
        match self {
            ExecutionContext::Worker => None,
            ExecutionContext::Page => Some(ClientId::legacy()),
        }
    }

    /// Whether this is the legacy page context
    pub fn is_legacy(&self) -> bool {
        matches!(self, ExecutionContext::Page)
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Worker => write!(f, "worker"),
            ExecutionContext::Page => write!(f, "page"),
        }
    }
}
