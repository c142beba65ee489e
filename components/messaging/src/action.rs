//! The fixed action vocabulary carried in every message envelope.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Message action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Liveness check sent by a client
    Ping,
    /// Reply to [`Action::Ping`]
    Pong,
    /// Client is going away
    Disconnect,
    /// Ask the worker to claim uncontrolled pages
    RequestClaim,
    /// Reply to [`Action::RequestClaim`]
    Established,
    /// Storage bridge: read a key
    GetStorage,
    /// Storage bridge: write a key
    SetStorage,
    /// Storage bridge: delete a key
    RemoveStorage,
    /// Storage bridge: delete all keys
    ClearStorage,
    /// Generic successful reply
    Success,
    /// Generic failed reply
    Failed,
    /// Application-defined action
    Custom(String),
}

impl Action {
    /// Wire name of the action
    pub fn as_str(&self) -> &str {
        match self {
            Action::Ping => "ping",
            Action::Pong => "pong",
            Action::Disconnect => "disconnect",
            Action::RequestClaim => "request_claim",
            Action::Established => "established",
            Action::GetStorage => "get_storage",
            Action::SetStorage => "set_storage",
            Action::RemoveStorage => "remove_storage",
            Action::ClearStorage => "clear_storage",
            Action::Success => "success",
            Action::Failed => "failed",
            Action::Custom(name) => name,
        }
    }

    /// Parse a wire name; unknown names become [`Action::Custom`]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "ping" => Action::Ping,
            "pong" => Action::Pong,
            "disconnect" => Action::Disconnect,
            "request_claim" => Action::RequestClaim,
            "established" => Action::Established,
            "get_storage" => Action::GetStorage,
            "set_storage" => Action::SetStorage,
            "remove_storage" => Action::RemoveStorage,
            "clear_storage" => Action::ClearStorage,
            "success" => Action::Success,
            "failed" => Action::Failed,
            other => Action::Custom(other.to_string()),
        }
    }

    /// Whether this is one of the storage bridge actions
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Action::GetStorage | Action::SetStorage | Action::RemoveStorage | Action::ClearStorage
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Action::from_wire(&name))
    }
}
