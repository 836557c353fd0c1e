//! Connections service abstraction.
//!
//! This module provides:
//! - `ConnectionsApi` trait for the remote service the workflow talks to
//! - `HttpApi` implementation over the REST endpoints
//! - Types for candidates, connections and save payloads

pub mod http;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpApi;

/// Relationship between the current user and a search candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    None,
    Connected,
    PendingSent,
    PendingReceived,
}

impl ConnectionStatus {
    /// Badge text shown instead of a selection affordance
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::None => "",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::PendingSent => "Request sent",
            ConnectionStatus::PendingReceived => "Request received",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::None => "none",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::PendingSent => "pending_sent",
            ConnectionStatus::PendingReceived => "pending_received",
        }
    }
}

/// A registered user returned by a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCandidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "connection_status")]
    pub status: ConnectionStatus,
}

impl ConnectionCandidate {
    /// Only candidates with no existing relationship can be selected
    pub fn is_selectable(&self) -> bool {
        self.status == ConnectionStatus::None
    }
}

/// Free-text contact data as entered by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalContactDraft {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub relationship: String,
}

impl ExternalContactDraft {
    /// Copy with surrounding whitespace removed; a blank address becomes `None`
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: self
                .address
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            relationship: self.relationship.trim().to_string(),
        }
    }
}

/// Registered user on the other end of a linked connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedConnection {
    pub id: String,
    pub connected_user: ConnectedUser,
    pub relationship: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalContact {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
    pub relationship: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ExternalContact {
    pub fn to_draft(&self) -> ExternalContactDraft {
        ExternalContactDraft {
            name: self.name.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            relationship: self.relationship.clone(),
        }
    }
}

/// A saved connection handed to the modal for editing.
///
/// The presence of `connected_user` marks a linked connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditingContact {
    Linked(LinkedConnection),
    External(ExternalContact),
}

impl EditingContact {
    pub fn id(&self) -> &str {
        match self {
            EditingContact::Linked(link) => &link.id,
            EditingContact::External(contact) => &contact.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            EditingContact::Linked(link) => &link.connected_user.name,
            EditingContact::External(contact) => &contact.name,
        }
    }

    pub fn relationship(&self) -> &str {
        match self {
            EditingContact::Linked(link) => &link.relationship,
            EditingContact::External(contact) => &contact.relationship,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionList {
    #[serde(default)]
    pub linked_connections: Vec<LinkedConnection>,
    #[serde(default)]
    pub external_contacts: Vec<ExternalContact>,
}

impl ConnectionList {
    pub fn is_empty(&self) -> bool {
        self.linked_connections.is_empty() && self.external_contacts.is_empty()
    }

    /// Linked connections first, then external contacts
    pub fn entries(&self) -> Vec<EditingContact> {
        self.linked_connections
            .iter()
            .cloned()
            .map(EditingContact::Linked)
            .chain(
                self.external_contacts
                    .iter()
                    .cloned()
                    .map(EditingContact::External),
            )
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Linked,
    External,
}

impl ConnectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::Linked => "linked",
            ConnectionKind::External => "external",
        }
    }
}

/// Payload for creating a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewConnection {
    Linked {
        connected_user_id: String,
        relationship: String,
    },
    External(ExternalContactDraft),
}

impl NewConnection {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            NewConnection::Linked { .. } => ConnectionKind::Linked,
            NewConnection::External(_) => ConnectionKind::External,
        }
    }
}

/// Payload for updating a connection; linked identity is immutable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    Linked { relationship: String },
    External(ExternalContactDraft),
}

impl ConnectionUpdate {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            ConnectionUpdate::Linked { .. } => ConnectionKind::Linked,
            ConnectionUpdate::External(_) => ConnectionKind::External,
        }
    }
}

/// Acknowledgement returned by a successful write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReceipt {
    pub id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The service answered but refused the request
    #[error("{0}")]
    Rejected(String),
    /// The request never completed
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Network-like failures: transport errors or any message mentioning the network
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_)) || self.to_string().to_lowercase().contains("network")
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The remote service behind the connection workflow
#[async_trait]
pub trait ConnectionsApi: Send + Sync {
    /// Find registered users matching `query`, annotated with their connection status
    async fn search_users(
        &self,
        query: &str,
        exclude_user_id: Option<&str>,
    ) -> ApiResult<Vec<ConnectionCandidate>>;

    async fn add_connection(&self, payload: NewConnection) -> ApiResult<SaveReceipt>;

    async fn update_connection(
        &self,
        contact_id: &str,
        update: ConnectionUpdate,
    ) -> ApiResult<SaveReceipt>;

    async fn list_connections(&self, user_id: &str) -> ApiResult<ConnectionList>;

    async fn delete_connection(&self, connection_id: &str) -> ApiResult<SaveReceipt>;
}
