//! Transport seam between the engine and the authorization service.
//!
//! One call per connection per cycle. Implementations classify server
//! failures into [`FetchError`] so the fetcher can apply registry side
//! effects without knowing the wire protocol.

mod http;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

use sca_core::{AuthorizationStatus, Connection, EncryptedEnvelope};
use sca_core::models::ServerStatus;

use crate::error::FetchError;

pub use http::HttpTransport;

/// Collection fetched by a list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Authorizations,
    Consents,
}

impl RequestKind {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Authorizations => "authorizations",
            Self::Consents => "consents",
        }
    }
}

/// User decision on an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Confirm,
    Deny,
}

impl Action {
    /// Local status applied when the server acknowledges the action.
    pub const fn final_status(self) -> AuthorizationStatus {
        match self {
            Self::Confirm => AuthorizationStatus::Confirmed,
            Self::Deny => AuthorizationStatus::Denied,
        }
    }
}

/// Confirm/deny request for one authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub authorization_id: String,
    pub authorization_code: Option<String>,
    pub action: Action,
}

/// Server acknowledgement of an action, shaped by protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionResponse {
    /// v1 carries no independent status; any success is final.
    V1,
    /// v2 reports the status the server now holds.
    V2 { status: ServerStatus },
}

/// Request/response transport to one connection's service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch every encrypted record of `kind` for `connection`.
    async fn fetch_list(
        &self,
        connection: &Connection,
        kind: RequestKind,
    ) -> Result<Vec<EncryptedEnvelope>, FetchError>;

    /// Fetch one encrypted authorization.
    async fn fetch_authorization(
        &self,
        connection: &Connection,
        authorization_id: &str,
    ) -> Result<EncryptedEnvelope, FetchError>;

    /// Send a confirm/deny decision.
    async fn send_action(
        &self,
        connection: &Connection,
        request: &ActionRequest,
    ) -> Result<ActionResponse, FetchError>;

    /// Revoke a consent previously granted through `connection`.
    async fn revoke_consent(
        &self,
        connection: &Connection,
        consent_id: &str,
    ) -> Result<(), FetchError>;
}
