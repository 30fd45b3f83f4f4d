//! Connections: linked relationships with one provider.

use serde::{Deserialize, Serialize};

/// Server API generation a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
}

impl ApiVersion {
    /// Path prefix for the authenticator API of this version.
    pub const fn api_path(self) -> &'static str {
        match self {
            Self::V1 => "api/authenticator/v1",
            Self::V2 => "api/authenticator/v2",
        }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => f.write_str("v1"),
            Self::V2 => f.write_str("v2"),
        }
    }
}

/// A linked relationship with one provider.
///
/// The engine treats connections as read-only snapshots; the only mutation
/// it requests is marking one inactive through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    /// Display name, used to tag user-facing failure messages.
    pub name: String,
    /// Absent base URL makes the connection unusable.
    #[serde(default)]
    pub base_url: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl Connection {
    /// Base URL without a trailing slash, if one is configured and non-empty.
    pub fn usable_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn connection_defaults_to_active_v1() {
        let json = r#"{"id": "1", "name": "Bank", "access_token": "tok"}"#;
        let conn: Connection = serde_json::from_str(json).unwrap();
        assert!(conn.active);
        assert_eq!(conn.api_version, ApiVersion::V1);
        assert!(conn.usable_base_url().is_none());
    }

    #[test]
    fn usable_base_url_trims_trailing_slash() {
        let conn = Connection {
            id: "1".into(),
            name: "Bank".into(),
            base_url: Some("https://bank.example/".into()),
            access_token: "tok".into(),
            api_version: ApiVersion::V2,
            active: true,
        };
        assert_eq!(conn.usable_base_url(), Some("https://bank.example"));
    }

    #[test]
    fn empty_base_url_is_unusable() {
        let conn = Connection {
            id: "1".into(),
            name: "Bank".into(),
            base_url: Some(String::new()),
            access_token: "tok".into(),
            api_version: ApiVersion::V1,
            active: true,
        };
        assert!(conn.usable_base_url().is_none());
    }

    #[test]
    fn api_paths_per_version() {
        assert_eq!(ApiVersion::V1.api_path(), "api/authenticator/v1");
        assert_eq!(ApiVersion::V2.api_path(), "api/authenticator/v2");
        assert_eq!(serde_json::to_string(&ApiVersion::V2).unwrap(), r#""v2""#);
    }
}
