//! reqwest-backed transport speaking the v1 and v2 authenticator APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use sca_core::config::HttpConfig;
use sca_core::models::{ServerStatus, parse_envelope, parse_envelope_list};
use sca_core::{ApiVersion, Connection, EncryptedEnvelope};

use super::{Action, ActionRequest, ActionResponse, RequestKind, Transport};
use crate::error::FetchError;

const ACCESS_TOKEN_HEADER: &str = "Access-Token";

/// Error body returned by the service on non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_class: String,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct V2ActionBody {
    data: V2ActionData,
}

#[derive(Debug, Deserialize)]
struct V2ActionData {
    status: ServerStatus,
}

/// HTTP transport for the authenticator API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    app_language: String,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        // reqwest is built with rustls-no-provider; Err means a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut builder = reqwest::Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        Ok(Self {
            http: builder.build()?,
            app_language: config.app_language.clone(),
        })
    }

    fn base(connection: &Connection) -> Result<String, FetchError> {
        connection
            .usable_base_url()
            .map(|base| format!("{base}/{}", connection.api_version.api_path()))
            .ok_or_else(|| FetchError::Generic(format!("{} has no base URL", connection.name)))
    }

    pub(crate) fn list_url(connection: &Connection, kind: RequestKind) -> Result<String, FetchError> {
        Ok(format!("{}/{}", Self::base(connection)?, kind.path()))
    }

    pub(crate) fn authorization_url(
        connection: &Connection,
        authorization_id: &str,
    ) -> Result<String, FetchError> {
        Ok(format!(
            "{}/authorizations/{authorization_id}",
            Self::base(connection)?
        ))
    }

    pub(crate) fn action_url(
        connection: &Connection,
        request: &ActionRequest,
    ) -> Result<String, FetchError> {
        let url = Self::authorization_url(connection, &request.authorization_id)?;
        Ok(match connection.api_version {
            ApiVersion::V1 => url,
            ApiVersion::V2 => match request.action {
                Action::Confirm => format!("{url}/confirm"),
                Action::Deny => format!("{url}/deny"),
            },
        })
    }

    pub(crate) fn consent_revoke_url(
        connection: &Connection,
        consent_id: &str,
    ) -> Result<String, FetchError> {
        let url = format!(
            "{}/{}/{consent_id}",
            Self::base(connection)?,
            RequestKind::Consents.path()
        );
        Ok(match connection.api_version {
            ApiVersion::V1 => url,
            ApiVersion::V2 => format!("{url}/revoke"),
        })
    }

    pub(crate) fn action_body(
        api_version: ApiVersion,
        request: &ActionRequest,
    ) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        if api_version == ApiVersion::V1 {
            data.insert(
                "confirm".into(),
                json!(request.action == Action::Confirm),
            );
        }
        if let Some(code) = &request.authorization_code {
            data.insert("authorization_code".into(), json!(code));
        }
        json!({ "data": data })
    }

    fn headers(&self, connection: &Connection) -> Result<HeaderMap, FetchError> {
        let invalid = |_| FetchError::Generic("Invalid header value".into());
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.app_language).map_err(invalid)?,
        );
        match connection.api_version {
            ApiVersion::V1 => {
                headers.insert(
                    ACCESS_TOKEN_HEADER,
                    HeaderValue::from_str(&connection.access_token).map_err(invalid)?,
                );
            }
            ApiVersion::V2 => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", connection.access_token))
                        .map_err(invalid)?,
                );
            }
        }
        Ok(headers)
    }

    /// Read the body of a response, classifying non-success statuses.
    async fn read_body(resp: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Generic(e.to_string()))?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        Err(classify_failure(status.as_u16(), &body))
    }

    async fn get(&self, connection: &Connection, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(connection_id = %connection.id, url, "GET");
        let resp = self
            .http
            .get(url)
            .headers(self.headers(connection)?)
            .send()
            .await
            .map_err(|e| FetchError::Generic(e.to_string()))?;
        Self::read_body(resp).await
    }
}

/// Interpret the body of a successful action response.
///
/// v1 treats any 2xx as success and never looks at the body.
pub(crate) fn action_response(
    api_version: ApiVersion,
    body: &[u8],
) -> Result<ActionResponse, FetchError> {
    match api_version {
        ApiVersion::V1 => Ok(ActionResponse::V1),
        ApiVersion::V2 => {
            let parsed: V2ActionBody = serde_json::from_slice(body)
                .map_err(|e| FetchError::Generic(format!("Malformed action response: {e}")))?;
            Ok(ActionResponse::V2 {
                status: parsed.data.status,
            })
        }
    }
}

/// Map a failed response to a classified error.
pub(crate) fn classify_failure(status: u16, body: &[u8]) -> FetchError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) => FetchError::from_error_class(&err.error_class, &err.error_message),
        Err(_) => FetchError::Generic(format!("HTTP {status}")),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_list(
        &self,
        connection: &Connection,
        kind: RequestKind,
    ) -> Result<Vec<EncryptedEnvelope>, FetchError> {
        let url = Self::list_url(connection, kind)?;
        let body = self.get(connection, &url).await?;
        parse_envelope_list(&body).map_err(|e| FetchError::Generic(e.to_string()))
    }

    async fn fetch_authorization(
        &self,
        connection: &Connection,
        authorization_id: &str,
    ) -> Result<EncryptedEnvelope, FetchError> {
        let url = Self::authorization_url(connection, authorization_id)?;
        let body = self.get(connection, &url).await?;
        parse_envelope(&body).map_err(|e| FetchError::Generic(e.to_string()))
    }

    async fn send_action(
        &self,
        connection: &Connection,
        request: &ActionRequest,
    ) -> Result<ActionResponse, FetchError> {
        let url = Self::action_url(connection, request)?;
        debug!(connection_id = %connection.id, url, action = ?request.action, "PUT");
        let resp = self
            .http
            .put(&url)
            .headers(self.headers(connection)?)
            .json(&Self::action_body(connection.api_version, request))
            .send()
            .await
            .map_err(|e| FetchError::Generic(e.to_string()))?;
        let body = Self::read_body(resp).await?;
        action_response(connection.api_version, &body)
    }

    async fn revoke_consent(
        &self,
        connection: &Connection,
        consent_id: &str,
    ) -> Result<(), FetchError> {
        let url = Self::consent_revoke_url(connection, consent_id)?;
        let request = match connection.api_version {
            ApiVersion::V1 => self.http.delete(&url),
            ApiVersion::V2 => self.http.put(&url).json(&json!({ "data": {} })),
        };
        debug!(connection_id = %connection.id, url, "Revoke consent");
        let resp = request
            .headers(self.headers(connection)?)
            .send()
            .await
            .map_err(|e| FetchError::Generic(e.to_string()))?;
        Self::read_body(resp).await.map(drop)
    }
}
