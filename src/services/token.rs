//! Bearer-token acquisition.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::error::ServiceError;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials for the IAM-style password authentication flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: String,
    pub project: String,
}

/// An opaque bearer token. Valid for roughly 24 hours; the recognition
/// client re-authenticates once per batch, which is well inside that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Exchanges credentials for a bearer token.
pub trait TokenService: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> Result<BearerToken, ServiceError>;
}

/// HTTP client for an IAM-style token endpoint.
///
/// Posts a password-auth document and reads the token out of the
/// `X-Subject-Token` response header. The endpoint answers HTTP 201 on
/// success; anything else is a [`ServiceError::TokenRequest`].
pub struct IamTokenClient {
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl IamTokenClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::TokenRequest(format!("client build: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    fn auth_body(credentials: &Credentials) -> serde_json::Value {
        json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": credentials.username,
                            "password": credentials.password,
                            "domain": { "name": credentials.domain }
                        }
                    }
                },
                "scope": {
                    "project": { "name": credentials.project }
                }
            }
        })
    }
}

impl TokenService for IamTokenClient {
    fn authenticate(&self, credentials: &Credentials) -> Result<BearerToken, ServiceError> {
        debug!(endpoint = %self.endpoint, user = %credentials.username, "requesting token");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&Self::auth_body(credentials))
            .send()
            .map_err(|e| ServiceError::TokenRequest(e.to_string()))?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(ServiceError::TokenRequest(format!(
                "HTTP {} from token endpoint",
                response.status()
            )));
        }

        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .ok_or(ServiceError::TokenMissing)?;

        Ok(BearerToken(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_body_shape() {
        let body = IamTokenClient::auth_body(&Credentials {
            username: "svc-user".into(),
            password: "secret".into(),
            domain: "acme".into(),
            project: "cn-north-1".into(),
        });
        assert_eq!(body["auth"]["identity"]["methods"][0], "password");
        assert_eq!(
            body["auth"]["identity"]["password"]["user"]["name"],
            "svc-user"
        );
        assert_eq!(
            body["auth"]["identity"]["password"]["user"]["domain"]["name"],
            "acme"
        );
        assert_eq!(body["auth"]["scope"]["project"]["name"], "cn-north-1");
    }
}
