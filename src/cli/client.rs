use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL '{0}'")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Error envelope returned by the server
    #[error("{message} ({code}, HTTP {status})")]
    Api { status: StatusCode, code: String, message: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Thin JSON client for the admin API. Unwraps the `{"success":true,"data":...}`
/// envelope and turns error envelopes into [`ClientError::Api`].
pub struct ApiClient {
    base: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: &str, token: Option<String>) -> Result<Self, ClientError> {
        let base = Url::parse(base).map_err(|_| ClientError::InvalidUrl(base.to_string()))?;
        Ok(Self {
            base,
            token: token.filter(|t| !t.is_empty()),
            http: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.send::<()>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ClientError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ClientError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ClientError> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.send::<()>(Method::DELETE, path, None).await
    }

    pub async fn delete_with<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ClientError> {
        self.send(Method::DELETE, path, Some(body)).await
    }

    async fn send<B: Serialize>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Value, ClientError> {
        let url = self
            .base
            .join(path)
            .map_err(|_| ClientError::InvalidUrl(format!("{}{}", self.base, path)))?;

        let mut request = self.http.request(method, url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            let field = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or("").to_string();
            return Err(ClientError::Api {
                status,
                code: field("code"),
                message: field("message"),
            });
        }

        match body.get("data") {
            Some(data) => Ok(data.clone()),
            None => Err(ClientError::UnexpectedResponse(body.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(ApiClient::new("not a url", None), Err(ClientError::InvalidUrl(_))));
        let client = ApiClient::new("http://localhost:3000", Some(String::new())).unwrap();
        assert!(client.token.is_none());
        assert_eq!(client.base_url().as_str(), "http://localhost:3000/");
    }
}
