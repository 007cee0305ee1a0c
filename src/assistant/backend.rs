use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::assistant::attachment::FileAttachment;
use crate::error::BackendError;

/// Status and decoded body of a backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body of a 2xx response, or a status error naming `path`.
    pub fn into_success(self, path: &str) -> Result<Value, BackendError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(BackendError::Status {
                path: path.to_string(),
                status: self.status,
            })
        }
    }
}

/// The legislative REST backend. `auth` asks for the bearer token to be attached.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, path: &str, auth: bool) -> Result<ApiResponse, BackendError>;

    async fn post(&self, path: &str, body: Option<&Value>, auth: bool)
    -> Result<ApiResponse, BackendError>;

    /// Sends `file` as a multipart form under the `file` field.
    async fn upload(
        &self,
        path: &str,
        file: &FileAttachment,
        auth: bool,
    ) -> Result<ApiResponse, BackendError>;
}

/// reqwest-backed [`Backend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout_secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into(),
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(
        &self,
        request: RequestBuilder,
        path: &str,
        auth: bool,
    ) -> Result<RequestBuilder, BackendError> {
        if !auth {
            return Ok(request);
        }
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| BackendError::MissingToken(path.to_string()))?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<ApiResponse, BackendError> {
        let request_error = |source| BackendError::Request {
            path: path.to_string(),
            source,
        };
        let response = request.send().await.map_err(request_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(request_error)?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        log::debug!("backend {path} -> {status}");
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get(&self, path: &str, auth: bool) -> Result<ApiResponse, BackendError> {
        let request = self.authorize(self.client.get(self.url(path)), path, auth)?;
        self.send(request, path).await
    }

    async fn post(
        &self,
        path: &str,
        body: Option<&Value>,
        auth: bool,
    ) -> Result<ApiResponse, BackendError> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let request = self.authorize(request, path, auth)?;
        self.send(request, path).await
    }

    async fn upload(
        &self,
        path: &str,
        file: &FileAttachment,
        auth: bool,
    ) -> Result<ApiResponse, BackendError> {
        let part = Part::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())
            .map_err(|source| BackendError::Request {
                path: path.to_string(),
                source,
            })?;
        let request = self
            .client
            .post(self.url(path))
            .multipart(Form::new().part("file", part));
        let request = self.authorize(request, path, auth)?;
        self.send(request, path).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_success_status_becomes_error() {
        let response = ApiResponse {
            status: 503,
            body: json!({ "message": "down" }),
        };
        let err = response.into_success("/politician").unwrap_err();
        assert_eq!(err.to_string(), "backend returned status 503 for /politician");
    }

    #[test]
    fn url_joins_without_double_slash() {
        let backend = HttpBackend::new("http://localhost:3333/", None, None).unwrap();
        assert_eq!(backend.url("/chat"), "http://localhost:3333/chat");
        assert_eq!(backend.url("message/1"), "http://localhost:3333/message/1");
    }

    #[tokio::test]
    async fn authenticated_call_without_token_fails_before_sending() {
        let backend = HttpBackend::new("http://127.0.0.1:9", None, Some(1)).unwrap();
        let err = backend.get("/chat", true).await.unwrap_err();
        assert!(matches!(err, BackendError::MissingToken(path) if path == "/chat"));
    }
}
