//! HTTP transport seam.
//!
//! The client builds fully-formed [`HttpRequest`]s and interprets the
//! [`HttpResponse`]s it gets back; the transport only moves bytes. This
//! keeps the refresh and error logic testable without a network.

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use reqwest::{Client, header::CONTENT_TYPE};
use thiserror::Error;

use crate::{method::Method, tokens::AccessToken};

/// An outgoing request, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name and value pairs.
    pub headers: Vec<(&'static str, String)>,
    /// Serialized body, if any.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Build a JSON API request.
    ///
    /// `Content-Type` is only set when a body is attached, and bodies are
    /// dropped for methods that do not carry one. `Authorization` is only set
    /// when a token is given.
    #[must_use]
    pub fn json(
        method: Method,
        url: String,
        body: Option<Vec<u8>>,
        bearer: Option<&AccessToken>,
    ) -> Self {
        let body = body.filter(|_| method.carries_body());

        let mut headers = vec![("Accept", "application/json".to_string())];

        if body.is_some() {
            headers.push(("Content-Type", "application/json".to_string()));
        }

        if let Some(token) = bearer {
            headers.push(("Authorization", format!("Bearer {}", token.expose())));
        }

        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// Look up a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A received response with its body fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase for the status.
    pub status_text: String,
    /// `Content-Type` header value.
    pub content_type: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Whether the response declares a JSON body (`application/json` or a
    /// `+json` suffix type).
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type.as_deref().is_some_and(|value| {
            let essence = value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();

            essence == "application/json" || essence.ends_with("+json")
        })
    }
}

/// Failure before any response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    /// Build an error from the underlying failure message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Moves an [`HttpRequest`] to the backend and back.
#[automock]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and read the whole response body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Build a transport, optionally bounding every request by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be initialised.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder();

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.http.request(request.method.into(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);

        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body,
        })
    }
}
