use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// A simple structure to represent an HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: String, // "GET" or "POST"
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Adds an `Authorization: Bearer` header.
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }
}

/// A simple structure for the HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Trait for executing HTTP requests in a runtime-agnostic way
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Executes a given HTTP request and returns the response.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header() {
        let request = HttpRequest::get("https://api.example.org/api/config/ice").with_bearer("t0k");
        assert_eq!(request.method, "GET");
        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer t0k")
        );
    }

    #[test]
    fn test_success_range() {
        let ok = HttpResponse {
            status_code: 204,
            body: Vec::new(),
        };
        let denied = HttpResponse {
            status_code: 401,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!denied.is_success());
    }
}
