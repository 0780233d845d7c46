//! Blocking `ureq` client behind the async [`HttpClient`] trait.

use anyhow::{Result, anyhow};
use async_trait::async_trait;

pub use peercore::net::{HttpClient, HttpRequest, HttpResponse};

/// Runs each request on the blocking pool via `spawn_blocking`.
#[derive(Debug, Clone, Default)]
pub struct UreqHttpClient;

impl UreqHttpClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HttpClient for UreqHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        tokio::task::spawn_blocking(move || execute_blocking(request)).await?
    }
}

fn execute_blocking(request: HttpRequest) -> Result<HttpResponse> {
    let result = match request.method.as_str() {
        "GET" => request
            .headers
            .iter()
            .fold(ureq::get(&request.url), |req, (key, value)| {
                req.header(key, value)
            })
            .call(),
        "POST" => request
            .headers
            .iter()
            .fold(ureq::post(&request.url), |req, (key, value)| {
                req.header(key, value)
            })
            .send(request.body.as_deref().unwrap_or_default()),
        method => return Err(anyhow!("Unsupported HTTP method: {}", method)),
    };

    match result {
        Ok(response) => {
            let status_code = response.status().as_u16();
            let body = response.into_body().read_to_vec()?;
            Ok(HttpResponse { status_code, body })
        }
        // ureq reports non-2xx statuses as errors; hand them back as
        // responses so callers see the status.
        Err(ureq::Error::StatusCode(status_code)) => Ok(HttpResponse {
            status_code,
            body: Vec::new(),
        }),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_method_fails_before_sending() {
        let request = HttpRequest {
            method: "PUT".to_string(),
            ..HttpRequest::get("http://127.0.0.1:9/api/config/ice")
        };
        let err = UreqHttpClient::new().execute(request).await.unwrap_err();
        assert!(err.to_string().contains("PUT"));
    }
}
