//! HTTP client for remote bibliography providers

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed: {message}")]
    RequestFailed { message: String },
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
    #[error("Timeout")]
    Timeout,
    #[error("Rate limited")]
    RateLimited,
    #[error("Unexpected status {status}")]
    Status { status: u16 },
    #[error("Parse error: {message}")]
    ParseError { message: String },
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::RequestFailed {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    /// GET with query parameters and extra request headers.
    ///
    /// Non-2xx statuses other than 429 are returned, not raised, so callers can
    /// handle `304 Not Modified`.
    pub async fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, HttpError> {
        let url =
            reqwest::Url::parse_with_params(url, params).map_err(|_| HttpError::InvalidUrl {
                url: url.to_string(),
            })?;

        let mut request = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        Self::read_response(request).await
    }

    /// POST a JSON body
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, HttpError> {
        let url = reqwest::Url::parse(url).map_err(|_| HttpError::InvalidUrl {
            url: url.to_string(),
        })?;

        let request = self
            .client
            .post(url)
            .header("User-Agent", &self.user_agent)
            .json(body);

        Self::read_response(request).await
    }

    async fn read_response(request: reqwest::RequestBuilder) -> Result<HttpResponse, HttpError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else {
                HttpError::RequestFailed {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(HttpError::RateLimited);
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| HttpError::ParseError {
            message: e.to_string(),
        })?;

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }
}
