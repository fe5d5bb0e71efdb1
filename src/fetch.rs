//! Direct request execution, used when no background agent is available.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SyncError;
use crate::sync::{FetchRequest, SyncResponse};

pub fn build_client(timeout_secs: u64) -> Result<Client, SyncError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SyncError::Config(e.to_string()))
}

/// Execute `request` once, without retries.
pub async fn execute(http: &Client, request: &FetchRequest) -> Result<SyncResponse, SyncError> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| SyncError::InvalidArguments(format!("invalid method '{}'", request.method)))?;
    let headers = build_headers(&request.headers)?;

    tracing::debug!("Executing direct {} request to: {}", method, request.url);

    let mut builder = http.request(method, &request.url).headers(headers);
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let response = builder
        .send()
        .await
        .map_err(|e| SyncError::Fetch(e.to_string()))?;

    let status = response.status();
    let url = response.url().to_string();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect::<BTreeMap<_, _>>();
    let body = response
        .bytes()
        .await
        .map_err(|e| SyncError::Fetch(e.to_string()))?;

    if !status.is_success() {
        tracing::warn!("Direct request returned HTTP {}", status.as_u16());
    }

    Ok(SyncResponse {
        url,
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body: body.to_vec(),
    })
}

fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap, SyncError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| SyncError::InvalidArguments(format!("invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| SyncError::InvalidArguments(format!("invalid header value for '{}'", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}
