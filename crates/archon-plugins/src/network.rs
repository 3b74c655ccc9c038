//! The policy wrapper around the outbound HTTP executor that backs the
//! `net` permission's `net_request` call.

use std::collections::HashMap;
use std::time::Duration;

use archon_core::sanitize::{header_is_redacted, REDACTED};
use archon_core::{codes, ArchonError};
use serde::{Deserialize, Serialize};

const DEFAULT_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD"];
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Vec<u8>>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Per-project configuration for the network proxy. `None` for a field
/// falls back to the default documented on the field itself.
#[derive(Debug, Clone, Default)]
pub struct NetworkProxyPolicy {
    pub allowed_methods: Option<Vec<String>>,
    pub allowed_host_suffixes: Vec<String>,
    pub denied_host_suffixes: Vec<String>,
    pub redact_response_headers: Vec<String>,
}

impl NetworkProxyPolicy {
    fn method_allowed(&self, method: &str) -> bool {
        let methods = self.allowed_methods.as_deref().unwrap_or(DEFAULT_METHODS);
        methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Deny precedes allow; an empty allow-list means allow-all (minus deny).
    fn host_allowed(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.denied_host_suffixes.iter().any(|suffix| host.ends_with(&suffix.to_ascii_lowercase())) {
            return false;
        }
        if self.allowed_host_suffixes.is_empty() {
            return true;
        }
        self.allowed_host_suffixes.iter().any(|suffix| host.ends_with(&suffix.to_ascii_lowercase()))
    }

    pub fn execute(&self, request: NetworkRequest) -> Result<NetworkResponse, ArchonError> {
        if !self.method_allowed(&request.method) {
            return Err(ArchonError::new(codes::POLICY_METHOD, format!("method {} is not allowed", request.method)));
        }

        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| ArchonError::new(codes::POLICY_HOST, format!("invalid url: {e}")))?;
        let host = url.host_str().ok_or_else(|| ArchonError::new(codes::POLICY_HOST, "url has no host"))?;
        if !self.host_allowed(host) {
            return Err(ArchonError::new(codes::POLICY_HOST, format!("host {host} is not allowed by policy")));
        }

        let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArchonError::new(codes::IO_WRITE_FAILED, format!("failed to build http client: {e}")))?;

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ArchonError::new(codes::POLICY_METHOD, format!("invalid http method: {e}")))?;
        let mut builder = client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .map_err(|e| ArchonError::new(codes::IO_WRITE_FAILED, format!("http request failed: {e}")))?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            let name = name.as_str().to_string();
            let value = if header_is_redacted(&name, &self.redact_response_headers) {
                REDACTED.to_string()
            } else {
                value.to_str().unwrap_or_default().to_string()
            };
            headers.insert(name, value);
        }
        let body = response
            .bytes()
            .map_err(|e| ArchonError::new(codes::IO_READ_FAILED, format!("failed to read http response: {e}")))?
            .to_vec();

        Ok(NetworkResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_precedes_allow() {
        let policy = NetworkProxyPolicy {
            allowed_host_suffixes: vec!["example.com".to_string()],
            denied_host_suffixes: vec!["blocked.example.com".to_string()],
            ..Default::default()
        };
        assert!(policy.host_allowed("api.example.com"));
        assert!(!policy.host_allowed("blocked.example.com"));
    }

    #[test]
    fn empty_allow_list_means_allow_all_minus_deny() {
        let policy = NetworkProxyPolicy {
            denied_host_suffixes: vec!["evil.example".to_string()],
            ..Default::default()
        };
        assert!(policy.host_allowed("anything.test"));
        assert!(!policy.host_allowed("sub.evil.example"));
    }

    #[test]
    fn unlisted_method_is_rejected_by_default() {
        let policy = NetworkProxyPolicy::default();
        assert!(policy.method_allowed("GET"));
        assert!(!policy.method_allowed("TRACE"));
    }
}
