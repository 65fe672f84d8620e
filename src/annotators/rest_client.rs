use derive_builder::Builder;
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::annotators::AnnotationOptions;
use crate::annotators::remote_service::{AnnotationResult, RemoteAnnotationClient, RemoteError};
use crate::data_types::variants::Variant;

/// Connection settings for an annotation web service
#[derive(Builder, Clone, Debug)]
#[builder(default)]
pub struct RestClientConfig {
    /// Base URL of the service host, e.g. `https://ws.example.org/cellbase`
    host: String,
    /// API version path segment
    version: String,
    /// Species path segment
    species: String,
    /// Genome assembly, sent only when set
    assembly: Option<String>,
    /// Per-request timeout
    timeout: Duration
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            version: "v5".to_string(),
            species: "hsapiens".to_string(),
            assembly: None,
            timeout: Duration::from_secs(60)
        }
    }
}

/// Envelope of a service reply; older deployments use the singular field names
#[derive(Debug, Default, Deserialize)]
struct ServiceResponse {
    #[serde(default, alias = "response")]
    responses: Vec<AnnotationResult>,
    #[serde(default)]
    error: Option<String>
}

/// Blocking HTTP client that posts a batch of variant ids and reads back one result per id
pub struct RestAnnotationClient {
    client: Client,
    endpoint: String,
    assembly: Option<String>
}

impl RestAnnotationClient {
    /// # Errors
    /// * if the host is empty
    /// * if the underlying HTTP client cannot be built
    pub fn new(config: &RestClientConfig) -> Result<Self, RemoteError> {
        let host = config.host.trim_end_matches('/');
        if host.is_empty() {
            return Err(RemoteError::Transport("no service host configured".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{host}/webservices/rest/{}/{}/genomic/variant/annotation", config.version, config.species),
            assembly: config.assembly.clone()
        })
    }

    fn request_url(&self, options: &AnnotationOptions) -> String {
        let mut url = format!("{}?ignorePhase={}", self.endpoint, options.ignore_phase);
        if let Some(assembly) = self.assembly.as_deref() {
            url.push_str("&assembly=");
            url.push_str(assembly);
        }
        url
    }
}

/// Parses a service reply body into per-variant results
fn decode_response(body: &str) -> Result<Vec<AnnotationResult>, RemoteError> {
    let response: ServiceResponse = serde_json::from_str(body)?;
    match response.error {
        Some(message) if !message.is_empty() => Err(RemoteError::Service(message)),
        _ => Ok(response.responses)
    }
}

impl RemoteAnnotationClient for RestAnnotationClient {
    fn annotate_batch(&self, variants: &[Variant], options: &AnnotationOptions) -> Result<Vec<AnnotationResult>, RemoteError> {
        if variants.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<String> = variants.iter().map(|v| v.canonical_key()).collect();
        let url = self.request_url(options);
        debug!("POST {} variant ids to {url}", ids.len());

        let response = self.client.post(&url)
            .header("Content-Type", "text/plain")
            .body(ids.join(","))
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response.text()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(RemoteError::Service(format!("HTTP {status}: {body}")));
        }
        decode_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> RestClientConfig {
        RestClientConfigBuilder::default()
            .host(host.to_string())
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_url() {
        let client = RestAnnotationClient::new(&config("http://localhost:9090/cellbase/")).unwrap();
        assert_eq!(
            client.request_url(&AnnotationOptions::default()),
            "http://localhost:9090/cellbase/webservices/rest/v5/hsapiens/genomic/variant/annotation?ignorePhase=false"
        );

        let mut with_assembly = config("http://localhost:9090");
        with_assembly.assembly = Some("GRCh38".to_string());
        let client = RestAnnotationClient::new(&with_assembly).unwrap();
        assert!(client.request_url(&AnnotationOptions { ignore_phase: true })
            .ends_with("annotation?ignorePhase=true&assembly=GRCh38"));
    }

    #[test]
    fn test_empty_host() {
        assert!(matches!(RestAnnotationClient::new(&config("")), Err(RemoteError::Transport(_))));
    }

    #[test]
    fn test_decode_response() {
        let body = r#"{"responses":[
            {"id":"1:100:A:C","results":[{"displayConsequenceType":"missense_variant"}]},
            {"id":"1:200:G:T","results":[]}
        ]}"#;
        let results = decode_response(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].results[0].display_consequence_type.as_deref(), Some("missense_variant"));
        assert!(results[1].results.is_empty());

        // singular field names
        let results = decode_response(r#"{"response":[{"id":"1:100:A:C","result":[{}]}]}"#).unwrap();
        assert_eq!(results[0].results.len(), 1);

        assert!(matches!(decode_response(r#"{"error":"species not found"}"#), Err(RemoteError::Service(_))));
        assert!(matches!(decode_response("<html>"), Err(RemoteError::Decode(_))));
    }

    #[test]
    fn test_unreachable_service() {
        // nothing listens on port 1
        let client = RestAnnotationClient::new(&config("http://127.0.0.1:1")).unwrap();
        let variants = vec![Variant::new("1".to_string(), 100, "A".to_string(), "C".to_string()).unwrap()];
        assert!(client.annotate_batch(&variants, &AnnotationOptions::default()).is_err());
        assert!(client.annotate_batch(&[], &AnnotationOptions::default()).unwrap().is_empty());
    }
}
