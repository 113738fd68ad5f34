//! HTTP layout model client.
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::model::{LayoutModelClient, LayoutModelType};
use crate::core::payload;
use crate::types::{DocumentDescriptor, PageMetrics};
use crate::{Result, RouterError};

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    object_key: &'a str,
    bucket: Option<&'a str>,
    mime_type: &'a str,
    page_count: Option<u64>,
    metadata: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_type: Option<LayoutModelType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<String>,
}

/// Posts documents to a layout inference endpoint.
///
/// Request body:
///
/// ```json
/// {"object_key": "...", "bucket": "...", "mime_type": "...", "page_count": 3,
///  "metadata": {...}, "model_type": "layoutlm_v3", "document": "<base64>"}
/// ```
///
/// The response is `{"pages": [...]}` with page objects in the same camelCase
/// or snake_case shape accepted from payload metadata.
pub struct HttpLayoutModelClient {
    endpoint: String,
    api_key: Option<String>,
    model_type: Option<LayoutModelType>,
    client: reqwest::blocking::Client,
}

impl HttpLayoutModelClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(RouterError::configuration("Layout model endpoint cannot be empty"));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::configuration_with_source("Failed to create layout model HTTP client", e))?;

        Ok(Self {
            endpoint,
            api_key: None,
            model_type: None,
            client,
        })
    }

    /// Sent as a bearer token when present.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    pub fn with_model_type(mut self, model_type: Option<LayoutModelType>) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl LayoutModelClient for HttpLayoutModelClient {
    fn name(&self) -> &str {
        "http"
    }

    fn infer(&self, descriptor: &DocumentDescriptor, content: Option<&[u8]>) -> Result<Option<Vec<PageMetrics>>> {
        let body = InferenceRequest {
            object_key: &descriptor.object_key,
            bucket: descriptor.bucket.as_deref(),
            mime_type: &descriptor.mime_type,
            page_count: payload::infer_page_count(&descriptor.payload),
            metadata: descriptor.payload.get("documentMetadata"),
            model_type: self.model_type,
            document: content.filter(|data| !data.is_empty()).map(|data| STANDARD.encode(data)),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(RouterError::transport(format!(
                "Layout model endpoint returned status: {}",
                status
            )));
        }

        let response: Value = response
            .json()
            .map_err(|e| RouterError::parsing_with_source("Failed to decode layout model response", e))?;

        let pages = response
            .get("pages")
            .and_then(Value::as_array)
            .map(|pages| {
                pages
                    .iter()
                    .enumerate()
                    .map(|(position, page)| payload::page_metrics_from_value(position as u32, page))
                    .collect::<Vec<_>>()
            });
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(matches!(
            HttpLayoutModelClient::new("  ", Duration::from_secs(1)),
            Err(RouterError::Configuration { .. })
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let payload = json!({"documentMetadata": {"pageCount": 3, "contentType": "application/pdf"}});
        let metadata = payload.get("documentMetadata");
        let body = InferenceRequest {
            object_key: "inbound/a.pdf",
            bucket: Some("intake"),
            mime_type: "application/pdf",
            page_count: payload::infer_page_count(&payload),
            metadata,
            model_type: Some(LayoutModelType::LayoutlmV3),
            document: None,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["page_count"], json!(3));
        assert_eq!(value["model_type"], json!("layoutlm_v3"));
        assert_eq!(value["metadata"]["contentType"], json!("application/pdf"));
        assert!(value.get("document").is_none());
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_error() {
        let client = HttpLayoutModelClient::new("http://127.0.0.1:9/infer", Duration::from_millis(500))
            .unwrap()
            .with_api_key(Some("secret".to_string()));
        let descriptor = DocumentDescriptor {
            object_key: "inbound/a.pdf".to_string(),
            bucket: None,
            payload: json!({}),
            mime_type: "application/pdf".to_string(),
            request_override: None,
        };

        let err = client.infer(&descriptor, Some(b"%PDF-1.7")).unwrap_err();
        assert!(err.is_transient());
    }
}
