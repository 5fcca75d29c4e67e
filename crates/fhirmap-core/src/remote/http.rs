//! Paginated search against a FHIR-style REST server

use super::error::FetchError;
use super::retry::execute_with_retry;
use super::{Page, RemoteRecordSource};
use crate::config::RemoteSourceConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub(crate) const FHIR_JSON: &str = "application/fhir+json";

/// Record source backed by search bundles over HTTP
#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    client: Client,
    config: RemoteSourceConfig,
}

impl HttpRecordSource {
    pub fn new(config: RemoteSourceConfig) -> Result<Self> {
        Url::parse(&config.base_url)
            .map_err(|e| Error::invalid_input(format!("Invalid server URL '{}': {e}", config.base_url)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Http {
                message: format!("Failed to create HTTP client: {e}"),
                source: Some(e),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteSourceConfig {
        &self.config
    }

    async fn get_json(&self, url: &str) -> std::result::Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, FHIR_JSON)
            .send()
            .await
            .map_err(FetchError::from_request_error)?;

        if !response.status().is_success() {
            return Err(FetchError::from_response(response).await);
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::malformed(format!("Response body is not JSON: {e}")))
    }
}

#[async_trait]
impl RemoteRecordSource for HttpRecordSource {
    fn first_page_url(&self, query: &str) -> Result<String> {
        search_url(&self.config.base_url, query, self.config.page_size)
    }

    async fn fetch_page(&self, url: &str) -> Result<Page> {
        let body = execute_with_retry(|| self.get_json(url), self.config.retry_policy.clone()).await?;
        parse_bundle(body)
    }
}

/// `{base}/{query}` with `_count` added unless the query names one
pub fn search_url(base_url: &str, query: &str, page_size: usize) -> Result<String> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        query.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).map_err(|e| Error::invalid_input(format!("Invalid search URL '{joined}': {e}")))?;

    let has_count = url.query_pairs().any(|(key, _)| key == "_count");
    if !has_count && page_size > 0 {
        url.query_pairs_mut().append_pair("_count", &page_size.to_string());
    }
    Ok(url.into())
}

/// Split a search bundle into its resources and the next-page link
///
/// A bare resource is treated as a one-item page.
pub fn parse_bundle(body: Value) -> Result<Page> {
    match body.get("resourceType").and_then(Value::as_str) {
        Some("Bundle") => {}
        Some(_) => {
            return Ok(Page {
                resources: vec![body],
                next: None,
            })
        }
        None => return Err(Error::remote("Response is not a resource", None, Some(body.to_string()))),
    }

    let next = body
        .get("link")
        .and_then(Value::as_array)
        .and_then(|links| {
            links
                .iter()
                .find(|link| link.get("relation").and_then(Value::as_str) == Some("next"))
        })
        .and_then(|link| link.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let resources = body
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("resource").cloned())
                .collect()
        })
        .unwrap_or_default();

    Ok(Page { resources, next })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_url_adds_count() {
        let url = search_url("https://fhir.example.org/fhir/", "/Patient?gender=female", 50).unwrap();
        assert_eq!(url, "https://fhir.example.org/fhir/Patient?gender=female&_count=50");

        let url = search_url("https://fhir.example.org/fhir", "Patient?_count=5", 50).unwrap();
        assert_eq!(url, "https://fhir.example.org/fhir/Patient?_count=5");

        assert!(search_url("not a url", "Patient", 10).is_err());
    }

    #[test]
    fn test_parse_bundle() {
        let page = parse_bundle(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "link": [
                {"relation": "self", "url": "https://s/Patient"},
                {"relation": "next", "url": "https://s/Patient?page=2"}
            ],
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "1"}},
                {"fullUrl": "https://s/Patient/2"},
                {"resource": {"resourceType": "Patient", "id": "3"}}
            ]
        }))
        .unwrap();

        assert_eq!(page.resources.len(), 2);
        assert_eq!(page.next.as_deref(), Some("https://s/Patient?page=2"));
    }

    #[test]
    fn test_parse_last_and_empty_pages() {
        let page = parse_bundle(json!({"resourceType": "Bundle", "total": 0})).unwrap();
        assert!(page.resources.is_empty());
        assert!(page.next.is_none());

        let page = parse_bundle(json!({"resourceType": "Patient", "id": "1"})).unwrap();
        assert_eq!(page.resources.len(), 1);

        assert!(parse_bundle(json!({"oops": true})).is_err());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(HttpRecordSource::new(RemoteSourceConfig::new("::nope")).is_err());
    }
}
