//! Upstream product source.
//!
//! The pipeline only sees the [`Fetcher`] trait: give it a product code,
//! get back the raw JSON document, `None` when the product does not exist
//! upstream, or an error. [`OffClient`] implements it against the Open Food
//! Facts v2 API; tests plug in their own implementations.
//!
//! # Not found
//!
//! Open Food Facts signals a missing product in several ways, all mapped to
//! `Ok(None)`:
//!
//! - HTTP 404;
//! - `"status": 0` with `"status_verbose": "product not found"`;
//! - a response without a (non-empty) `product` object.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::{EtlError, Result};

/// Fields requested from the API. Exactly the fields the transformer reads.
pub const REQUEST_FIELDS: &str = "code,product_name,nutriscore_grade,ecoscore_grade,nova_group,brands,\
categories_hierarchy,carbohydrates_100g,energy-kcal_100g,fat_100g,\
proteins_100g,saturated-fat_100g,sodium_100g,sugars_100g,\
ingredients,additives_tags,allergens_tags";

/// A source of raw product documents.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw document for `code`.
    ///
    /// Returns `Ok(None)` when the upstream has no such product.
    async fn fetch(&self, code: &str) -> Result<Option<Value>>;
}

/// HTTP client for the Open Food Facts product endpoint.
pub struct OffClient {
    http: reqwest::Client,
    base_url: Url,
}

impl OffClient {
    /// Build a client for `api.base_url` with the configured user agent and
    /// request timeout.
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(api.user_agent.clone())
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(|e| EtlError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(api.base_url.trim()).map_err(|e| {
            EtlError::Configuration(format!("invalid api.base_url {:?}: {}", api.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(EtlError::Configuration(format!(
                "api.base_url {:?} cannot be used as a base URL",
                api.base_url
            )));
        }

        Ok(Self { http, base_url })
    }

    /// `{base_url}/product/{code}.json`, with the code percent-encoded as a
    /// single path segment.
    pub fn product_url(&self, code: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("product")
                .push(&format!("{}.json", code));
        }
        url
    }
}

#[async_trait]
impl Fetcher for OffClient {
    async fn fetch(&self, code: &str) -> Result<Option<Value>> {
        let url = self.product_url(code);
        info!(code, url = %url, "fetching product");

        let response = self
            .http
            .get(url.clone())
            .query(&[("fields", REQUEST_FIELDS)])
            .send()
            .await
            .map_err(|source| EtlError::Fetch {
                code: code.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!(code, "product not found upstream (HTTP 404)");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                code,
                status = status.as_u16(),
                body = %body.chars().take(200).collect::<String>(),
                "upstream returned an error status"
            );
            return Err(EtlError::UpstreamStatus {
                code: code.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|source| EtlError::Fetch {
            code: code.to_string(),
            source,
        })?;

        Ok(product_document(code, body))
    }
}

/// Apply the not-found rules to a decoded response body.
pub fn product_document(code: &str, body: Value) -> Option<Value> {
    let status = body.get("status").and_then(Value::as_i64);
    let verbose = body
        .get("status_verbose")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if status == Some(0) && verbose.contains("product not found") {
        warn!(code, status_verbose = verbose, "product not found upstream");
        return None;
    }

    let has_product = body
        .get("product")
        .and_then(Value::as_object)
        .is_some_and(|p| !p.is_empty());
    if !has_product {
        warn!(code, "response has no product object");
        return None;
    }

    debug!(code, "product document received");
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_zero_not_found_is_none() {
        let body = json!({ "status": 0, "status_verbose": "product not found", "code": "000" });
        assert!(product_document("000", body).is_none());
    }

    #[test]
    fn missing_or_empty_product_is_none() {
        assert!(product_document("1", json!({ "status": 1 })).is_none());
        assert!(product_document("1", json!({ "status": 1, "product": {} })).is_none());
        assert!(product_document("1", json!({ "status": 1, "product": null })).is_none());
    }

    #[test]
    fn found_product_is_passed_through() {
        let body = json!({ "status": 1, "product": { "code": "1" } });
        assert_eq!(product_document("1", body.clone()), Some(body));
    }

    #[test]
    fn product_url_honours_base_url() {
        let api = ApiConfig {
            base_url: "http://127.0.0.1:9999/api/v2/".to_string(),
            user_agent: "food-etl-test".to_string(),
            timeout_secs: 5,
        };
        let client = OffClient::new(&api).unwrap();
        assert_eq!(
            client.product_url("3017620422003").as_str(),
            "http://127.0.0.1:9999/api/v2/product/3017620422003.json"
        );
    }

    #[test]
    fn product_url_keeps_code_in_one_segment() {
        let api = ApiConfig {
            base_url: "http://127.0.0.1:9999/api/v2".to_string(),
            user_agent: "food-etl-test".to_string(),
            timeout_secs: 5,
        };
        let client = OffClient::new(&api).unwrap();
        let url = client.product_url("30/17?x#y");
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9999/api/v2/product/30%2F17%3Fx%23y.json"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn unparseable_base_url_is_a_configuration_error() {
        let api = ApiConfig {
            base_url: "not a url".to_string(),
            user_agent: "food-etl-test".to_string(),
            timeout_secs: 5,
        };
        assert!(matches!(
            OffClient::new(&api),
            Err(EtlError::Configuration(_))
        ));
    }
}
