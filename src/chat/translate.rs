use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// The external translation capability could not produce a result.
#[derive(Debug, Error)]
#[error("translation unavailable: {0}")]
pub struct TranslationUnavailable(pub String);

/// External text translation between base language tags.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslationUnavailable>;
}

/// Bounds every call to a [`Translator`] by a timeout.
///
/// Callers compare languages before calling; a timeout is reported the same
/// way as a backend failure.
#[derive(Clone)]
pub struct TranslationGateway {
    inner: Arc<dyn Translator>,
    timeout: Duration,
}

impl TranslationGateway {
    pub fn new(inner: Arc<dyn Translator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslationUnavailable> {
        match tokio::time::timeout(self.timeout, self.inner.translate(text, from, to)).await {
            Ok(result) => result,
            Err(_) => Err(TranslationUnavailable(format!(
                "{from}->{to} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

/// Client for the MyMemory public translation API.
pub struct MyMemoryTranslator {
    http: reqwest::Client,
    base_url: String,
    email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryResponse {
    response_status: Value,
    response_data: Option<MyMemoryData>,
    response_details: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryData {
    translated_text: Option<String>,
}

impl MyMemoryTranslator {
    pub fn new(base_url: impl Into<String>, email: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            email,
        }
    }
}

/// MyMemory reports `responseStatus` as either a number or a numeric string.
fn parse_response(body: MyMemoryResponse) -> Result<String, TranslationUnavailable> {
    let status = match &body.response_status {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    if status != Some(200) {
        return Err(TranslationUnavailable(format!(
            "status {}: {}",
            body.response_status,
            body.response_details.unwrap_or_default()
        )));
    }

    body.response_data
        .and_then(|data| data.translated_text)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| TranslationUnavailable("response without translatedText".to_owned()))
}

#[async_trait]
impl Translator for MyMemoryTranslator {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslationUnavailable> {
        let langpair = format!("{from}|{to}");
        let mut query = vec![("q", text), ("langpair", langpair.as_str())];
        if let Some(email) = &self.email {
            query.push(("de", email.as_str()));
        }

        let body: MyMemoryResponse = self.http
            .get(format!("{}/get", self.base_url))
            .query(&query)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| TranslationUnavailable(err.to_string()))?
            .json()
            .await
            .map_err(|err| TranslationUnavailable(err.to_string()))?;

        parse_response(body)
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::*;
    use super::*;

    fn response(value: Value) -> MyMemoryResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_successful_response() {
        let body = response(json!({
            "responseStatus": 200,
            "responseData": { "translatedText": "Olá" }
        }));
        assert_eq!(parse_response(body).unwrap(), "Olá");
    }

    #[test]
    fn string_status_is_accepted() {
        let body = response(json!({
            "responseStatus": "200",
            "responseData": { "translatedText": "Hola" }
        }));
        assert_eq!(parse_response(body).unwrap(), "Hola");
    }

    #[test]
    fn quota_status_is_unavailable() {
        let body = response(json!({
            "responseStatus": 429,
            "responseDetails": "MYMEMORY WARNING: YOU USED ALL AVAILABLE FREE TRANSLATIONS FOR TODAY",
            "responseData": { "translatedText": "MYMEMORY WARNING" }
        }));
        let err = parse_response(body).unwrap_err();
        assert!(err.0.contains("429"));
    }

    #[test]
    fn missing_text_is_unavailable() {
        let body = response(json!({ "responseStatus": 200, "responseData": {} }));
        assert!(parse_response(body).is_err());
    }

    #[tokio::test]
    async fn gateway_passes_through_results() {
        let gateway = TranslationGateway::new(Arc::new(FixedTranslator::default()), Duration::from_secs(1));
        assert_eq!(gateway.translate("Hello", "en", "pt").await.unwrap(), "[pt] Hello");
        assert!(
            TranslationGateway::new(Arc::new(FailingTranslator), Duration::from_secs(1))
                .translate("Hello", "en", "pt")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn gateway_times_out_slow_backends() {
        let gateway = TranslationGateway::new(
            Arc::new(SlowTranslator(Duration::from_secs(5))),
            Duration::from_millis(20),
        );
        let err = gateway.translate("Hello", "en", "pt").await.unwrap_err();
        assert!(err.0.contains("timed out"));
    }
}
