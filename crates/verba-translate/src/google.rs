use serde_json::Value;

use crate::engine::{http_client, with_connect_retry, ProxyConfig, TranslateEngine};
use verba_foundation::error::TranslateError;

const ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Google Translate via the public gtx endpoint.
pub struct GoogleTranslate {
    client: reqwest::blocking::Client,
}

impl GoogleTranslate {
    pub fn new(proxies: &ProxyConfig) -> Result<Self, TranslateError> {
        Ok(Self {
            client: http_client(proxies)?,
        })
    }

    fn translate_one(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        let response = with_connect_retry(|| {
            self.client
                .get(ENDPOINT)
                .query(&[
                    ("client", "gtx"),
                    ("sl", source),
                    ("tl", target),
                    ("dt", "t"),
                    ("q", text),
                ])
                .send()
        })?;

        if !response.status().is_success() {
            return Err(TranslateError::Engine(format!(
                "google returned HTTP {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .map_err(|e| TranslateError::Engine(format!("google response parse: {}", e)))?;

        // Body shape: [[[translated, original, ...], ...], ...]
        let pieces = body
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| TranslateError::Engine("google response missing body".into()))?;
        let mut out = String::new();
        for piece in pieces {
            if let Some(part) = piece.get(0).and_then(Value::as_str) {
                out.push_str(part);
            }
        }
        if out.is_empty() {
            return Err(TranslateError::Engine("google returned empty translation".into()));
        }
        Ok(out)
    }
}

impl TranslateEngine for GoogleTranslate {
    fn name(&self) -> &'static str {
        "google"
    }

    fn translate_batch(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, TranslateError> {
        texts
            .iter()
            .map(|t| self.translate_one(t, source, target))
            .collect()
    }
}
