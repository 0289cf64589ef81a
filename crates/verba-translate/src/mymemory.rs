use serde::Deserialize;

use crate::engine::{http_client, with_connect_retry, ProxyConfig, TranslateEngine};
use verba_foundation::error::TranslateError;

const ENDPOINT: &str = "https://api.mymemory.translated.net/get";

#[derive(Deserialize)]
struct MyMemoryResponse {
    #[serde(rename = "responseData")]
    response_data: Option<ResponseData>,
    #[serde(rename = "responseStatus")]
    response_status: serde_json::Value,
}

#[derive(Deserialize)]
struct ResponseData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

/// MyMemory translation memory. Requires explicit source and target codes.
pub struct MyMemoryTranslate {
    client: reqwest::blocking::Client,
}

impl MyMemoryTranslate {
    pub fn new(proxies: &ProxyConfig) -> Result<Self, TranslateError> {
        Ok(Self {
            client: http_client(proxies)?,
        })
    }

    fn translate_one(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        let langpair = format!("{}|{}", source, target);
        let response = with_connect_retry(|| {
            self.client
                .get(ENDPOINT)
                .query(&[("q", text), ("langpair", &langpair)])
                .send()
        })?;

        let body: MyMemoryResponse = response
            .json()
            .map_err(|e| TranslateError::Engine(format!("mymemory response parse: {}", e)))?;

        // responseStatus is a number on success, a string message otherwise
        let ok = body.response_status.as_u64() == Some(200)
            || body.response_status.as_str() == Some("200");
        if !ok {
            return Err(TranslateError::Engine(format!(
                "mymemory status {}",
                body.response_status
            )));
        }

        body.response_data
            .and_then(|d| d.translated_text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TranslateError::Engine("mymemory returned no translation".into()))
    }
}

impl TranslateEngine for MyMemoryTranslate {
    fn name(&self) -> &'static str {
        "mymemory"
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
