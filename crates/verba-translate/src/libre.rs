use serde::{Deserialize, Serialize};

use crate::engine::{http_client, with_connect_retry, ProxyConfig, TranslateEngine};
use verba_foundation::error::TranslateError;

#[derive(Serialize)]
struct LibreRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct LibreResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
    error: Option<String>,
}

/// A LibreTranslate instance, self-hosted or public.
pub struct LibreTranslate {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl LibreTranslate {
    /// `base_url` is scheme://host[:port], without the /translate path.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        proxies: &ProxyConfig,
    ) -> Result<Self, TranslateError> {
        Ok(Self {
            client: http_client(proxies)?,
            endpoint: format!("{}/translate", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    fn translate_one(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        let request = LibreRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        let response =
            with_connect_retry(|| self.client.post(&self.endpoint).json(&request).send())?;

        let status = response.status();
        let body: LibreResponse = response
            .json()
            .map_err(|e| TranslateError::Engine(format!("libre response parse: {}", e)))?;

        if let Some(error) = body.error {
            return Err(TranslateError::Engine(format!("libre: {}", error)));
        }
        body.translated_text.ok_or_else(|| {
            TranslateError::Engine(format!("libre returned HTTP {} with no translation", status))
        })
    }
}

impl TranslateEngine for LibreTranslate {
    fn name(&self) -> &'static str {
        "libre"
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
