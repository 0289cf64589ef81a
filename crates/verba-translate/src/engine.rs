use std::time::Duration;

use verba_foundation::error::TranslateError;

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(7);

/// Optional HTTP proxy configuration shared by all engines.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
}

/// An external translation backend. Implementations block on HTTP and are
/// driven from a blocking task.
pub trait TranslateEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Translate each text independently, preserving order. Engines must
    /// return exactly one output per input or an error.
    fn translate_batch(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, TranslateError>;
}

pub(crate) fn http_client(proxies: &ProxyConfig) -> Result<reqwest::blocking::Client, TranslateError> {
    let mut builder = reqwest::blocking::Client::builder().timeout(HTTP_TIMEOUT);
    if let Some(url) = &proxies.http {
        builder = builder.proxy(
            reqwest::Proxy::http(url).map_err(|e| TranslateError::Network(e.to_string()))?,
        );
    }
    if let Some(url) = &proxies.https {
        builder = builder.proxy(
            reqwest::Proxy::https(url).map_err(|e| TranslateError::Network(e.to_string()))?,
        );
    }
    builder
        .build()
        .map_err(|e| TranslateError::Network(e.to_string()))
}

/// Run a request, retrying once when the connection itself fails. HTTP
/// errors and engine errors are not retried.
pub(crate) fn with_connect_retry<T>(
    mut call: impl FnMut() -> Result<T, reqwest::Error>,
) -> Result<T, TranslateError> {
    match call() {
        Ok(v) => Ok(v),
        Err(first) if first.is_connect() || first.is_timeout() => {
            tracing::warn!("Translator connection failed ({}); retrying once", first);
            call().map_err(|e| TranslateError::Network(e.to_string()))
        }
        Err(e) => Err(TranslateError::Network(e.to_string())),
    }
}
