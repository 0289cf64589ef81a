//! External translation engines and result reconciliation.

pub mod engine;
pub mod google;
pub mod languages;
pub mod libre;
pub mod mymemory;
pub mod reconcile;

pub use engine::{ProxyConfig, TranslateEngine, HTTP_TIMEOUT};
pub use google::GoogleTranslate;
pub use languages::{resolve_language, validate_pair};
pub use libre::LibreTranslate;
pub use mymemory::MyMemoryTranslate;
pub use reconcile::{reconcile_segment, translate_result};

use verba_foundation::error::TranslateError;

/// Construct an engine by name. STT-model translation is handled by the
/// dispatcher, not here.
pub fn engine_by_name(
    name: &str,
    libre_url: Option<&str>,
    libre_api_key: Option<String>,
    proxies: &ProxyConfig,
) -> Result<Box<dyn TranslateEngine>, TranslateError> {
    match name {
        "google" => Ok(Box::new(GoogleTranslate::new(proxies)?)),
        "libre" => {
            let url = libre_url.unwrap_or("https://libretranslate.com");
            Ok(Box::new(LibreTranslate::new(url, libre_api_key, proxies)?))
        }
        "mymemory" => Ok(Box::new(MyMemoryTranslate::new(proxies)?)),
        other => Err(TranslateError::Engine(format!(
            "unknown translation engine '{}'",
            other
        ))),
    }
}
