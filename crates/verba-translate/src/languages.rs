//! Translator-facing language name normalization.
//!
//! Display names resolve to ISO codes through the shared name-resolution
//! scoring, so a typo like "frnech" still lands on French.

use verba_foundation::error::TranslateError;
use verba_foundation::resolve::resolve_name;

/// Display-name to ISO-639 code pairs common to every engine.
const BASE_LANGUAGES: &[(&str, &str)] = &[
    ("arabic", "ar"),
    ("chinese", "zh-CN"),
    ("czech", "cs"),
    ("danish", "da"),
    ("dutch", "nl"),
    ("english", "en"),
    ("finnish", "fi"),
    ("french", "fr"),
    ("german", "de"),
    ("greek", "el"),
    ("hebrew", "iw"),
    ("hindi", "hi"),
    ("hungarian", "hu"),
    ("indonesian", "id"),
    ("italian", "it"),
    ("japanese", "ja"),
    ("korean", "ko"),
    ("norwegian", "no"),
    ("persian", "fa"),
    ("polish", "pl"),
    ("portuguese", "pt"),
    ("romanian", "ro"),
    ("russian", "ru"),
    ("spanish", "es"),
    ("swedish", "sv"),
    ("thai", "th"),
    ("turkish", "tr"),
    ("ukrainian", "uk"),
    ("vietnamese", "vi"),
];

/// LibreTranslate self-hosts a smaller model set.
const LIBRE_LANGUAGES: &[&str] = &[
    "arabic",
    "chinese",
    "czech",
    "danish",
    "dutch",
    "english",
    "finnish",
    "french",
    "german",
    "greek",
    "hebrew",
    "hindi",
    "hungarian",
    "indonesian",
    "italian",
    "japanese",
    "korean",
    "persian",
    "polish",
    "portuguese",
    "romanian",
    "russian",
    "spanish",
    "swedish",
    "thai",
    "turkish",
    "ukrainian",
];

fn engine_names(engine: &str) -> Vec<&'static str> {
    match engine {
        "libre" => LIBRE_LANGUAGES.to_vec(),
        _ => BASE_LANGUAGES.iter().map(|(name, _)| *name).collect(),
    }
}

fn code_for(name: &str, engine: &str) -> Option<&'static str> {
    let code = BASE_LANGUAGES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| *c)?;
    // Engine-specific overrides for codes that differ from the base table
    match (engine, code) {
        ("libre", "zh-CN") => Some("zh"),
        ("libre", "iw") => Some("he"),
        ("mymemory", "iw") => Some("he"),
        _ => Some(code),
    }
}

/// Resolve a user-facing language name to the engine's wire code.
/// "auto" passes through for engines that support source detection.
pub fn resolve_language(engine: &str, name: &str) -> Result<String, TranslateError> {
    let lowered = name.trim().to_lowercase();
    if lowered == "auto" {
        return match engine {
            "mymemory" => Err(TranslateError::Engine(
                "mymemory requires an explicit source language".into(),
            )),
            _ => Ok("auto".into()),
        };
    }

    let names = engine_names(engine);
    let resolution = resolve_name(&lowered, &names).ok_or_else(|| TranslateError::UnsupportedPair {
        engine: engine.to_string(),
        source_lang: name.to_string(),
        target_lang: String::new(),
    })?;
    if resolution.score < 1.0 {
        tracing::debug!(
            "Language '{}' resolved to '{}' for {} (score {:.2})",
            name,
            names[resolution.index],
            engine,
            resolution.score
        );
    }
    code_for(names[resolution.index], engine)
        .map(str::to_string)
        .ok_or_else(|| TranslateError::UnsupportedPair {
            engine: engine.to_string(),
            source_lang: name.to_string(),
            target_lang: String::new(),
        })
}

/// Resolve and validate a source/target pair for an engine.
pub fn validate_pair(
    engine: &str,
    source: &str,
    target: &str,
) -> Result<(String, String), TranslateError> {
    let source_code = resolve_language(engine, source)?;
    let target_code = resolve_language(engine, target)?;
    if target_code == "auto" {
        return Err(TranslateError::UnsupportedPair {
            engine: engine.to_string(),
            source_lang: source.to_string(),
            target_lang: target.to_string(),
        });
    }
    if source_code == target_code {
        return Err(TranslateError::UnsupportedPair {
            engine: engine.to_string(),
            source_lang: source.to_string(),
            target_lang: target.to_string(),
        });
    }
    Ok((source_code, target_code))
}
