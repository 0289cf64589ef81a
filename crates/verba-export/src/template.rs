//! Output file name templating.

use chrono::{DateTime, Local};

/// Context values substituted into a name template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Source file stem, or a session label for live capture.
    pub file: String,
    pub lang_source: String,
    pub lang_target: String,
    pub transcribe_with: String,
    pub translate_with: String,
    /// Full task descriptor, e.g. "transcribe-translate".
    pub task: String,
    /// Short descriptor, e.g. "tc-tl".
    pub task_short: String,
}

/// Expand `{token}` placeholders and strftime codes. Unknown `{...}`
/// tokens are left untouched; `%` codes follow chrono's strftime.
pub fn expand(template: &str, context: &TemplateContext, now: DateTime<Local>) -> String {
    let with_tokens = template
        .replace("{file}", &context.file)
        .replace("{lang-source}", &context.lang_source)
        .replace("{lang-target}", &context.lang_target)
        .replace("{transcribe-with}", &context.transcribe_with)
        .replace("{translate-with}", &context.translate_with)
        .replace("{task}", &context.task)
        .replace("{task-short}", &context.task_short);

    if with_tokens.contains('%') {
        now.format(&with_tokens).to_string()
    } else {
        with_tokens
    }
}

/// Replace characters that are unsafe in file names.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}
