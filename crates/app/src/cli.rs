//! Command line surface. Argument errors exit with code 2 via clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::batch::BatchMode;
use crate::session::InputKind;

#[derive(Parser, Debug)]
#[command(
    name = "verba",
    version,
    about = "Live speech transcription and translation"
)]
pub struct Cli {
    /// Settings file; defaults to the per-user config directory.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture live audio and transcribe it.
    Record(RecordArgs),
    /// Run file-mode pipelines over media or prior results.
    Import(ImportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// STT model key, e.g. tiny, base, small, medium, large-v3.
    #[arg(long, default_value = "base")]
    pub model: String,

    /// Source language name or code; "auto" detects per utterance.
    #[arg(long, default_value = "auto")]
    pub source: String,

    /// Target language for translation.
    #[arg(long, default_value = "english")]
    pub target: String,

    #[arg(long)]
    pub transcribe: bool,

    #[arg(long)]
    pub translate: bool,

    /// Translation engine: google, libre, mymemory, or an STT model key
    /// for the translate-to-English task.
    #[arg(long)]
    pub engine: Option<String>,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[arg(long, value_enum, default_value_t = InputArg::Mic)]
    pub input: InputArg,

    /// Directory receiving the session transcript; omits the transcript
    /// when unset.
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = ModeArg::FileImport)]
    pub mode: ModeArg,

    /// Language hint for alignment mode.
    #[arg(long)]
    pub language_hint: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputArg {
    Mic,
    Speaker,
}

impl From<InputArg> for InputKind {
    fn from(value: InputArg) -> Self {
        match value {
            InputArg::Mic => InputKind::Mic,
            InputArg::Speaker => InputKind::Speaker,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    FileImport,
    Refine,
    Align,
    TranslateResults,
}

impl From<ModeArg> for BatchMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::FileImport => BatchMode::FileImport,
            ModeArg::Refine => BatchMode::Refinement,
            ModeArg::Align => BatchMode::Alignment,
            ModeArg::TranslateResults => BatchMode::TranslateResult,
        }
    }
}
