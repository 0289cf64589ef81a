use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use verba_app::batch::{BatchController, BatchDeps, BatchMode, BatchTranslator};
use verba_app::cli::{Cli, Command, CommonArgs, ImportArgs, RecordArgs};
use verba_app::dispatcher::TranslatePath;
use verba_app::media;
use verba_app::session::{self, SessionConfig};
use verba_app::settings::Settings;
use verba_export::{ExportFormat, ExportTask, SegmentLimits, SidecarMetadata, TemplateContext};
use verba_foundation::error::{AppError, DownloadError};
use verba_foundation::CancellationToken;
use verba_stt::{
    cache_root, Backend, HallucinationFilter, ModelHandle, ModelManager, NoOpLoader, Temperature,
    TranscribeOptions, MODEL_KEYS,
};
use verba_translate::{engine_by_name, validate_pair, ProxyConfig};

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "verba.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

fn exit_code(err: &AppError) -> u8 {
    match err {
        AppError::Cancelled | AppError::Download(DownloadError::Cancelled) => 5,
        AppError::Audio(_) => 3,
        AppError::Model(_) | AppError::Download(_) => 4,
        AppError::Config(_) | AppError::FfmpegMissing => 2,
        _ => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("verba: {}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path)?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            ctrl_c_cancel.cancel();
        }
    });

    match cli.command {
        Command::Record(args) => record(&settings, args, cancel).await,
        Command::Import(args) => import(&settings, args, cancel).await,
    }
}

async fn record(
    settings: &Settings,
    args: RecordArgs,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let model = load_model(settings, &args.common.model, &cancel)?;
    let options = transcribe_options(settings, &args.common);
    let translate = translate_path(settings, &args.common, &model, &cancel)?;

    let config = SessionConfig {
        input: args.input.into(),
        options,
        filter: filter_for(settings),
        repetition_allowed: settings.repetition_allowed,
        translate,
        transcript_dir: args.output.clone(),
        export: args.output.is_some().then(|| export_task(settings)),
    };
    session::run(settings, config, model, cancel).await
}

async fn import(
    settings: &Settings,
    args: ImportArgs,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let mode: BatchMode = args.mode.into();

    let needs_decode = mode != BatchMode::TranslateResult
        && args.files.iter().any(|f| {
            !f.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
        });
    if needs_decode && !media::ffmpeg_available() {
        return Err(AppError::FfmpegMissing);
    }

    let model = load_model(settings, &args.common.model, &cancel)?;
    let options = transcribe_options(settings, &args.common);

    let translator = match translate_path(settings, &args.common, &model, &cancel)? {
        None => None,
        Some(TranslatePath::Model { .. }) => Some(BatchTranslator::Model),
        Some(TranslatePath::External {
            engine,
            source,
            target,
        }) => Some(BatchTranslator::External {
            engine,
            source,
            target,
        }),
    };

    // Translate-only on the model path skips the transcribe pass; the
    // external path always needs the transcription it rewrites
    let model_translate_only = args.common.translate
        && !args.common.transcribe
        && matches!(translator, Some(BatchTranslator::Model));
    let transcribe = !model_translate_only;

    let task = match (transcribe, args.common.translate) {
        (true, true) => ("transcribe-translate", "tc-tl"),
        (false, true) => ("translate", "tl"),
        _ => ("transcribe", "tc"),
    };

    let deps = BatchDeps {
        model,
        options,
        filter: filter_for(settings),
        repetition_allowed: settings.repetition_allowed,
        transcribe,
        translator,
        export: export_task(settings),
        context: TemplateContext {
            lang_source: args.common.source.clone(),
            lang_target: args.common.target.clone(),
            transcribe_with: args.common.model.clone(),
            translate_with: args.common.engine.clone().unwrap_or_default(),
            task: task.0.to_string(),
            task_short: task.1.to_string(),
            ..Default::default()
        },
        metadata: SidecarMetadata {
            task: task.0.to_string(),
            transcribe,
            translate: args.common.translate,
            model: args.common.model.clone(),
            backend: if settings.use_faster_whisper {
                "faster".into()
            } else {
                "primary".into()
            },
            engine: args.common.engine.clone().unwrap_or_default(),
            lang_source: args.common.source.clone(),
            lang_target: args.common.target.clone(),
            ..Default::default()
        },
        language_hint: args.language_hint.clone(),
    };

    let controller = BatchController::new(mode, cancel);
    controller.enqueue(args.files);
    let outcome = controller.run(&deps).await;

    let progress = controller.progress();
    info!(
        "Batch finished: {}/{} processed in {:.1} s",
        progress.processed,
        progress.total,
        progress.elapsed.as_secs_f64()
    );
    outcome
}

fn load_model(
    settings: &Settings,
    key: &str,
    cancel: &CancellationToken,
) -> Result<Arc<ModelHandle>, AppError> {
    let backend = if settings.use_faster_whisper {
        Backend::Faster
    } else {
        Backend::Primary
    };
    let manager = ModelManager::new(cache_root());
    let spec = manager.spec(key, backend)?;

    if !manager.verify(&spec) {
        info!("Model {} ({:?}) not cached, downloading", key, backend);
        let mut last_percent = 0u64;
        let key = spec.key.clone();
        manager.download(
            &spec,
            &mut |progress| {
                if let Some(total) = progress.total {
                    let percent = progress.downloaded * 100 / total.max(1);
                    if percent != last_percent {
                        last_percent = percent;
                        info!("Downloading {}: {}%", key, percent);
                    }
                }
            },
            cancel,
        )?;
    }

    let handle = manager.load(&spec, &NoOpLoader)?;
    Ok(Arc::new(handle))
}

fn transcribe_options(settings: &Settings, common: &CommonArgs) -> TranscribeOptions {
    TranscribeOptions {
        language: (common.source != "auto").then(|| common.source.clone()),
        temperature: if settings.use_temp {
            Temperature::default()
        } else {
            Temperature::Single(0.0)
        },
        ..Default::default()
    }
}

fn filter_for(settings: &Settings) -> HallucinationFilter {
    match &settings.path_filter_file_import {
        Some(path) if settings.filter_file_import => HallucinationFilter::load(path),
        _ => HallucinationFilter::bundled(),
    }
}

/// Pick the translation path from the `--engine` flag: an STT model key
/// selects the model's translate-to-English task, anything else an external
/// HTTP engine.
fn translate_path(
    settings: &Settings,
    common: &CommonArgs,
    model: &Arc<ModelHandle>,
    cancel: &CancellationToken,
) -> Result<Option<TranslatePath>, AppError> {
    if !common.translate {
        return Ok(None);
    }
    let engine_name = common.engine.as_deref().unwrap_or("google");

    if MODEL_KEYS.contains(&engine_name) {
        // The STT model can only translate into English
        if !matches!(common.target.to_lowercase().as_str(), "english" | "en") {
            return Err(AppError::Config(format!(
                "model '{}' translates to English only; use an external engine for {}",
                engine_name, common.target
            )));
        }
        let handle = if engine_name == common.model {
            model.clone()
        } else {
            load_model(settings, engine_name, cancel)?
        };
        return Ok(Some(TranslatePath::Model {
            handle,
            options: transcribe_options(settings, common),
        }));
    }

    let (source, target) = validate_pair(engine_name, &common.source, &common.target)?;
    let engine = engine_by_name(engine_name, None, None, &ProxyConfig::default())?;
    Ok(Some(TranslatePath::External {
        engine: Arc::from(engine),
        source,
        target,
    }))
}

fn export_task(settings: &Settings) -> ExportTask {
    let formats: Vec<ExportFormat> = settings
        .export_format
        .split(',')
        .filter_map(|f| match f.parse() {
            Ok(format) => Some(format),
            Err(_) => {
                warn!("Ignoring unknown export format '{}'", f.trim());
                None
            }
        })
        .collect();
    let formats = if formats.is_empty() {
        vec![ExportFormat::Srt]
    } else {
        formats
    };

    ExportTask {
        output_dir: settings
            .dir_export
            .clone()
            .unwrap_or_else(|| PathBuf::from(".")),
        name_template: settings.export_to.clone(),
        formats,
        segment_limits: SegmentLimits {
            max_words: settings.segment_max_words,
            max_chars: settings.segment_max_chars,
            split_on_newline: settings.segment_split_or_newline,
            even_split: settings.segment_even_split,
        },
        word_level: settings.word_level,
    }
}
