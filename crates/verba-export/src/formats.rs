//! Subtitle and transcript serializers plus atomic file writes.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use verba_foundation::error::ExportError;
use verba_stt::WhisperResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Txt,
    Srt,
    Vtt,
    Ass,
    Json,
    Tsv,
    Csv,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 7] = [
        ExportFormat::Txt,
        ExportFormat::Srt,
        ExportFormat::Vtt,
        ExportFormat::Ass,
        ExportFormat::Json,
        ExportFormat::Tsv,
        ExportFormat::Csv,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Srt => "srt",
            ExportFormat::Vtt => "vtt",
            ExportFormat::Ass => "ass",
            ExportFormat::Json => "json",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "txt" | "text" => Ok(ExportFormat::Txt),
            "srt" => Ok(ExportFormat::Srt),
            "vtt" => Ok(ExportFormat::Vtt),
            "ass" => Ok(ExportFormat::Ass),
            "json" => Ok(ExportFormat::Json),
            "tsv" => Ok(ExportFormat::Tsv),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ExportError::Template(format!(
                "unknown export format '{}'",
                other
            ))),
        }
    }
}

/// One timed cue, either a segment or a single word in word-level mode.
struct Cue<'a> {
    start: f64,
    end: f64,
    text: &'a str,
}

fn cues<'a>(result: &'a WhisperResult, word_level: bool) -> Vec<Cue<'a>> {
    if word_level {
        let words: Vec<Cue> = result
            .segments
            .iter()
            .flat_map(|s| s.words.iter())
            .map(|w| Cue {
                start: w.start,
                end: w.end,
                text: &w.word,
            })
            .collect();
        if !words.is_empty() {
            return words;
        }
    }
    result
        .segments
        .iter()
        .map(|s| Cue {
            start: s.start,
            end: s.end,
            text: &s.text,
        })
        .collect()
}

fn timestamp(seconds: f64, decimal: char, millis_digits: usize) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    let frac = match millis_digits {
        2 => format!("{:02}", ms / 10),
        _ => format!("{:03}", ms),
    };
    format!("{:02}:{:02}:{:02}{}{}", h, m, s, decimal, frac)
}

pub fn render(result: &WhisperResult, format: ExportFormat, word_level: bool) -> Result<String, ExportError> {
    match format {
        ExportFormat::Txt => Ok(render_txt(result)),
        ExportFormat::Srt => Ok(render_srt(result, word_level)),
        ExportFormat::Vtt => Ok(render_vtt(result, word_level)),
        ExportFormat::Ass => Ok(render_ass(result, word_level)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        ExportFormat::Tsv => Ok(render_tsv(result, word_level)),
        ExportFormat::Csv => render_csv(result, word_level),
    }
}

fn render_txt(result: &WhisperResult) -> String {
    let mut out = String::new();
    for segment in &result.segments {
        let _ = writeln!(out, "{}", segment.text.trim());
    }
    out
}

fn render_srt(result: &WhisperResult, word_level: bool) -> String {
    let mut out = String::new();
    for (i, cue) in cues(result, word_level).iter().enumerate() {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            timestamp(cue.start, ',', 3),
            timestamp(cue.end, ',', 3)
        );
        let _ = writeln!(out, "{}", cue.text.trim());
        out.push('\n');
    }
    out
}

fn render_vtt(result: &WhisperResult, word_level: bool) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in cues(result, word_level) {
        let _ = writeln!(
            out,
            "{} --> {}",
            timestamp(cue.start, '.', 3),
            timestamp(cue.end, '.', 3)
        );
        let _ = writeln!(out, "{}", cue.text.trim());
        out.push('\n');
    }
    out
}

const ASS_HEADER: &str = "[Script Info]\n\
ScriptType: v4.00+\n\
PlayResX: 384\n\
PlayResY: 288\n\
ScaledBorderAndShadow: yes\n\
\n\
[V4+ Styles]\n\
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
Style: Default,Arial,16,&Hffffff,&Hffffff,&H0,&H0,0,0,0,0,100,100,0,0,1,1,0,2,10,10,10,1\n\
\n\
[Events]\n\
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n";

fn render_ass(result: &WhisperResult, word_level: bool) -> String {
    let mut out = String::from(ASS_HEADER);
    for cue in cues(result, word_level) {
        // ASS timestamps use centiseconds and a single hour digit
        let start = ass_timestamp(cue.start);
        let end = ass_timestamp(cue.end);
        let text = cue.text.trim().replace('\n', "\\N");
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            start, end, text
        );
    }
    out
}

fn ass_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let s = (total_cs / 100) % 60;
    let m = (total_cs / 6_000) % 60;
    let h = total_cs / 360_000;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

fn render_tsv(result: &WhisperResult, word_level: bool) -> String {
    let mut out = String::from("start\tend\ttext\n");
    for cue in cues(result, word_level) {
        let _ = writeln!(
            out,
            "{}\t{}\t{}",
            (cue.start * 1000.0).round() as u64,
            (cue.end * 1000.0).round() as u64,
            cue.text.trim()
        );
    }
    out
}

fn render_csv(result: &WhisperResult, word_level: bool) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["start", "end", "text"])
        .map_err(|e| ExportError::Template(format!("csv: {}", e)))?;
    for cue in cues(result, word_level) {
        writer
            .write_record([
                ((cue.start * 1000.0).round() as u64).to_string(),
                ((cue.end * 1000.0).round() as u64).to_string(),
                cue.text.trim().to_string(),
            ])
            .map_err(|e| ExportError::Template(format!("csv: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Template(format!("csv: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Template(format!("csv utf8: {}", e)))
}

/// Pick a non-colliding path by appending `_2`, `_3`, ... to the stem.
pub fn unique_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, extension));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 2u32;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, n, extension));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Atomic write: temp file in the target directory, flush, rename.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), ExportError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("export");
    let tmp = dir.join(format!(".{}.tmp", file_name));
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WhisperResult {
        let mut result = WhisperResult::synthetic("hello world", Some("en"), 2.5);
        result.segments[0].start = 1.0;
        result.segments[0].end = 3.5;
        for w in &mut result.segments[0].words {
            w.start += 1.0;
            w.end += 1.0;
        }
        result
    }

    #[test]
    fn srt_has_numbered_cues() {
        let out = render(&sample(), ExportFormat::Srt, false).unwrap();
        assert!(out.starts_with("1\n"));
        assert!(out.contains("00:00:01,000 --> 00:00:03,500"));
        assert!(out.contains("hello world"));
    }

    #[test]
    fn vtt_has_header_and_dot_timestamps() {
        let out = render(&sample(), ExportFormat::Vtt, false).unwrap();
        assert!(out.starts_with("WEBVTT\n"));
        assert!(out.contains("00:00:01.000 --> 00:00:03.500"));
    }

    #[test]
    fn ass_has_dialogue_lines() {
        let out = render(&sample(), ExportFormat::Ass, false).unwrap();
        assert!(out.contains("[Events]"));
        assert!(out.contains("Dialogue: 0,0:00:01.00,0:00:03.50,Default,,0,0,0,,hello world"));
    }

    #[test]
    fn word_level_srt_emits_cue_per_word() {
        let out = render(&sample(), ExportFormat::Srt, true).unwrap();
        assert!(out.contains("1\n"));
        assert!(out.contains("2\n"));
        assert!(out.contains("hello\n"));
        assert!(out.contains("world\n"));
    }

    #[test]
    fn tsv_uses_millisecond_integers() {
        let out = render(&sample(), ExportFormat::Tsv, false).unwrap();
        assert!(out.starts_with("start\tend\ttext\n"));
        assert!(out.contains("1000\t3500\thello world"));
    }

    #[test]
    fn csv_quotes_embedded_commas() {
        let mut result = sample();
        result.segments[0].text = "hello, world".into();
        let out = render(&result, ExportFormat::Csv, false).unwrap();
        assert!(out.contains("\"hello, world\""));
    }

    #[test]
    fn json_round_trips() {
        let result = sample();
        let out = render(&result, ExportFormat::Json, false).unwrap();
        let back: WhisperResult = serde_json::from_str(&out).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn unique_path_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "out", "srt");
        write_atomic(&first, "a").unwrap();
        let second = unique_path(dir.path(), "out", "srt");
        assert!(second.ends_with("out_2.srt"));
        write_atomic(&second, "b").unwrap();
        let third = unique_path(dir.path(), "out", "srt");
        assert!(third.ends_with("out_3.srt"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        write_atomic(&path, "content").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["x.txt"]);
    }

    #[test]
    fn format_parses_from_string() {
        assert_eq!("SRT".parse::<ExportFormat>().unwrap(), ExportFormat::Srt);
        assert!("docx".parse::<ExportFormat>().is_err());
    }
}
