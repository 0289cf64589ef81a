//! Terminal rendering of the result store: composed fragments with ANSI
//! truecolor, printed as utterances commit.

use std::io::Write;

use verba_render::{compose, Color, RenderConfig, ResultStore, Sentence, ToInsert};

use crate::settings::Settings;

/// Incremental printer over the store. Remembers the last utterance id it
/// printed per column so each commit is emitted exactly once.
pub struct LiveDisplay {
    tc_config: RenderConfig,
    tl_config: RenderConfig,
    printed_tc: Option<u64>,
    printed_tl: Option<u64>,
    color: bool,
}

fn color_or(setting: &str, fallback: Color) -> Color {
    Color::parse(setting).unwrap_or(fallback)
}

impl LiveDisplay {
    pub fn new(settings: &Settings) -> Self {
        let defaults = RenderConfig::default();
        let low = color_or(&settings.gradient_low_conf, defaults.low_conf_color);
        let high = color_or(&settings.gradient_high_conf, defaults.high_conf_color);
        let base = RenderConfig {
            separator: settings.separate_with.clone(),
            max_chars: 0,
            max_per_line: 0,
            colorize_per_segment: settings.colorize_per_segment,
            colorize_per_word: settings.colorize_per_word,
            low_conf_color: low,
            high_conf_color: high,
        };
        Self {
            tc_config: RenderConfig {
                max_chars: settings.tb_mw_tc_max,
                max_per_line: settings.tb_mw_tc_max_per_line,
                ..base.clone()
            },
            tl_config: RenderConfig {
                max_chars: settings.tb_mw_tl_max,
                max_per_line: settings.tb_mw_tl_max_per_line,
                ..base
            },
            printed_tc: None,
            printed_tl: None,
            color: true,
        }
    }

    pub fn plain(settings: &Settings) -> Self {
        let mut display = Self::new(settings);
        display.color = false;
        display
    }

    /// Print every committed sentence newer than the last poll. Translations
    /// are prefixed so the two columns stay distinguishable on one stream.
    pub fn poll(&mut self, store: &ResultStore, out: &mut impl Write) -> std::io::Result<()> {
        let mut tc: Vec<&Sentence> = Vec::new();
        for entry in store.tc_sentences() {
            if Some(entry.utterance_id) > self.printed_tc {
                self.printed_tc = Some(entry.utterance_id);
                tc.push(&entry.sentence);
            }
        }
        if !tc.is_empty() {
            self.print(&compose(&tc, &self.tc_config), "", out)?;
        }

        let mut tl: Vec<&Sentence> = Vec::new();
        for entry in store.tl_sentences() {
            if Some(entry.utterance_id) > self.printed_tl {
                self.printed_tl = Some(entry.utterance_id);
                tl.push(&entry.sentence);
            }
        }
        if !tl.is_empty() {
            self.print(&compose(&tl, &self.tl_config), "> ", out)?;
        }
        out.flush()
    }

    fn print(
        &self,
        fragments: &[ToInsert],
        prefix: &str,
        out: &mut impl Write,
    ) -> std::io::Result<()> {
        write!(out, "{}", prefix)?;
        for frag in fragments {
            match frag.color.filter(|_| self.color) {
                Some(c) => write!(
                    out,
                    "\x1b[38;2;{};{};{}m{}\x1b[0m",
                    c.r, c.g, c.b, frag.text
                )?,
                None => write!(out, "{}", frag.text)?,
            }
        }
        Ok(())
    }
}
