//! `path|text` transcript lines and cleanup of raw recognizer output.

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result};
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub audio_path: String,
    pub text: String,
}

impl TranscriptEntry {
    pub fn new(audio_path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            audio_path: audio_path.into(),
            text: text.into(),
        }
    }

    /// Splits on the first `|`. Lines without one are rejected.
    pub fn parse(line: &str) -> Option<Self> {
        let (path, text) = line.trim_end_matches(['\r', '\n']).split_once('|')?;
        Some(Self::new(path, text))
    }
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.audio_path, self.text)
    }
}

fn unwanted_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s.,'!?]+").expect("valid regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Drops symbols other than `.,'!?`, then collapses whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped = unwanted_chars().replace_all(text, "");
    whitespace_runs()
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

/// A cleaned line keyed for sorting by recording name, then chunk number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLine {
    pub base_name: String,
    pub chunk: u32,
    pub entry: TranscriptEntry,
}

/// Turns `"<dir>/<name>_chunk_<n>.wav <text>"` into `audio/<name>_chunk_<n>.wav|<clean text>`.
pub fn process_raw_line(line: &str) -> Option<ChunkLine> {
    let (audio_path, text) = line.trim().split_once(char::is_whitespace)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let file_name = Path::new(audio_path).file_name()?.to_str()?;
    let (base_name, suffix) = file_name.split_once("_chunk_")?;
    let number = suffix.split('.').next()?;
    let chunk = number.parse().ok()?;

    Some(ChunkLine {
        base_name: base_name.to_string(),
        chunk,
        entry: TranscriptEntry::new(
            format!("audio/{}_chunk_{}.wav", base_name, number),
            clean_text(text),
        ),
    })
}

pub fn process_raw_transcript<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<TranscriptEntry> {
    let mut processed: Vec<ChunkLine> = lines
        .into_iter()
        .filter_map(|line| {
            let parsed = process_raw_line(line);
            if parsed.is_none() && !line.trim().is_empty() {
                log::warn!("skipping unrecognized transcript line `{}`", line.trim());
            }
            parsed
        })
        .collect();
    processed.sort_by(|a, b| (&a.base_name, a.chunk).cmp(&(&b.base_name, b.chunk)));
    processed.into_iter().map(|line| line.entry).collect()
}

pub fn read_entries(path: &Path) -> Result<Vec<TranscriptEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut entries = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match TranscriptEntry::parse(line) {
            Some(entry) => entries.push(entry),
            None => log::warn!("No `|` separator in `{}`", line),
        }
    }
    Ok(entries)
}

pub fn write_entries(path: &Path, entries: &[TranscriptEntry]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for entry in entries {
        writeln!(out, "{}", entry)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clean_text_strips_symbols_and_spaces() {
        assert_eq!(clean_text("  xin   chào!  "), "xin chào!");
        assert_eq!(clean_text("a \"quoted\" (word)"), "a quoted word");
        assert_eq!(clean_text("tôi — là\t\nObama..."), "tôi là Obama...");
        assert_eq!(clean_text("it's 5, ok?"), "it's 5, ok?");
    }

    #[test]
    fn parse_splits_on_first_pipe() {
        let entry = TranscriptEntry::parse("wavs/a.wav|xin chào | bạn\n").expect("entry");
        assert_eq!(entry.audio_path, "wavs/a.wav");
        assert_eq!(entry.text, "xin chào | bạn");
        assert_eq!(entry.to_string(), "wavs/a.wav|xin chào | bạn");
        assert!(TranscriptEntry::parse("no separator").is_none());
    }

    #[test]
    fn raw_line_is_rewritten_under_audio_dir() {
        let line = process_raw_line("./split/obama3_chunk_12.wav  Xin chào, các bạn!").expect("line");
        assert_eq!(line.base_name, "obama3");
        assert_eq!(line.chunk, 12);
        assert_eq!(line.entry.audio_path, "audio/obama3_chunk_12.wav");
        assert_eq!(line.entry.text, "Xin chào, các bạn!");
    }

    #[test]
    fn raw_lines_without_text_or_chunk_are_dropped() {
        assert!(process_raw_line("./split/obama3_chunk_1.wav").is_none());
        assert!(process_raw_line("./split/obama3.wav hello").is_none());
        assert!(process_raw_line("./split/obama3_chunk_x.wav hello").is_none());
    }

    #[test]
    fn transcript_sorted_numerically_per_recording() {
        let raw = [
            "split/b_chunk_1.wav one",
            "split/a_chunk_10.wav ten",
            "split/a_chunk_2.wav two",
            "garbage",
        ];
        let entries = process_raw_transcript(raw);
        let paths: Vec<&str> = entries.iter().map(|e| e.audio_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["audio/a_chunk_2.wav", "audio/a_chunk_10.wav", "audio/b_chunk_1.wav"]
        );
    }

    #[test]
    fn entries_file_round_trip() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("list.txt");
        let entries = vec![
            TranscriptEntry::new("wavs/1.wav", "một"),
            TranscriptEntry::new("wavs/2.wav", "hai"),
        ];
        write_entries(&path, &entries).expect("write");
        assert_eq!(read_entries(&path).expect("read"), entries);
    }
}
