//! Text corpus preparation for TTS prompts: filtering scraped text down to
//! clean Vietnamese sentences, deduplicating, sampling and vocabulary counts.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result};
use rand::{seq::SliceRandom, Rng};
use regex::Regex;
use serde::{Deserialize, Serialize};

const VIETNAMESE_CHARS: &str = concat!(
    "ÀÁÂÃÈÉÊÌÍÒÓÔÕÙÚĂĐĨŨƠàáâãèéêìíòóôõùúăđĩũơ",
    "ƯĂÂĐÊÔƠư1234567890ăâêôơ",
    "ẢẠẤẦẨẪẬẮẰẲẴẶ",
    "ẸẺẼẾỀỂỄỆ",
    "ỈỊ",
    "ỐỒỔỖỘỚỜỞỠỢ",
    "ỦỤỨỪỬỮỰ",
    "ÝỲỶỸỴýỳỷỹỵ",
    "ạảấầẩẫậắằẳẵặ",
    "ẹẻẽếềểễệ",
    "ịỉ",
    "ọỏốồổỗộớờởỡợ",
    "ụủứừửữự",
);

const FORBIDDEN_CHARS: &str = "-;>*\"”“…)[]'’+_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub min_line_chars: usize,
    pub max_line_chars: usize,
    /// Share of characters that must be Vietnamese-specific (or digits).
    pub min_vietnamese_ratio: f64,
    pub select_lines: usize,
    pub sample_max_chars: usize,
    pub seed: Option<u64>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            min_line_chars: 13,
            max_line_chars: 200,
            min_vietnamese_ratio: 0.25,
            select_lines: 25_000,
            sample_max_chars: 1000,
            seed: None,
        }
    }
}

pub fn is_vietnamese_char(c: char) -> bool {
    VIETNAMESE_CHARS.contains(c)
}

pub fn is_vietnamese_line(line: &str, min_ratio: f64) -> bool {
    let total = line.chars().count();
    if total == 0 {
        return false;
    }
    let hits = line.chars().filter(|&c| is_vietnamese_char(c)).count();
    hits as f64 / total as f64 > min_ratio
}

pub fn accept_line(line: &str, config: &CorpusConfig) -> bool {
    let len = line.chars().count();
    (config.min_line_chars..=config.max_line_chars).contains(&len)
        && !line.chars().any(|c| FORBIDDEN_CHARS.contains(c))
        && is_vietnamese_line(line, config.min_vietnamese_ratio)
}

/// Appends accepted lines of every `*.txt` in `src_dir` (by name) to `output`.
pub fn merge_text_files(src_dir: &Path, output: &Path, config: &CorpusConfig) -> Result<usize> {
    let mut sources: Vec<_> = std::fs::read_dir(src_dir)
        .with_context(|| format!("failed to read {}", src_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    sources.sort();

    let file = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut out = BufWriter::new(file);
    let mut kept = 0;
    for source in sources {
        let reader = BufReader::new(
            File::open(&source).with_context(|| format!("failed to open {}", source.display()))?,
        );
        for line in reader.lines() {
            let line = line?;
            let cleaned = line.trim();
            if accept_line(cleaned, config) {
                writeln!(out, "{}", cleaned)?;
                kept += 1;
            }
        }
    }
    out.flush()?;
    Ok(kept)
}

/// Lowercases, drops blanks and repeats; first occurrence order is kept.
pub fn lowercase_dedupe<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty() && seen.insert(line.clone()))
        .collect()
}

pub fn select_random_lines<R: Rng + ?Sized>(mut lines: Vec<String>, count: usize, rng: &mut R) -> Vec<String> {
    lines.shuffle(rng);
    lines.truncate(count);
    lines
}

fn word_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").expect("valid regex"))
}

pub fn count_unique_words<S: AsRef<str>>(lines: &[S]) -> usize {
    let words: HashSet<&str> = lines
        .iter()
        .flat_map(|line| word_pattern().find_iter(line.as_ref()).map(|m| m.as_str()))
        .collect();
    words.len()
}

/// Random non-empty lines, newline-terminated, stopping before `max_chars` is exceeded.
pub fn sample_text<R: Rng + ?Sized>(lines: &[String], max_chars: usize, rng: &mut R) -> String {
    let mut pool: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    pool.shuffle(rng);

    let mut output = String::new();
    let mut chars = 0;
    for line in pool {
        let len = line.chars().count();
        if chars + len > max_chars {
            break;
        }
        output.push_str(line);
        output.push('\n');
        chars += len + 1;
    }
    output
}

pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content.lines().map(str::to_string).collect())
}

pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{}", line.as_ref())?;
    }
    out.flush()?;
    Ok(())
}
