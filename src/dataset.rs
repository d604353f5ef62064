use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::transcript::TranscriptEntry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub train_ratio: f64,
    /// Fixed shuffle seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.85,
            seed: None,
        }
    }
}

pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// `audio_12_xyz.wav` -> 12.
pub fn extract_number(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let field = name.split('_').nth(1)?;
    let digits = field.split('.').next()?;
    digits.parse().ok()
}

fn collect_wavs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_wavs(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "wav") {
            out.push(path);
        }
    }
    Ok(())
}

/// Numbered `.wav` files under `dir` (recursively), sorted by number.
pub fn find_wav_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut paths = Vec::new();
    collect_wavs(dir, &mut paths)?;

    let mut numbered: Vec<(u32, PathBuf)> = paths
        .into_iter()
        .filter_map(|path| match extract_number(&path) {
            Some(n) => Some((n, path)),
            None => {
                log::warn!("no sequence number in {}, ignored", path.display());
                None
            }
        })
        .collect();
    numbered.sort();
    Ok(numbered)
}

/// Numbers in `1..=max` with no file.
pub fn missing_numbers(files: &[(u32, PathBuf)]) -> Vec<u32> {
    let existing: BTreeSet<u32> = files.iter().map(|(n, _)| *n).collect();
    let Some(&max) = existing.last() else {
        return Vec::new();
    };
    (1..=max).filter(|n| !existing.contains(n)).collect()
}

pub fn write_numbers(path: &Path, numbers: &[u32]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for n in numbers {
        writeln!(out, "{}", n)?;
    }
    out.flush()?;
    Ok(())
}

/// Pairs file number `n` with transcript line `n - 1`.
pub fn filter_transcriptions(
    transcriptions: &[String],
    files: &[(u32, PathBuf)],
) -> Vec<TranscriptEntry> {
    let by_number: BTreeMap<u32, &PathBuf> = files.iter().map(|(n, p)| (*n, p)).collect();

    let mut filtered = Vec::with_capacity(by_number.len());
    for (number, path) in by_number {
        let line = number
            .checked_sub(1)
            .and_then(|i| transcriptions.get(i as usize));
        match line {
            Some(text) => filtered.push(TranscriptEntry::new(
                path.to_string_lossy(),
                text.trim(),
            )),
            None => log::warn!("no transcription for number {}, skipped", number),
        }
    }
    filtered
}

/// Shuffles and cuts at `floor(train_ratio * len)`.
pub fn split_train_val<T>(mut lines: Vec<T>, train_ratio: f64, rng: &mut StdRng) -> (Vec<T>, Vec<T>) {
    lines.shuffle(rng);
    let split = ((train_ratio.clamp(0.0, 1.0) * lines.len() as f64).floor() as usize).min(lines.len());
    let val = lines.split_off(split);
    (lines, val)
}
