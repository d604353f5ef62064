use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio_input::{write_wav, AudioBuffer};
use crate::segmentation::Span;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// How far the first chunk's start is pushed forward (intro skip).
    pub first_chunk_skip_ms: u64,
    pub edge_padding_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            first_chunk_skip_ms: 6000,
            edge_padding_ms: 300,
        }
    }
}

/// Bounds of the `index`-th (1-based) of `count` chunks after padding, clamped to `len_ms`.
pub fn padded_bounds(
    chunk: Span,
    index: usize,
    count: usize,
    len_ms: u64,
    config: &ExportConfig,
) -> Span {
    let pad = config.edge_padding_ms;
    let (start, end) = if index == 1 {
        (chunk.start + config.first_chunk_skip_ms, chunk.end + pad)
    } else if index == count {
        (chunk.start.saturating_sub(pad), chunk.end)
    } else {
        (chunk.start.saturating_sub(pad), chunk.end + pad)
    };
    Span::new(start.min(len_ms), end.min(len_ms))
}

pub fn chunk_path(output_dir: &Path, name: &str, index: usize) -> PathBuf {
    output_dir.join(format!("{}_chunk_{}.wav", name, index))
}

/// Writes every chunk as `<name>_chunk_<k>.wav` and returns the written paths.
pub fn export_chunks(
    audio: &AudioBuffer,
    chunks: &[Span],
    output_dir: &Path,
    name: &str,
    config: &ExportConfig,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let len_ms = audio.len_ms();
    let mut written = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let index = i + 1;
        let bounds = padded_bounds(*chunk, index, chunks.len(), len_ms, config);
        if bounds.len() == 0 {
            log::warn!(
                "chunk {} ({}..{} ms) is empty after padding, skipped",
                index,
                chunk.start,
                chunk.end
            );
            continue;
        }

        let path = chunk_path(output_dir, name, index);
        write_wav(&path, &audio.cut_ms(bounds.start, bounds.end))?;
        log::info!("Exported {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_input::read_wav;
    use tempfile::tempdir;

    #[test]
    fn first_middle_last_padding() {
        let config = ExportConfig::default();
        let len = 60_000;
        assert_eq!(
            padded_bounds(Span::new(0, 10_000), 1, 3, len, &config),
            Span::new(6_000, 10_300)
        );
        assert_eq!(
            padded_bounds(Span::new(12_000, 20_000), 2, 3, len, &config),
            Span::new(11_700, 20_300)
        );
        assert_eq!(
            padded_bounds(Span::new(22_000, 30_000), 3, 3, len, &config),
            Span::new(21_700, 30_000)
        );
    }

    #[test]
    fn padding_is_clamped_to_buffer() {
        let config = ExportConfig::default();
        assert_eq!(
            padded_bounds(Span::new(100, 900), 2, 3, 1_000, &config),
            Span::new(0, 1_000)
        );
        let first = padded_bounds(Span::new(0, 2_000), 1, 2, 2_000, &config);
        assert_eq!(first.len(), 0);
    }

    #[test]
    fn single_chunk_uses_first_rule() {
        let config = ExportConfig::default();
        assert_eq!(
            padded_bounds(Span::new(0, 20_000), 1, 1, 20_000, &config),
            Span::new(6_000, 20_000)
        );
    }

    #[test]
    fn exports_numbered_files() {
        let dir = tempdir().expect("temp dir");
        let out = dir.path().join("split");
        let audio = AudioBuffer::new(vec![0.2; 1_000 * 30], 1, 1_000);
        let config = ExportConfig {
            first_chunk_skip_ms: 0,
            edge_padding_ms: 100,
        };
        let chunks = [
            Span::new(0, 10_000),
            Span::new(10_000, 20_000),
            Span::new(20_000, 30_000),
        ];

        let written = export_chunks(&audio, &chunks, &out, "talk", &config).expect("export");
        assert_eq!(written.len(), 3);
        assert_eq!(written[0], out.join("talk_chunk_1.wav"));
        assert_eq!(written[2], out.join("talk_chunk_3.wav"));

        let middle = read_wav(&written[1]).expect("read");
        assert_eq!(middle.len_ms(), 10_200);
        let last = read_wav(&written[2]).expect("read");
        assert_eq!(last.len_ms(), 10_100);
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let dir = tempdir().expect("temp dir");
        let audio = AudioBuffer::new(vec![0.2; 5_000], 1, 1_000);
        let chunks = [Span::new(0, 4_000), Span::new(4_000, 5_000)];
        let written = export_chunks(&audio, &chunks, dir.path(), "x", &ExportConfig::default())
            .expect("export");
        assert_eq!(written, vec![dir.path().join("x_chunk_2.wav")]);
    }
}
