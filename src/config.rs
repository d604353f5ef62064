//! Pipeline settings, one TOML section per stage.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    corpus::CorpusConfig, dataset::DatasetConfig, download::DownloadConfig, export::ExportConfig,
    segmentation::SegmentConfig, transcribe::TranscribeConfig, tts::TtsConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub target_sample_rate: u32,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 22050,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub convert: ConvertConfig,
    pub segment: SegmentConfig,
    pub export: ExportConfig,
    pub download: DownloadConfig,
    pub transcribe: TranscribeConfig,
    pub corpus: CorpusConfig,
    pub dataset: DatasetConfig,
    pub tts: TtsConfig,
}

impl Settings {
    /// Missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("{} not found, using default settings", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::Backoff;
    use tempfile::tempdir;

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let settings = Settings::load_from(&dir.path().join("nope.toml")).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn defaults_match_pipeline_constants() {
        let s = Settings::default();
        assert_eq!(s.convert.target_sample_rate, 22050);
        assert_eq!(s.segment.min_silence_len_ms, 500);
        assert_eq!(s.segment.silence_thresh_db, -25.0);
        assert_eq!(s.segment.min_length_ms, 4000);
        assert_eq!(s.segment.max_length_ms, 15000);
        assert_eq!(s.export.first_chunk_skip_ms, 6000);
        assert_eq!(s.export.edge_padding_ms, 300);
        assert_eq!(s.dataset.train_ratio, 0.85);
        assert_eq!(s.tts.voice_codes.len(), 12);
        assert_eq!(s.tts.poll.max_attempts, 20);
        assert_eq!(s.transcribe.language, "vi");
    }

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("conf/corpus-kit.toml");

        let mut settings = Settings::default();
        settings.segment.silence_thresh_db = -32.5;
        settings.dataset.seed = Some(42);
        settings.tts.api_key = Some("secret".into());
        settings.tts.poll.backoff = Backoff::Exponential { factor: 1.5 };
        settings.save_to(&path).expect("save");

        let loaded = Settings::load_from(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            r#"
[segment]
max_length_ms = 10000

[tts]
workers = 8

[tts.poll.backoff]
kind = "linear"
step_ms = 250
"#,
        )
        .expect("write");

        let loaded = Settings::load_from(&path).expect("load");
        assert_eq!(loaded.segment.max_length_ms, 10000);
        assert_eq!(loaded.segment.min_length_ms, 4000);
        assert_eq!(loaded.tts.workers, 8);
        assert_eq!(loaded.tts.poll.backoff, Backoff::Linear { step_ms: 250 });
        assert_eq!(loaded.tts.poll.interval_ms, 1000);
        assert_eq!(loaded.export, ExportConfig::default());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[segment]\nmax_length_ms = \"long\"\n").expect("write");
        assert!(Settings::load_from(&path).is_err());
    }
}
