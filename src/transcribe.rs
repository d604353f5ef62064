//! Speech recognition over exported chunks.
//!
//! [`Transcriber`] is the seam; the whisper.cpp backend is compiled only with
//! the `whisper` cargo feature.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio_input::{read_wav, AudioBuffer};

#[derive(Debug, Clone, Error)]
pub enum TranscribeError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to initialise recognizer: {0}")]
    Init(String),

    #[error("transcription failed: {0}")]
    Failed(String),

    #[error("built without speech recognition support (enable the `whisper` feature)")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeConfig {
    pub model: PathBuf,
    /// ISO-639-1 code, or `"auto"`.
    pub language: String,
    pub beam_size: i32,
    pub n_threads: i32,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/ggml-large-v3.bin"),
            language: "vi".into(),
            beam_size: 6,
            n_threads: 4,
        }
    }
}

pub trait Transcriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String, TranscribeError>;
}

#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;

#[cfg(feature = "whisper")]
mod whisper {
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use super::{TranscribeConfig, TranscribeError, Transcriber};
    use crate::audio_input::{resample, to_mono, AudioBuffer};

    /// Whisper models expect 16 kHz mono input.
    const WHISPER_SAMPLE_RATE: u32 = 16_000;

    pub struct WhisperTranscriber {
        ctx: WhisperContext,
        config: TranscribeConfig,
    }

    impl WhisperTranscriber {
        pub fn load(config: &TranscribeConfig) -> Result<Self, TranscribeError> {
            let path = &config.model;
            if !path.exists() {
                return Err(TranscribeError::ModelNotFound(path.display().to_string()));
            }
            let path_str = path.to_str().ok_or_else(|| {
                TranscribeError::ModelNotFound(format!("non UTF-8 path: {}", path.display()))
            })?;
            let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
                .map_err(|e| TranscribeError::Init(e.to_string()))?;
            Ok(Self {
                ctx,
                config: config.clone(),
            })
        }
    }

    impl Transcriber for WhisperTranscriber {
        fn transcribe(&self, audio: &AudioBuffer) -> Result<String, TranscribeError> {
            let audio = resample(&to_mono(audio), WHISPER_SAMPLE_RATE);

            let mut params = FullParams::new(SamplingStrategy::BeamSearch {
                beam_size: self.config.beam_size,
                patience: -1.0,
            });
            let language = match self.config.language.as_str() {
                "auto" => None,
                lang => Some(lang),
            };
            params.set_language(language);
            params.set_n_threads(self.config.n_threads);
            params.set_temperature(0.0);
            params.set_print_progress(false);
            params.set_print_realtime(false);

            let mut state = self
                .ctx
                .create_state()
                .map_err(|e| TranscribeError::Init(e.to_string()))?;
            state
                .full(params, &audio.samples)
                .map_err(|e| TranscribeError::Failed(e.to_string()))?;

            let n_segments = state
                .full_n_segments()
                .map_err(|e| TranscribeError::Failed(e.to_string()))?;
            let mut segments = Vec::with_capacity(n_segments.max(0) as usize);
            for i in 0..n_segments {
                let text = state
                    .full_get_segment_text(i)
                    .map_err(|e| TranscribeError::Failed(format!("segment {i}: {e}")))?;
                segments.push(text.trim().to_string());
            }
            Ok(segments.join(" "))
        }
    }
}

/// Builds the configured backend.
pub fn load_transcriber(config: &TranscribeConfig) -> Result<Box<dyn Transcriber>, TranscribeError> {
    #[cfg(feature = "whisper")]
    {
        Ok(Box::new(WhisperTranscriber::load(config)?))
    }
    #[cfg(not(feature = "whisper"))]
    {
        let _ = config;
        Err(TranscribeError::Unavailable)
    }
}

/// `*.wav` files in `dir` whose name starts with `prefix`, sorted by path.
pub fn chunk_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "wav")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    files.sort();
    Ok(files)
}

pub fn transcribe_folder(
    dir: &Path,
    prefix: &str,
    transcriber: &dyn Transcriber,
) -> Result<Vec<(PathBuf, String)>> {
    let mut results = Vec::new();
    for path in chunk_files(dir, prefix)? {
        let text = read_wav(&path).and_then(|audio| Ok(transcriber.transcribe(&audio)?));
        match text {
            Ok(text) => {
                log::info!("{} done", path.display());
                results.push((path, text));
            }
            Err(e) => log::error!("failed to transcribe {}: {:#}", path.display(), e),
        }
    }
    Ok(results)
}

/// One `<path> <text>` line per chunk, the input format of transcript cleaning.
pub fn write_raw_transcript(path: &Path, entries: &[(PathBuf, String)]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for (audio, text) in entries {
        writeln!(out, "{} {}", audio.display(), text.trim())?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_input::write_wav;
    use crate::transcript::process_raw_transcript;
    use tempfile::tempdir;

    /// Reports the clip length instead of recognizing anything.
    struct LengthTranscriber;

    impl Transcriber for LengthTranscriber {
        fn transcribe(&self, audio: &AudioBuffer) -> Result<String, TranscribeError> {
            if audio.samples.is_empty() {
                return Err(TranscribeError::Failed("empty clip".into()));
            }
            Ok(format!("dài {} ms", audio.len_ms()))
        }
    }

    fn clip(path: &Path, ms: usize) {
        write_wav(path, &AudioBuffer::new(vec![0.1; ms], 1, 1_000)).expect("write");
    }

    #[test]
    fn folder_is_filtered_sorted_and_failures_skipped() {
        let dir = tempdir().expect("temp dir");
        clip(&dir.path().join("talk_chunk_2.wav"), 200);
        clip(&dir.path().join("talk_chunk_1.wav"), 100);
        clip(&dir.path().join("talk_chunk_3.wav"), 0);
        clip(&dir.path().join("other_chunk_1.wav"), 100);
        std::fs::write(dir.path().join("talk_notes.txt"), "x").expect("write");

        let results = transcribe_folder(dir.path(), "talk", &LengthTranscriber).expect("folder");
        let names: Vec<_> = results
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["talk_chunk_1.wav", "talk_chunk_2.wav"]);
        assert_eq!(results[1].1, "dài 200 ms");
    }

    #[test]
    fn raw_transcript_feeds_cleaning() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("raw.txt");
        let entries = vec![
            (PathBuf::from("split/talk_chunk_2.wav"), " hai ".to_string()),
            (PathBuf::from("split/talk_chunk_1.wav"), "một!".to_string()),
        ];
        write_raw_transcript(&path, &entries).expect("write");

        let content = std::fs::read_to_string(&path).expect("read");
        let cleaned = process_raw_transcript(content.lines());
        let lines: Vec<String> = cleaned.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec!["audio/talk_chunk_1.wav|một!", "audio/talk_chunk_2.wav|hai"]
        );
    }

    #[cfg(not(feature = "whisper"))]
    #[test]
    fn backend_unavailable_without_feature() {
        let err = load_transcriber(&TranscribeConfig::default()).err().expect("error");
        assert!(matches!(err, TranscribeError::Unavailable));
    }
}
