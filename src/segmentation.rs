use serde::{Deserialize, Serialize};

use crate::audio_input::AudioBuffer;

/// Silence detection and chunk length bounds, all in milliseconds / dBFS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    pub min_silence_len_ms: u64,
    pub max_silence_len_ms: u64,
    /// Per-millisecond loudness below this opens a silence run.
    pub silence_thresh_db: f32,
    /// A run only counts as silence when its mean loudness is below this.
    pub avg_silence_thresh_db: f32,
    pub min_length_ms: u64,
    pub max_length_ms: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_silence_len_ms: 500,
            max_silence_len_ms: 5000,
            silence_thresh_db: -25.0,
            avg_silence_thresh_db: -25.0,
            min_length_ms: 4000,
            max_length_ms: 15000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Loudness of a window relative to full scale. Silent or empty windows are `-inf`.
pub fn dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let power = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    if power == 0.0 {
        return f32::NEG_INFINITY;
    }
    20.0 * power.sqrt().log10()
}

/// Duration and mean loudness test for a candidate run of 1 ms levels.
pub fn is_silence_run(levels: &[f32], config: &SegmentConfig) -> bool {
    let duration = levels.len() as u64;
    if !(config.min_silence_len_ms..=config.max_silence_len_ms).contains(&duration) {
        return false;
    }
    let avg = levels.iter().sum::<f32>() / levels.len() as f32;
    avg < config.avg_silence_thresh_db
}

/// Speech spans between qualifying silence runs, in arrival order.
///
/// A silence run that reaches the end of the buffer is never closed, so it
/// stays part of the last span.
pub fn scan_speech(audio: &AudioBuffer, config: &SegmentConfig) -> Vec<Span> {
    let len_ms = audio.len_ms();
    let mut spans = Vec::new();
    let mut silence_start: Option<u64> = None;
    let mut levels: Vec<f32> = Vec::new();
    let mut last_speech_end = 0;

    for i in 0..len_ms {
        let db = dbfs(audio.slice_ms(i, i + 1));

        if db < config.silence_thresh_db {
            silence_start.get_or_insert(i);
            levels.push(db);
            continue;
        }

        if let Some(start) = silence_start.take() {
            if is_silence_run(&levels, config) {
                if last_speech_end < start {
                    spans.push(Span::new(last_speech_end, start));
                }
                last_speech_end = i;
            }
            levels.clear();
        }
    }

    if last_speech_end < len_ms {
        spans.push(Span::new(last_speech_end, len_ms));
    }

    log::debug!("scanned {} ms, {} speech spans", len_ms, spans.len());
    spans
}

/// Merges short spans into their predecessor and cuts long ones at `max_length_ms`.
///
/// A short span whose merge would overflow `max_length_ms` (or that has no
/// predecessor) is kept as is.
pub fn normalize_spans(spans: &[Span], min_length_ms: u64, max_length_ms: u64) -> Vec<Span> {
    let mut chunks: Vec<Span> = Vec::with_capacity(spans.len());

    for span in spans {
        let length = span.len();
        if length < min_length_ms {
            match chunks.last_mut() {
                Some(prev) if prev.len() + length <= max_length_ms => prev.end = span.end,
                _ => chunks.push(*span),
            }
        } else if length > max_length_ms && max_length_ms > 0 {
            let mut start = span.start;
            while start < span.end {
                let end = (start + max_length_ms).min(span.end);
                chunks.push(Span::new(start, end));
                start = end;
            }
        } else {
            chunks.push(*span);
        }
    }

    chunks
}
