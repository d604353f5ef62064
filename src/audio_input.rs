// WAV input/output plus down-mixing and sinc sample rate conversion.

use std::path::Path;

use anyhow::{Context, Result};
use dasp::{interpolate::sinc::Sinc, ring_buffer, signal, Sample, Signal};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Interleaved samples in `[-1, 1]`, addressed by millisecond offset.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn len_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    fn frame_at_ms(&self, ms: u64) -> usize {
        let frame = ms * self.sample_rate as u64 / 1000;
        (frame as usize).min(self.frames())
    }

    /// Samples covering `[start_ms, end_ms)`, clamped to the buffer.
    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> &[f32] {
        let channels = self.channels as usize;
        let start = self.frame_at_ms(start_ms);
        let end = self.frame_at_ms(end_ms).max(start);
        &self.samples[start * channels..end * channels]
    }

    /// Copies the millisecond range into a standalone buffer.
    pub fn cut_ms(&self, start_ms: u64, end_ms: u64) -> AudioBuffer {
        AudioBuffer::new(
            self.slice_ms(start_ms, end_ms).to_vec(),
            self.channels,
            self.sample_rate,
        )
    }
}

pub fn read_wav(wav_file: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(wav_file)
        .with_context(|| format!("failed to open {}", wav_file.display()))?;
    let spec = reader.spec();
    log::debug!("{}: {:?}", wav_file.display(), spec);

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("failed to decode {}", wav_file.display()))?,
        SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("failed to decode {}", wav_file.display()))?
        }
    };

    Ok(AudioBuffer::new(samples, spec.channels, spec.sample_rate))
}

/// Writes 16-bit PCM with the buffer's channel count and rate.
pub fn write_wav(path: &Path, audio: &AudioBuffer) -> Result<()> {
    let spec = WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &s in &audio.samples {
        writer.write_sample(s.to_sample::<i16>())?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn to_mono(audio: &AudioBuffer) -> AudioBuffer {
    let samples = match audio.channels {
        1 => audio.samples.clone(),
        n => audio
            .samples
            .chunks_exact(n as usize)
            .map(|frame| frame.iter().sum::<f32>() / n as f32)
            .collect(),
    };
    AudioBuffer::new(samples, 1, audio.sample_rate)
}

fn resample_channel(samples: Vec<f32>, from_hz: u32, to_hz: u32) -> Vec<f32> {
    let signal = signal::from_interleaved_samples_iter::<_, [f64; 1]>(
        samples.into_iter().map(f32::to_sample::<f64>),
    );

    let ring_buffer = ring_buffer::Fixed::from([[0.0]; 100]);
    let sinc = Sinc::new(ring_buffer);

    signal
        .from_hz_to_hz(sinc, from_hz as f64, to_hz as f64)
        .until_exhausted()
        .map(|frame| frame[0].to_sample::<f32>())
        .collect()
}

/// Sinc-interpolated rate conversion, channel by channel.
pub fn resample(audio: &AudioBuffer, target_rate: u32) -> AudioBuffer {
    if audio.sample_rate == target_rate || audio.samples.is_empty() {
        return AudioBuffer::new(audio.samples.clone(), audio.channels, target_rate);
    }

    let channels = audio.channels as usize;
    let converted: Vec<Vec<f32>> = (0..channels)
        .map(|c| {
            let channel = audio.samples.iter().skip(c).step_by(channels).copied().collect();
            resample_channel(channel, audio.sample_rate, target_rate)
        })
        .collect();

    let frames = converted.iter().map(Vec::len).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * channels);
    for i in 0..frames {
        for channel in &converted {
            samples.push(channel[i]);
        }
    }
    AudioBuffer::new(samples, audio.channels, target_rate)
}

/// Mono, `target_rate`, 16-bit PCM.
pub fn convert(input: &Path, output: &Path, target_rate: u32) -> Result<()> {
    let audio = read_wav(input)?;
    let converted = resample(&to_mono(&audio), target_rate);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_wav(output, &converted)?;
    log::info!(
        "Converted {} ({} ch, {} Hz) to {} ({} Hz)",
        input.display(),
        audio.channels,
        audio.sample_rate,
        output.display(),
        converted.sample_rate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn len_ms_counts_frames_not_samples() {
        let audio = AudioBuffer::new(vec![0.0; 2 * 8_000], 2, 8_000);
        assert_eq!(audio.frames(), 8_000);
        assert_eq!(audio.len_ms(), 1_000);
    }

    #[test]
    fn slice_ms_is_clamped() {
        let audio = AudioBuffer::new((0..1_000).map(|i| i as f32 / 1_000.0).collect(), 1, 1_000);
        assert_eq!(audio.slice_ms(10, 20).len(), 10);
        assert_eq!(audio.slice_ms(10, 20)[0], 0.01);
        assert_eq!(audio.slice_ms(990, 5_000).len(), 10);
        assert!(audio.slice_ms(2_000, 3_000).is_empty());
        assert!(audio.slice_ms(30, 20).is_empty());
    }

    #[test]
    fn to_mono_averages_channels() {
        let stereo = AudioBuffer::new(vec![0.5, -0.5, 0.2, 0.4], 2, 16_000);
        let mono = to_mono(&stereo);
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples.len(), 2);
        assert!(mono.samples[0].abs() < 1e-6);
        assert!((mono.samples[1] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn resample_same_rate_is_noop() {
        let audio = AudioBuffer::new(vec![0.1; 160], 1, 16_000);
        assert_eq!(resample(&audio, 16_000), audio);
    }

    #[test]
    fn resample_changes_length_proportionally() {
        let audio = AudioBuffer::new(vec![0.25; 44_100], 1, 44_100);
        let out = resample(&audio, 22_050);
        assert_eq!(out.sample_rate, 22_050);
        let frames = out.frames() as i64;
        assert!((frames - 22_050).abs() < 1_000, "frames = {frames}");
    }

    #[test]
    fn wav_write_then_read_keeps_spec() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("tone.wav");
        let audio = AudioBuffer::new(vec![0.0, 0.5, -0.5, 0.25], 2, 22_050);
        write_wav(&path, &audio).expect("write");

        let loaded = read_wav(&path).expect("read");
        assert_eq!(loaded.channels, 2);
        assert_eq!(loaded.sample_rate, 22_050);
        assert_eq!(loaded.samples.len(), 4);
        assert!((loaded.samples[1] - 0.5).abs() < 1e-3);
        assert!((loaded.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn convert_produces_mono_at_target_rate() {
        let dir = tempdir().expect("temp dir");
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out/converted.wav");
        write_wav(&input, &AudioBuffer::new(vec![0.1; 2 * 4_410], 2, 44_100)).expect("write");

        convert(&input, &output, 22_050).expect("convert");
        let loaded = read_wav(&output).expect("read");
        assert_eq!(loaded.channels, 1);
        assert_eq!(loaded.sample_rate, 22_050);
    }
}
