//! YouTube audio download through the `yt-dlp` command line tool.

use std::{
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("no title reported for {0}")]
    EmptyTitle(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Path or name of the yt-dlp executable.
    pub ytdlp: String,
    pub audio_format: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ytdlp: "yt-dlp".into(),
            audio_format: "wav".into(),
        }
    }
}

fn run(tool: &str, args: &[&str]) -> Result<String, DownloadError> {
    log::debug!("running {} {}", tool, args.join(" "));
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|source| DownloadError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(DownloadError::ToolFailed {
            tool: tool.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn video_title(url: &str, config: &DownloadConfig) -> Result<String, DownloadError> {
    let stdout = run(&config.ytdlp, &["--skip-download", "--print", "title", url])?;
    let title = stdout.lines().next().unwrap_or("").trim().to_string();
    if title.is_empty() {
        return Err(DownloadError::EmptyTitle(url.to_string()));
    }
    Ok(title)
}

/// Every non-alphanumeric character becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Downloads the best audio stream of `url` to `<output_dir>/<title>.<format>`.
pub fn download_audio(
    url: &str,
    output_dir: &Path,
    config: &DownloadConfig,
) -> Result<PathBuf, DownloadError> {
    let title = sanitize_filename(&video_title(url, config)?);
    std::fs::create_dir_all(output_dir)?;

    let template = output_dir.join(format!("{}.%(ext)s", title));
    let template = template.to_string_lossy();
    run(
        &config.ytdlp,
        &[
            "--quiet",
            "-f",
            "bestaudio",
            "-x",
            "--audio-format",
            config.audio_format.as_str(),
            "-o",
            template.as_ref(),
            url,
        ],
    )?;

    let path = output_dir.join(format!("{}.{}", title, config.audio_format));
    log::info!("Download and processing complete for {} -> {}", url, path.display());
    Ok(path)
}

/// URLs from a list, one per line; blank lines and `#` comments are ignored.
pub fn parse_url_list(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

/// Downloads every URL, logging and skipping the ones that fail.
pub fn download_list(urls: &[&str], output_dir: &Path, config: &DownloadConfig) -> Vec<PathBuf> {
    let mut saved = Vec::new();
    for url in urls {
        match download_audio(url, output_dir, config) {
            Ok(path) => saved.push(path),
            Err(e) => log::error!("Failed to download {}: {}", url, e),
        }
    }
    saved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_unicode_letters() {
        assert_eq!(sanitize_filename("Obama: Speech #3"), "Obama__Speech__3");
        assert_eq!(sanitize_filename("Bản tin 24/7"), "Bản_tin_24_7");
    }

    #[test]
    fn url_list_skips_blanks_and_comments() {
        let content = "https://youtu.be/a\n\n  # later\n https://youtu.be/b  \n";
        assert_eq!(
            parse_url_list(content),
            vec!["https://youtu.be/a", "https://youtu.be/b"]
        );
    }

    #[test]
    fn missing_tool_is_a_spawn_error() {
        let config = DownloadConfig {
            ytdlp: "definitely-not-a-real-yt-dlp-binary".into(),
            ..DownloadConfig::default()
        };
        let err = video_title("https://youtu.be/a", &config).unwrap_err();
        assert!(matches!(err, DownloadError::Spawn { .. }), "{err}");
    }

    #[test]
    fn failed_list_entries_are_skipped() {
        let config = DownloadConfig {
            ytdlp: "definitely-not-a-real-yt-dlp-binary".into(),
            ..DownloadConfig::default()
        };
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(download_list(&["https://youtu.be/a"], dir.path(), &config).is_empty());
    }
}
