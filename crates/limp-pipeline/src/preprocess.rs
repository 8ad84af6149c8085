//! Frame and audio extraction with ffmpeg.

use crate::store::EpisodeLayout;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, warn};

pub const FRAME_PATTERN: &str = "frame_%04d.jpg";

/// ffmpeg runs longer than any model call; one hour covers a long hand.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct Preprocessor {
    pub ffmpeg: PathBuf,
    pub fps: f64,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub frames: usize,
    /// `None` when the video has no usable audio track.
    pub audio: Option<PathBuf>,
}

impl Preprocessor {
    pub fn new(fps: f64) -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            fps,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    pub fn frame_args(&self, video: &Path, frames_dir: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            video.display().to_string(),
            "-vf".to_string(),
            format!("fps={}", self.fps),
            "-q:v".to_string(),
            "2".to_string(),
            frames_dir.join(FRAME_PATTERN).display().to_string(),
        ]
    }

    pub fn audio_args(&self, video: &Path, audio: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            video.display().to_string(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            "16000".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            audio.display().to_string(),
        ]
    }

    async fn ffmpeg(&self, step: &str, args: &[String]) -> Result<()> {
        let child = Command::new(&self.ffmpeg)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn {:?} for {step}", self.ffmpeg))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow::anyhow!("ffmpeg {} timed out after {} seconds", step, self.timeout.as_secs())
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            bail!(
                "ffmpeg {} exited with {}: {}",
                step,
                output.status.code().unwrap_or(-1),
                tail
            );
        }
        Ok(())
    }

    /// Extract frames and audio for `video` into `layout`.
    ///
    /// Frame extraction failing is an error. Audio failing only means the
    /// episode has no narration.
    pub async fn extract(&self, video: &Path, layout: &EpisodeLayout) -> Result<Extracted> {
        if !video.is_file() {
            bail!("video not found: {:?}", video);
        }
        let started = Instant::now();
        let frames_dir = layout.frames_dir();
        std::fs::create_dir_all(&frames_dir).with_context(|| format!("create {:?}", frames_dir))?;

        self.ffmpeg("frames", &self.frame_args(video, &frames_dir)).await?;
        let frames = std::fs::read_dir(&frames_dir)
            .with_context(|| format!("read {:?}", frames_dir))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "jpg").unwrap_or(false))
            .count();
        if frames == 0 {
            bail!("ffmpeg produced no frames for {:?}", video);
        }

        let audio_path = layout.audio();
        let audio = match self.ffmpeg("audio", &self.audio_args(video, &audio_path)).await {
            Ok(()) => Some(audio_path),
            Err(e) => {
                warn!(episode_id = %layout.id, error = %e, "No audio track extracted");
                None
            }
        };

        info!(
            episode_id = %layout.id,
            frames = frames,
            audio = audio.is_some(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Preprocessed video"
        );
        Ok(Extracted { frames, audio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_args_sample_at_fps() {
        let p = Preprocessor::new(2.0);
        let args = p.frame_args(Path::new("/in/hand.mp4"), Path::new("/out/hand/frames"));
        assert_eq!(
            args,
            vec!["-y", "-i", "/in/hand.mp4", "-vf", "fps=2", "-q:v", "2", "/out/hand/frames/frame_%04d.jpg"]
        );
    }

    #[test]
    fn audio_args_are_mono_16k_pcm() {
        let p = Preprocessor::new(1.0);
        let args = p.audio_args(Path::new("hand.mp4"), Path::new("audio.wav"));
        assert_eq!(args[3..7], ["-vn", "-acodec", "pcm_s16le", "-ar"]);
        assert_eq!(args.last().map(String::as_str), Some("audio.wav"));
    }

    #[tokio::test]
    async fn missing_video_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = EpisodeLayout::new(dir.path(), "hand");
        let err = Preprocessor::new(1.0)
            .extract(&dir.path().join("nope.mp4"), &layout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("video not found"));
    }

    #[tokio::test]
    async fn failing_ffmpeg_surfaces_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("hand.mp4");
        std::fs::write(&video, b"not a video").unwrap();
        let layout = EpisodeLayout::new(dir.path(), "hand");
        let err = Preprocessor::new(1.0)
            .with_ffmpeg("false")
            .extract(&video, &layout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ffmpeg frames exited"));
    }
}
