//! Episodes and their extracted media.

use crate::domain::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Visibility regime for private information.
///
/// `Audience` sees every player's hole cards; `Player` withholds the
/// opponents' cards from anything reaching the reasoning stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolMode {
    #[default]
    Audience,
    Player,
}

impl ProtocolMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolMode::Audience => "audience",
            ProtocolMode::Player => "player",
        }
    }
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audience" => Ok(ProtocolMode::Audience),
            "player" => Ok(ProtocolMode::Player),
            _ => Err(ConfigurationError::InvalidProtocolMode(s.to_string())),
        }
    }
}

/// A single extracted video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRef {
    pub index: usize,
    /// Seconds from the start of the episode.
    pub timestamp: f64,
    pub path: PathBuf,
}

/// Ordered frames extracted at a fixed rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSequence {
    pub fps: f64,
    pub frames: Vec<FrameRef>,
}

impl FrameSequence {
    /// Build a sequence from explicit frame paths, in the given order.
    pub fn from_paths(paths: Vec<PathBuf>, fps: f64) -> Self {
        let fps = if fps > 0.0 { fps } else { 1.0 };
        let frames = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| FrameRef {
                index,
                timestamp: index as f64 / fps,
                path,
            })
            .collect();
        Self { fps, frames }
    }

    /// Scan `dir` for `frame_*.jpg` files written by the preprocessor.
    pub fn from_dir(dir: &Path, fps: f64) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("frame_") && n.ends_with(".jpg"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(Self::from_paths(paths, fps))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// End of the covered interval: one frame period past the last frame.
    pub fn duration(&self) -> f64 {
        self.frames
            .last()
            .map(|f| f.timestamp + 1.0 / self.fps)
            .unwrap_or(0.0)
    }

    /// Every `interval`-th frame, starting with the first.
    pub fn sampled(&self, interval: usize) -> Vec<FrameRef> {
        self.frames
            .iter()
            .step_by(interval.max(1))
            .cloned()
            .collect()
    }
}

/// Metadata supplied alongside a recording. Privileged: only the
/// annotation stage may read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivilegedMetadata {
    #[serde(default)]
    pub hole_cards: BTreeMap<String, Vec<String>>,
    /// Player name to blind position (`SB` / `BB`).
    #[serde(default)]
    pub blinds: BTreeMap<String, String>,
}

/// A recorded hand after preprocessing.
#[derive(Debug, Clone)]
pub struct Episode {
    pub id: String,
    pub dir: PathBuf,
    pub frames: FrameSequence,
    pub audio: Option<PathBuf>,
    pub protocol: ProtocolMode,
    pub metadata: Option<PrivilegedMetadata>,
}
