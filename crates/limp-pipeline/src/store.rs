//! On-disk episode layout and atomic artifact writes.
//!
//! ```text
//! <output_root>/<episode_id>/
//!   frames/frame_0001.jpg ...
//!   audio.wav
//!   metadata.json            (optional, privileged)
//!   perception_output.json
//!   ground_truth.json
//!   qa_dataset.json
//!   reasoning_results.json
//!   evaluation_report.json
//!   evaluation_report.md
//!   run_result.json
//! ```

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const PERCEPTION_FILE: &str = "perception_output.json";
pub const GROUND_TRUTH_FILE: &str = "ground_truth.json";
pub const QA_FILE: &str = "qa_dataset.json";
pub const REASONING_FILE: &str = "reasoning_results.json";
pub const EVALUATION_JSON_FILE: &str = "evaluation_report.json";
pub const EVALUATION_MD_FILE: &str = "evaluation_report.md";
pub const RUN_RESULT_FILE: &str = "run_result.json";
pub const METADATA_FILE: &str = "metadata.json";

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "mkv", "webm"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeLayout {
    pub id: String,
    pub dir: PathBuf,
}

impl EpisodeLayout {
    pub fn new(output_root: &Path, episode_id: &str) -> Self {
        Self {
            id: episode_id.to_string(),
            dir: output_root.join(episode_id),
        }
    }

    /// Layout for an existing episode directory; the id is its name.
    pub fn from_dir(dir: &Path) -> Self {
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "episode".to_string());
        Self {
            id,
            dir: dir.to_path_buf(),
        }
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.dir.join("frames")
    }

    pub fn audio(&self) -> PathBuf {
        self.dir.join("audio.wav")
    }

    pub fn metadata(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn perception(&self) -> PathBuf {
        self.dir.join(PERCEPTION_FILE)
    }

    pub fn ground_truth(&self) -> PathBuf {
        self.dir.join(GROUND_TRUTH_FILE)
    }

    pub fn questions(&self) -> PathBuf {
        self.dir.join(QA_FILE)
    }

    pub fn reasoning(&self) -> PathBuf {
        self.dir.join(REASONING_FILE)
    }

    pub fn evaluation_json(&self) -> PathBuf {
        self.dir.join(EVALUATION_JSON_FILE)
    }

    pub fn evaluation_md(&self) -> PathBuf {
        self.dir.join(EVALUATION_MD_FILE)
    }

    pub fn run_result(&self) -> PathBuf {
        self.dir.join(RUN_RESULT_FILE)
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
///
/// Readers see either the previous file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    let mut tmp = NamedTempFile::new_in(dir).with_context(|| format!("tempfile in {:?}", dir))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write {:?}", tmp.path()))?;
    tmp.as_file().sync_all().ok();
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("persist {:?}", path))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {:?}", path.file_name().unwrap_or_default()))?;
    write_atomic(path, json.as_bytes())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("parse {:?}", path))
}

/// Like [`read_json`], but a missing file is `None`.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

/// Episode directories under `root`: any subdirectory holding frames or a
/// perception output. Sorted by name.
pub fn discover_episodes(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("read {:?}", root))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .filter(|p| p.join("frames").is_dir() || p.join(PERCEPTION_FILE).is_file())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Video files directly under `root`, sorted by name.
pub fn discover_videos(root: &Path) -> Result<Vec<PathBuf>> {
    let mut videos: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("read {:?}", root))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| VIDEO_EXTENSIONS.iter().any(|v| e.eq_ignore_ascii_case(v)))
                .unwrap_or(false)
        })
        .collect();
    videos.sort();
    Ok(videos)
}

/// Episode id for a video: its file stem.
pub fn episode_id_for_video(video: &Path) -> String {
    video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "episode".to_string())
}
