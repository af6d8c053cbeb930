use std::path::{Path, PathBuf};

/// Per-run artifact directories: `<runs_dir>/<run_id>/{text,audio,video}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirs {
    root: PathBuf,
}

impl RunDirs {
    pub fn new(runs_dir: &Path, run_id: &str) -> Self {
        Self {
            root: runs_dir.join(run_id),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn text_dir(&self) -> PathBuf {
        self.root.join("text")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn video_dir(&self) -> PathBuf {
        self.root.join("video")
    }

    pub fn text_file(&self) -> PathBuf {
        self.text_dir().join("payload.json")
    }

    pub fn audio_file(&self) -> PathBuf {
        self.audio_dir().join("main.mp3")
    }

    pub fn video_file(&self) -> PathBuf {
        self.video_dir().join("main.mp4")
    }

    /// Create all three directories. Idempotent.
    pub async fn create(&self) -> std::io::Result<()> {
        for dir in [self.text_dir(), self.audio_dir(), self.video_dir()] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
