use anyhow::Result;
use ffshrink::engine::{EncodeRequest, MediaEncoder, MediaInfo, MediaProber};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

pub const MB: u64 = 1024 * 1024;

/// Prober that reports the same info for every path
pub struct FakeProber {
    pub info: MediaInfo,
    pub calls: RefCell<Vec<PathBuf>>,
}

impl FakeProber {
    pub fn new(duration_seconds: f64, size_bytes: u64) -> Self {
        Self {
            info: MediaInfo {
                duration_seconds,
                size_bytes,
            },
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl MediaProber for FakeProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        self.calls.borrow_mut().push(path.to_path_buf());
        Ok(self.info)
    }
}

/// Prober that always fails, like ffprobe on a non-media file
pub struct BrokenProber;

impl MediaProber for BrokenProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        anyhow::bail!("Invalid data found when processing input: {}", path.display())
    }
}

/// Scripted result for one encode attempt
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Write an output of this many bytes and succeed
    Write(u64),
    /// Leave a partial output behind and fail
    Fail,
}

/// Encoder that plays back a script of attempt results and records every request
pub struct FakeEncoder {
    script: Vec<Step>,
    pub requests: RefCell<Vec<EncodeRequest>>,
    /// Paths of other files present next to the output when each attempt started
    pub siblings_seen: RefCell<Vec<Vec<PathBuf>>>,
}

impl FakeEncoder {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            requests: RefCell::new(Vec::new()),
            siblings_seen: RefCell::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn request(&self, n: usize) -> EncodeRequest {
        self.requests.borrow()[n].clone()
    }
}

impl MediaEncoder for FakeEncoder {
    fn encode(&self, request: &EncodeRequest) -> Result<()> {
        let n = self.attempts();
        self.requests.borrow_mut().push(request.clone());

        if let Some(dir) = request.output_path.parent() {
            let mut siblings: Vec<PathBuf> = fs::read_dir(dir)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .collect();
            siblings.sort();
            self.siblings_seen.borrow_mut().push(siblings);
        }

        match self.script.get(n).copied() {
            Some(Step::Write(bytes)) => {
                let file = fs::File::create(&request.output_path)?;
                file.set_len(bytes)?;
                Ok(())
            }
            Some(Step::Fail) => {
                fs::write(&request.output_path, b"truncated")?;
                anyhow::bail!("ffmpeg exited with exit status: 1")
            }
            None => anyhow::bail!("unexpected encode attempt {}", n + 1),
        }
    }
}
