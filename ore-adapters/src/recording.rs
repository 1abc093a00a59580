//! Recorded-frame playback
//!
//! A recording is newline-delimited JSON, one [`RecordedFrame`] per line,
//! optionally zstd-compressed (files ending in `.zst`). Frames are stored in
//! the producer's raw layout so playback goes through the same sentinel
//! conversion as live data.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ore_core::raw::RawFrame;
use ore_core::{adapter::FrameAdapter, model::Frame};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp: DateTime<Utc>,
    pub raw: RawFrame,
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

/// A fully loaded recording
#[derive(Debug, Clone, Default)]
pub struct Recording {
    frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening recording {}", path.display()))?;
        let reader: Box<dyn Read> = if is_compressed(path) {
            Box::new(zstd::stream::read::Decoder::new(file)?)
        } else {
            Box::new(file)
        };
        Self::from_reader(BufReader::new(reader))
            .with_context(|| format!("reading recording {}", path.display()))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut frames = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let frame: RecordedFrame =
                serde_json::from_str(&line).with_context(|| format!("line {}", index + 1))?;
            frames.push(frame);
        }
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RecordedFrame> {
        self.frames.get(index)
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<File>>),
}

/// Appends frames to a new recording file
pub struct RecordingWriter {
    sink: Sink,
    written: usize,
}

impl RecordingWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = BufWriter::new(
            File::create(path).with_context(|| format!("creating recording {}", path.display()))?,
        );
        let sink = if is_compressed(path) {
            Sink::Zstd(zstd::stream::write::Encoder::new(file, ZSTD_LEVEL)?)
        } else {
            Sink::Plain(file)
        };
        Ok(Self { sink, written: 0 })
    }

    pub fn write(&mut self, timestamp: DateTime<Utc>, raw: &RawFrame) -> Result<()> {
        let mut line = serde_json::to_vec(&RecordedFrame {
            timestamp,
            raw: raw.clone(),
        })?;
        line.push(b'\n');
        match &mut self.sink {
            Sink::Plain(w) => w.write_all(&line)?,
            Sink::Zstd(w) => w.write_all(&line)?,
        }
        self.written += 1;
        Ok(())
    }

    /// Flush and close the file; returns the number of frames written
    pub fn finish(self) -> Result<usize> {
        match self.sink {
            Sink::Plain(mut w) => w.flush()?,
            Sink::Zstd(encoder) => encoder.finish()?.flush()?,
        }
        Ok(self.written)
    }
}

/// Plays a recording back one frame per `read_frame` call
pub struct RecordingAdapter {
    path: PathBuf,
    recording: Option<Recording>,
    cursor: usize,
    looping: bool,
}

impl RecordingAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recording: None,
            cursor: 0,
            looping: false,
        }
    }

    /// Start over from the first frame once the end is reached
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames still to play, if loaded
    pub fn remaining(&self) -> Option<usize> {
        self.recording
            .as_ref()
            .map(|r| r.len().saturating_sub(self.cursor))
    }
}

impl FrameAdapter for RecordingAdapter {
    fn key(&self) -> &str {
        "recording"
    }

    fn name(&self) -> &str {
        "Recording"
    }

    fn detect(&self) -> bool {
        self.path.is_file()
    }

    fn start(&mut self) -> Result<()> {
        let recording = Recording::open(&self.path)?;
        if recording.is_empty() {
            warn!("recording {} holds no frames", self.path.display());
        }
        info!(
            "playing {} frames from {}",
            recording.len(),
            self.path.display()
        );
        self.recording = Some(recording);
        self.cursor = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.recording = None;
        self.cursor = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(recording) = &self.recording else {
            return Ok(None);
        };
        if self.cursor >= recording.len() && self.looping {
            self.cursor = 0;
        }
        let Some(recorded) = recording.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(Frame::from_raw(&recorded.raw, recorded.timestamp)))
    }

    fn is_active(&self) -> bool {
        self.recording.is_some()
    }
}
