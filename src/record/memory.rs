use std::sync::Arc;
use std::sync::mpsc::Sender;

use parking_lot::Mutex;

use crate::foundation::error::{ReelError, ReelResult};
use crate::record::recorder::{
    MediaRecorder, RecordedMedia, RecorderConfig, RecorderEvent, RecorderState, check_started,
};
use crate::render::backend::FrameRGBA;

/// MIME type of the raw payload: straight RGBA8 frames, back to back.
pub const RAW_RGBA_MIME: &str = "video/x-raw-rgba";

/// Recorder that keeps captured frames in memory, for tests and debugging.
///
/// Frames are shared through [`InMemoryRecorder::frames`] so they stay reachable after the recorder
/// has been handed to a composer.
#[derive(Debug)]
pub struct InMemoryRecorder {
    frames: Arc<Mutex<Vec<FrameRGBA>>>,
    config: Option<RecorderConfig>,
    events: Option<Sender<RecorderEvent>>,
    /// Sender kept alive after a silent stop so receivers see a stall, not a disconnect.
    parked: Option<Sender<RecorderEvent>>,
    fail_after: Option<u64>,
    finalize: bool,
    captured: u64,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self {
            frames: Arc::default(),
            config: None,
            events: None,
            parked: None,
            fail_after: None,
            finalize: true,
            captured: 0,
        }
    }

    /// Make `capture` fail once `n` frames have been captured.
    pub fn fail_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Never send `Stopped`, as a hung encoder would.
    pub fn without_finalize(mut self) -> Self {
        self.finalize = false;
        self
    }

    pub fn frames(&self) -> Arc<Mutex<Vec<FrameRGBA>>> {
        Arc::clone(&self.frames)
    }

    pub fn config(&self) -> Option<RecorderConfig> {
        self.config
    }
}

impl Default for InMemoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaRecorder for InMemoryRecorder {
    fn state(&self) -> RecorderState {
        if self.events.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Inactive
        }
    }

    fn start(&mut self, config: RecorderConfig, events: Sender<RecorderEvent>) -> ReelResult<()> {
        if self.events.is_some() {
            return Err(ReelError::recorder("in-memory recorder already started"));
        }
        self.frames.lock().clear();
        self.captured = 0;
        self.config = Some(config);
        self.events = Some(events);
        Ok(())
    }

    fn capture(&mut self, frame: &FrameRGBA) -> ReelResult<()> {
        check_started(self.state(), "in-memory recorder")?;
        if let Some(config) = self.config {
            frame.check_size(config.canvas)?;
        }
        if self.fail_after.is_some_and(|n| self.captured >= n) {
            return Err(ReelError::recorder(format!(
                "injected capture failure after {} frames",
                self.captured
            )));
        }
        self.frames.lock().push(frame.clone());
        self.captured += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let Some(events) = self.events.take() else {
            return;
        };
        if !self.finalize {
            self.parked = Some(events);
            return;
        }
        let bytes = self
            .frames
            .lock()
            .iter()
            .flat_map(FrameRGBA::to_straight_rgba8)
            .collect::<Vec<_>>();
        let _ = events.send(RecorderEvent::Stopped(RecordedMedia {
            bytes,
            mime: RAW_RGBA_MIME.to_owned(),
            path: None,
            frames: self.captured,
        }));
    }
}
