use std::io::Write;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use parking_lot::Mutex;

use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};
use crate::record::recorder::{
    MediaRecorder, RecordedMedia, RecorderConfig, RecorderEvent, RecorderState, check_started,
};
use crate::render::backend::FrameRGBA;

/// NeuQuant sampling speed (1 = best quality, 30 = fastest).
const GIF_SPEED: i32 = 10;

/// `Write` target shared between the encoder and the recorder so bytes can be read while encoding.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct Active {
    config: RecorderConfig,
    events: Sender<RecorderEvent>,
    encoder: GifEncoder<SharedBuf>,
    buf: SharedBuf,
    emitted: usize,
    /// Last captured frame (straight alpha) and how many consecutive captures it covers.
    pending: Option<(Vec<u8>, u64)>,
    frames: u64,
}

/// Animated GIF recorder.
///
/// Consecutive identical frames are merged into one GIF frame with a longer delay, so static
/// slides cost one frame each.
#[derive(Default)]
pub struct GifRecorder {
    active: Option<Active>,
}

impl GifRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for GifRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GifRecorder")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Display time of `count` frames at `fps`.
fn frame_delay(fps: Fps, count: u64) -> Delay {
    let numer = count
        .saturating_mul(1000)
        .saturating_mul(u64::from(fps.den))
        .min(u64::from(u32::MAX)) as u32;
    Delay::from_numer_denom_ms(numer, fps.num)
}

impl Active {
    fn flush_pending(&mut self) -> ReelResult<()> {
        let Some((rgba, count)) = self.pending.take() else {
            return Ok(());
        };
        let canvas = self.config.canvas;
        let img = RgbaImage::from_raw(canvas.width, canvas.height, rgba)
            .ok_or_else(|| ReelError::recorder("gif frame buffer size mismatch"))?;
        let frame = Frame::from_parts(img, 0, 0, frame_delay(self.config.fps, count));
        self.encoder
            .encode_frame(frame)
            .map_err(|e| ReelError::recorder(format!("gif encode failed: {e}")))?;
        self.emit_chunk();
        Ok(())
    }

    fn emit_chunk(&mut self) {
        let chunk = {
            let buf = self.buf.0.lock();
            if buf.len() <= self.emitted {
                return;
            }
            buf[self.emitted..].to_vec()
        };
        self.emitted += chunk.len();
        // A dropped receiver only means nobody listens for chunks.
        let _ = self.events.send(RecorderEvent::Chunk { bytes: chunk });
    }
}

impl MediaRecorder for GifRecorder {
    fn state(&self) -> RecorderState {
        if self.active.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Inactive
        }
    }

    fn start(&mut self, config: RecorderConfig, events: Sender<RecorderEvent>) -> ReelResult<()> {
        if self.active.is_some() {
            return Err(ReelError::recorder("gif recorder already started"));
        }
        config.canvas.validate()?;
        if config.canvas.width > u32::from(u16::MAX) || config.canvas.height > u32::from(u16::MAX)
        {
            return Err(ReelError::setup("gif dimensions are limited to 65535"));
        }

        let buf = SharedBuf::default();
        let mut encoder = GifEncoder::new_with_speed(buf.clone(), GIF_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| ReelError::setup(format!("gif encoder setup failed: {e}")))?;

        tracing::debug!(
            width = config.canvas.width,
            height = config.canvas.height,
            fps = config.fps.as_f64(),
            "gif recorder started"
        );
        self.active = Some(Active {
            config,
            events,
            encoder,
            buf,
            emitted: 0,
            pending: None,
            frames: 0,
        });
        Ok(())
    }

    fn capture(&mut self, frame: &FrameRGBA) -> ReelResult<()> {
        check_started(self.state(), "gif recorder")?;
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        frame.check_size(active.config.canvas)?;

        let rgba = frame.to_straight_rgba8();
        active.frames += 1;
        if let Some((last, count)) = active.pending.as_mut()
            && *last == rgba
        {
            *count += 1;
            return Ok(());
        }
        active.flush_pending()?;
        active.pending = Some((rgba, 1));
        Ok(())
    }

    fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let result = active.flush_pending();
        let Active {
            events,
            encoder,
            buf,
            frames,
            ..
        } = active;
        // Dropping the encoder writes the GIF trailer.
        drop(encoder);

        let event = match result {
            Ok(()) => {
                let bytes = std::mem::take(&mut *buf.0.lock());
                tracing::debug!(bytes = bytes.len(), frames, "gif recorder finalized");
                RecorderEvent::Stopped(RecordedMedia {
                    bytes,
                    mime: "image/gif".to_owned(),
                    path: None,
                    frames,
                })
            }
            Err(e) => RecorderEvent::Error(e.to_string()),
        };
        let _ = events.send(event);
    }
}
