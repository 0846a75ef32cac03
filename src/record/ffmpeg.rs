use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::Sender;

use anyhow::Context as _;

use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::flatten_premul_over_bg_to_opaque_rgba8;
use crate::record::recorder::{
    MediaRecorder, RecordedMedia, RecorderConfig, RecorderEvent, RecorderState, check_started,
};
use crate::render::backend::FrameRGBA;

/// Options for [`FfmpegRecorder`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FfmpegRecorderOpts {
    /// Output MP4 path. When unset, the composer's suggested output path is used.
    pub out_path: Option<PathBuf>,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
    /// x264 constant rate factor.
    pub crf: u8,
    /// x264 preset.
    pub preset: String,
}

impl Default for FfmpegRecorderOpts {
    fn default() -> Self {
        Self {
            out_path: None,
            overwrite: true,
            crf: 23,
            preset: "veryfast".to_owned(),
        }
    }
}

struct Running {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    events: Sender<RecorderEvent>,
    out_path: PathBuf,
    bg_rgb: [u8; 3],
    canvas: crate::foundation::core::Canvas,
    scratch: Vec<u8>,
    frames: u64,
}

/// MP4 recorder that spawns the system `ffmpeg` and streams raw RGBA frames to its stdin.
pub struct FfmpegRecorder {
    opts: FfmpegRecorderOpts,
    running: Option<Running>,
}

impl std::fmt::Debug for FfmpegRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegRecorder")
            .field("opts", &self.opts)
            .field("state", &self.state())
            .finish()
    }
}

impl FfmpegRecorder {
    pub fn new(opts: FfmpegRecorderOpts) -> Self {
        Self {
            opts,
            running: None,
        }
    }

    fn out_path(&self) -> ReelResult<PathBuf> {
        self.opts
            .out_path
            .clone()
            .ok_or_else(|| ReelError::setup("ffmpeg recorder has no output path"))
    }

    fn build_command(&self, config: &RecorderConfig, out_path: &Path) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.opts.overwrite { "-y" } else { "-n" });

        // Frames arrive premultiplied; they are flattened to opaque RGBA before writing.
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", config.canvas.width, config.canvas.height),
        ]);
        push_input_fps(&mut cmd, config.fps);
        cmd.args(["-i", "pipe:0"]);
        cmd.args([
            "-an",
            "-c:v",
            "libx264",
            "-preset",
            &self.opts.preset,
            "-crf",
            &self.opts.crf.to_string(),
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]);
        cmd.arg(out_path);
        cmd
    }
}

impl Running {
    /// Close stdin, wait for ffmpeg, and read back the encoded file.
    fn finish(mut self) -> (Sender<RecorderEvent>, ReelResult<RecordedMedia>) {
        drop(self.stdin.take());
        let result = (|| -> ReelResult<RecordedMedia> {
            let status = self.child.wait().map_err(|e| {
                ReelError::recorder(format!("failed to wait for ffmpeg to finish: {e}"))
            })?;
            let stderr_bytes = match self.stderr_drain.take() {
                Some(handle) => handle
                    .join()
                    .map_err(|_| ReelError::recorder("ffmpeg stderr drain thread panicked"))?
                    .map_err(|e| ReelError::recorder(format!("ffmpeg stderr read failed: {e}")))?,
                None => Vec::new(),
            };
            if !status.success() {
                let stderr = String::from_utf8_lossy(&stderr_bytes);
                return Err(ReelError::recorder(format!(
                    "ffmpeg exited with status {status}: {}",
                    stderr.trim()
                )));
            }
            let bytes = std::fs::read(&self.out_path).with_context(|| {
                format!("read encoded output '{}'", self.out_path.display())
            })?;
            Ok(RecordedMedia {
                bytes,
                mime: "video/mp4".to_owned(),
                path: Some(self.out_path.clone()),
                frames: self.frames,
            })
        })();
        (self.events, result)
    }
}

impl MediaRecorder for FfmpegRecorder {
    fn state(&self) -> RecorderState {
        if self.running.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Inactive
        }
    }

    fn start(&mut self, config: RecorderConfig, events: Sender<RecorderEvent>) -> ReelResult<()> {
        if self.running.is_some() {
            return Err(ReelError::recorder("ffmpeg recorder already started"));
        }
        config.canvas.validate()?;
        if !config.canvas.width.is_multiple_of(2) || !config.canvas.height.is_multiple_of(2) {
            return Err(ReelError::setup(
                "ffmpeg recorder width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        let out_path = self.out_path()?;
        ensure_parent_dir(&out_path)?;
        if !self.opts.overwrite && out_path.exists() {
            return Err(ReelError::setup(format!(
                "output file '{}' already exists",
                out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(ReelError::setup(
                "ffmpeg is required for MP4 recording, but was not found on PATH",
            ));
        }

        let mut child = self.build_command(&config, &out_path).spawn().map_err(|e| {
            ReelError::setup(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::setup("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::setup("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::Builder::new()
            .name("ffmpeg-stderr".to_owned())
            .spawn(move || {
                let mut bytes = Vec::new();
                stderr.read_to_end(&mut bytes)?;
                Ok(bytes)
            })
            .context("spawn ffmpeg stderr drain thread")?;

        tracing::info!(out = %out_path.display(), "ffmpeg recorder started");
        self.running = Some(Running {
            child,
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            events,
            out_path,
            bg_rgb: [config.background.r, config.background.g, config.background.b],
            canvas: config.canvas,
            scratch: vec![0u8; config.canvas.rgba_len()],
            frames: 0,
        });
        Ok(())
    }

    fn capture(&mut self, frame: &FrameRGBA) -> ReelResult<()> {
        check_started(self.state(), "ffmpeg recorder")?;
        let Some(run) = self.running.as_mut() else {
            return Ok(());
        };
        frame.check_size(run.canvas)?;

        if frame.premultiplied {
            flatten_premul_over_bg_to_opaque_rgba8(&mut run.scratch, &frame.data, run.bg_rgb)?;
        } else {
            let mut premul = frame.data.clone();
            crate::foundation::math::premultiply_rgba8_in_place(&mut premul);
            flatten_premul_over_bg_to_opaque_rgba8(&mut run.scratch, &premul, run.bg_rgb)?;
        }

        let Some(stdin) = run.stdin.as_mut() else {
            return Err(ReelError::recorder("ffmpeg recorder is already finalized"));
        };
        stdin.write_all(&run.scratch).map_err(|e| {
            ReelError::recorder(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        run.frames += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let Some(run) = self.running.take() else {
            return;
        };
        let (events, result) = run.finish();
        let event = match result {
            Ok(media) => {
                tracing::info!(bytes = media.bytes.len(), frames = media.frames, "ffmpeg recorder finalized");
                RecorderEvent::Stopped(media)
            }
            Err(e) => {
                tracing::warn!(error = %e, "ffmpeg recorder failed to finalize");
                RecorderEvent::Error(e.to_string())
            }
        };
        let _ = events.send(event);
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input, `-r` before `-i` sets the input framerate.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
