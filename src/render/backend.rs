use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::cpu::{CpuSurface, CpuSurfaceOpts};
use crate::render::recording::RecordingSurface;
use crate::render::surface::DrawSurface;
use std::path::PathBuf;

/// A rendered frame as RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// A frame filled with one premultiplied RGBA8 value.
    pub fn solid(canvas: Canvas, premul_rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(canvas.rgba_len());
        for _ in 0..(canvas.rgba_len() / 4) {
            data.extend_from_slice(&premul_rgba);
        }
        Self {
            width: canvas.width,
            height: canvas.height,
            data,
            premultiplied: true,
        }
    }

    /// Copy out straight-alpha RGBA8 bytes.
    pub fn to_straight_rgba8(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if self.premultiplied {
            crate::foundation::math::unpremultiply_rgba8_in_place(&mut out);
        }
        out
    }

    pub(crate) fn check_size(&self, canvas: Canvas) -> ReelResult<()> {
        if self.width != canvas.width || self.height != canvas.height {
            return Err(ReelError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                self.width, self.height, canvas.width, canvas.height
            )));
        }
        if self.data.len() != canvas.rgba_len() {
            return Err(ReelError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }
        Ok(())
    }
}

/// Available drawing surfaces.
#[derive(Clone, Debug)]
pub enum SurfaceKind {
    /// CPU raster surface powered by `vello_cpu`, text shaped by `parley` from `font_path`.
    Cpu { font_path: PathBuf },
    /// Draw-op log with deterministic text metrics; produces solid background frames.
    Recording,
}

/// Creates the drawing surface for a generation run.
///
/// Failing here is a setup error: the run is rejected before any recording starts.
pub trait SurfaceFactory: Send + Sync {
    fn create_surface(&self, canvas: Canvas) -> ReelResult<Box<dyn DrawSurface>>;
}

impl SurfaceFactory for SurfaceKind {
    fn create_surface(&self, canvas: Canvas) -> ReelResult<Box<dyn DrawSurface>> {
        canvas.validate()?;
        match self {
            Self::Cpu { font_path } => {
                let opts = CpuSurfaceOpts::from_font_path(font_path)?;
                Ok(Box::new(CpuSurface::new(canvas, opts)?))
            }
            Self::Recording => Ok(Box::new(RecordingSurface::new(canvas))),
        }
    }
}

impl<F> SurfaceFactory for F
where
    F: Fn(Canvas) -> ReelResult<Box<dyn DrawSurface>> + Send + Sync,
{
    fn create_surface(&self, canvas: Canvas) -> ReelResult<Box<dyn DrawSurface>> {
        self(canvas)
    }
}
