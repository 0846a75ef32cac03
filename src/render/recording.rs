use crate::assets::store::PreparedImage;
use crate::foundation::core::{Canvas, Point, Rect, Rgba8};
use crate::foundation::error::ReelResult;
use crate::render::backend::FrameRGBA;
use crate::render::surface::{DrawSurface, TextAlign};
use crate::render::text::is_cjk;

/// One call recorded by [`RecordingSurface`].
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Clear(Rgba8),
    FillRect {
        rect: Rect,
        color: Rgba8,
    },
    StrokeRect {
        rect: Rect,
        width: f64,
        color: Rgba8,
    },
    FillCircle {
        center: Point,
        radius: f64,
        color: Rgba8,
    },
    Text {
        text: String,
        origin: Point,
        size: f64,
        color: Rgba8,
        align: TextAlign,
    },
    Image {
        rect: Rect,
        width: u32,
        height: u32,
    },
}

/// Surface that logs draw calls instead of rasterizing them.
///
/// Text is measured with fixed advances (one em for CJK characters, 0.55 em otherwise) so layout
/// decisions are reproducible without font files. Snapshots are solid frames in the last clear
/// color.
#[derive(Clone, Debug)]
pub struct RecordingSurface {
    canvas: Canvas,
    background: Rgba8,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            background: Rgba8::new(0, 0, 0, 0),
            ops: Vec::new(),
        }
    }

    /// Calls recorded since the last [`DrawSurface::clear`].
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Text of every `fill_text` call since the last clear, in draw order.
    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn background(&self) -> Rgba8 {
        self.background
    }

    /// Advance width the recording surface assigns to `text` at `size`.
    pub fn advance_of(text: &str, size: f64) -> f64 {
        text.chars()
            .map(|c| if is_cjk(c) { size } else { size * 0.55 })
            .sum()
    }
}

impl DrawSurface for RecordingSurface {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn clear(&mut self, color: Rgba8) {
        self.ops.clear();
        self.background = color;
        self.ops.push(DrawOp::Clear(color));
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba8) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }

    fn stroke_rect(&mut self, rect: Rect, width: f64, color: Rgba8) {
        self.ops.push(DrawOp::StrokeRect { rect, width, color });
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba8) {
        self.ops.push(DrawOp::FillCircle {
            center,
            radius,
            color,
        });
    }

    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        size: f64,
        color: Rgba8,
        align: TextAlign,
    ) -> ReelResult<()> {
        self.ops.push(DrawOp::Text {
            text: text.to_owned(),
            origin,
            size,
            color,
            align,
        });
        Ok(())
    }

    fn measure_text(&mut self, text: &str, size: f64) -> f64 {
        Self::advance_of(text, size)
    }

    fn draw_image(&mut self, rect: Rect, image: &PreparedImage) -> ReelResult<()> {
        self.ops.push(DrawOp::Image {
            rect,
            width: image.width,
            height: image.height,
        });
        Ok(())
    }

    fn snapshot(&mut self) -> ReelResult<FrameRGBA> {
        Ok(FrameRGBA::solid(
            self.canvas,
            self.background.to_premul_bytes(),
        ))
    }
}
