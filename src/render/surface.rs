use crate::assets::store::PreparedImage;
use crate::foundation::core::{Canvas, Point, Rect, Rgba8};
use crate::foundation::error::ReelResult;
use crate::render::backend::FrameRGBA;

/// Horizontal anchoring of a text line relative to its origin `x`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
}

/// 2D drawing context bound to a fixed-size pixel buffer.
///
/// Coordinates are canvas pixels with the origin at the top-left. Text origins are the top of the
/// line box (`y`) and the anchor given by [`TextAlign`] (`x`). Each slide is painted by a
/// [`DrawSurface::clear`] followed by draw calls; [`DrawSurface::snapshot`] reads back the result
/// for capture.
pub trait DrawSurface: Send {
    fn canvas(&self) -> Canvas;

    /// Start a new frame filled with `color`.
    fn clear(&mut self, color: Rgba8);

    fn fill_rect(&mut self, rect: Rect, color: Rgba8);

    fn stroke_rect(&mut self, rect: Rect, width: f64, color: Rgba8);

    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba8);

    /// Draw a single line of text (no wrapping).
    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        size: f64,
        color: Rgba8,
        align: TextAlign,
    ) -> ReelResult<()>;

    /// Advance width of `text` rendered as a single line at `size`.
    fn measure_text(&mut self, text: &str, size: f64) -> f64;

    /// Draw `image` scaled to exactly fill `rect`.
    fn draw_image(&mut self, rect: Rect, image: &PreparedImage) -> ReelResult<()>;

    /// Read back the current frame.
    fn snapshot(&mut self) -> ReelResult<FrameRGBA>;
}
