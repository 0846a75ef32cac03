use crate::foundation::core::{Canvas, Point, Rect};

/// Fraction of the canvas width text may occupy before wrapping.
pub const MAX_TEXT_WIDTH_FRACTION: f64 = 0.9;

/// Line advance as a multiple of font size.
pub const LINE_HEIGHT: f64 = 1.35;

/// Canvas-relative geometry shared by every slide kind.
///
/// All slides split the canvas into a text region (upper half) and an image region (lower half).
/// Sizes scale with canvas width so portrait and landscape designs keep their proportions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlideLayout {
    pub canvas: Canvas,
    pub margin: f64,
    pub max_text_width: f64,
    pub text_region: Rect,
    pub image_region: Rect,
    pub title_size: f64,
    pub heading_size: f64,
    pub body_size: f64,
    pub caption_size: f64,
    pub badge_radius: f64,
}

impl SlideLayout {
    pub fn for_canvas(canvas: Canvas) -> Self {
        let w = canvas.width_f64();
        let h = canvas.height_f64();
        let margin = (w * 0.05).round();
        let mid = (h / 2.0).round();

        Self {
            canvas,
            margin,
            max_text_width: w * MAX_TEXT_WIDTH_FRACTION,
            text_region: Rect::new(margin, margin, w - margin, mid),
            image_region: Rect::new(margin, mid + margin / 2.0, w - margin, h - margin),
            title_size: (w * 0.075).max(8.0),
            heading_size: (w * 0.06).max(8.0),
            body_size: (w * 0.042).max(6.0),
            caption_size: (w * 0.035).max(6.0),
            badge_radius: (w * 0.055).max(6.0),
        }
    }

    pub fn center_x(&self) -> f64 {
        self.canvas.width_f64() / 2.0
    }

    /// Line advance for text at `size`.
    pub fn line_advance(size: f64) -> f64 {
        size * LINE_HEIGHT
    }

    /// Center of the ordinal badge on item slides: top-left of the text region.
    pub fn badge_center(&self) -> Point {
        Point::new(
            self.text_region.x0 + self.badge_radius,
            self.text_region.y0 + self.badge_radius,
        )
    }

    /// First text line below the badge on item slides.
    pub fn item_text_top(&self) -> f64 {
        self.text_region.y0 + self.badge_radius * 2.0 + self.margin / 2.0
    }
}
