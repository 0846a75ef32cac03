use crate::assets::store::ImageSource;
use crate::foundation::core::{Point, Rect, Rgba8};
use crate::foundation::error::ReelResult;
use crate::render::surface::{DrawSurface, TextAlign};
use crate::render::text::{WrapStrategy, truncate_lines, wrap_on_surface};
use crate::template::layout::SlideLayout;
use crate::template::plan::{ItemPart, Slide, SlideContent};

/// Slide colors.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Theme {
    pub background: Rgba8,
    pub text: Rgba8,
    pub muted: Rgba8,
    pub accent: Rgba8,
    pub badge_text: Rgba8,
    pub placeholder_fill: Rgba8,
    pub placeholder_border: Rgba8,
    pub placeholder_text: Rgba8,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Rgba8::WHITE,
            text: Rgba8::opaque(0x22, 0x22, 0x22),
            muted: Rgba8::opaque(0x66, 0x66, 0x66),
            accent: Rgba8::opaque(0xff, 0x33, 0x66),
            badge_text: Rgba8::WHITE,
            placeholder_fill: Rgba8::opaque(0xf0, 0xf0, 0xf0),
            placeholder_border: Rgba8::opaque(0xcc, 0xcc, 0xcc),
            placeholder_text: Rgba8::opaque(0x99, 0x99, 0x99),
        }
    }
}

/// Fixed wording painted by the renderer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SlideCopy {
    /// Label above an item's details.
    pub tip_label: String,
    /// Secondary title-slide line; `{count}` is replaced with the item count.
    pub selections: String,
    /// Call-to-action lines on the summary slide.
    pub summary_lines: Vec<String>,
    /// Caption inside empty image regions.
    pub image_placeholder: String,
}

impl Default for SlideCopy {
    fn default() -> Self {
        Self {
            tip_label: "Tip".to_owned(),
            selections: "{count} selections".to_owned(),
            summary_lines: vec![
                "Thanks for watching!".to_owned(),
                "Like and subscribe for more".to_owned(),
            ],
            image_placeholder: "Image".to_owned(),
        }
    }
}

impl SlideCopy {
    pub fn selections_line(&self, count: usize) -> String {
        self.selections.replace("{count}", &count.to_string())
    }
}

/// Everything that shapes the look of a frame besides its content.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlideStyle {
    pub theme: Theme,
    pub copy: SlideCopy,
    pub wrap: WrapStrategy,
}

/// Paint one complete slide.
///
/// Each call is a full repaint: the surface is cleared to the theme background first, so the
/// output depends only on the arguments.
pub fn render_slide(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    slide: &Slide,
    style: &SlideStyle,
    images: &mut dyn ImageSource,
) -> ReelResult<()> {
    surface.clear(style.theme.background);

    match &slide.content {
        SlideContent::Title {
            title,
            item_count,
            image,
        } => {
            draw_title(surface, layout, style, title, *item_count)?;
            draw_image_region(surface, layout, style, image.as_deref(), images)
        }
        SlideContent::Item {
            ordinal,
            label,
            main,
            details,
            part,
            image,
        } => {
            draw_badge(surface, layout, style, *ordinal)?;
            match (part, details) {
                (ItemPart::Headline, _) => draw_headline(surface, layout, style, label)?,
                (ItemPart::Tip, Some(details)) => draw_tip(surface, layout, style, details)?,
                // No details: repeat the main-content slide instead of leaving a blank frame.
                (ItemPart::Main, _) | (ItemPart::Tip, None) => {
                    draw_main(surface, layout, style, label, main.as_deref())?
                }
            }
            draw_image_region(surface, layout, style, image.as_deref(), images)
        }
        SlideContent::Summary { image } => {
            draw_summary(surface, layout, style)?;
            draw_image_region(surface, layout, style, image.as_deref(), images)
        }
    }
}

fn draw_title(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    style: &SlideStyle,
    title: &str,
    item_count: usize,
) -> ReelResult<()> {
    let title_lines = fit_lines(surface, layout, style, title, layout.title_size, 4);
    let caption = (item_count > 0).then(|| style.copy.selections_line(item_count));

    let title_h = title_lines.len() as f64 * SlideLayout::line_advance(layout.title_size);
    let caption_h = caption
        .as_ref()
        .map_or(0.0, |_| layout.margin + SlideLayout::line_advance(layout.caption_size));
    let top = (layout.text_region.center().y - (title_h + caption_h) / 2.0)
        .max(layout.text_region.y0);

    let after = draw_lines(
        surface,
        &title_lines,
        Point::new(layout.center_x(), top),
        layout.title_size,
        style.theme.text,
        TextAlign::Center,
    )?;
    if let Some(caption) = caption {
        surface.fill_text(
            &caption,
            Point::new(layout.center_x(), after + layout.margin),
            layout.caption_size,
            style.theme.muted,
            TextAlign::Center,
        )?;
    }
    Ok(())
}

fn draw_headline(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    style: &SlideStyle,
    label: &str,
) -> ReelResult<()> {
    let lines = fit_lines(surface, layout, style, label, layout.title_size, 4);
    let block_h = lines.len() as f64 * SlideLayout::line_advance(layout.title_size);
    let area_top = layout.item_text_top();
    let top = (area_top + (layout.text_region.y1 - area_top - block_h) / 2.0).max(area_top);
    draw_lines(
        surface,
        &lines,
        Point::new(layout.center_x(), top),
        layout.title_size,
        style.theme.text,
        TextAlign::Center,
    )?;
    Ok(())
}

fn draw_main(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    style: &SlideStyle,
    label: &str,
    main: Option<&str>,
) -> ReelResult<()> {
    let label_lines = fit_lines(surface, layout, style, label, layout.heading_size, 2);
    let mut y = draw_lines(
        surface,
        &label_lines,
        Point::new(layout.center_x(), layout.item_text_top()),
        layout.heading_size,
        style.theme.text,
        TextAlign::Center,
    )?;
    if let Some(main) = main {
        y += layout.margin / 2.0;
        let budget = lines_that_fit(layout, y, layout.body_size);
        let lines = fit_lines(surface, layout, style, main, layout.body_size, budget);
        draw_lines(
            surface,
            &lines,
            Point::new(layout.center_x(), y),
            layout.body_size,
            style.theme.text,
            TextAlign::Center,
        )?;
    }
    Ok(())
}

fn draw_tip(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    style: &SlideStyle,
    details: &str,
) -> ReelResult<()> {
    let top = layout.item_text_top();
    surface.fill_text(
        &style.copy.tip_label,
        Point::new(layout.center_x(), top),
        layout.heading_size,
        style.theme.accent,
        TextAlign::Center,
    )?;
    let y = top + SlideLayout::line_advance(layout.heading_size) + layout.margin / 2.0;
    let budget = lines_that_fit(layout, y, layout.body_size);
    let lines = fit_lines(surface, layout, style, details, layout.body_size, budget);
    draw_lines(
        surface,
        &lines,
        Point::new(layout.center_x(), y),
        layout.body_size,
        style.theme.text,
        TextAlign::Center,
    )?;
    Ok(())
}

fn draw_summary(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    style: &SlideStyle,
) -> ReelResult<()> {
    let mut lines = Vec::new();
    for (i, line) in style.copy.summary_lines.iter().enumerate() {
        let size = if i == 0 {
            layout.heading_size
        } else {
            layout.body_size
        };
        for wrapped in fit_lines(surface, layout, style, line, size, 3) {
            lines.push((wrapped, size));
        }
    }

    let block_h: f64 = lines
        .iter()
        .map(|(_, size)| SlideLayout::line_advance(*size))
        .sum();
    let mut y = (layout.text_region.center().y - block_h / 2.0).max(layout.text_region.y0);
    for (i, (line, size)) in lines.iter().enumerate() {
        let color = if i == 0 {
            style.theme.accent
        } else {
            style.theme.text
        };
        surface.fill_text(
            line,
            Point::new(layout.center_x(), y),
            *size,
            color,
            TextAlign::Center,
        )?;
        y += SlideLayout::line_advance(*size);
    }
    Ok(())
}

/// Filled circle with the item's 1-based ordinal centered inside.
fn draw_badge(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    style: &SlideStyle,
    ordinal: usize,
) -> ReelResult<()> {
    let center = layout.badge_center();
    let r = layout.badge_radius;
    surface.fill_circle(center, r, style.theme.accent);

    let numeral = ordinal.to_string();
    let size = r * 1.1;
    surface.fill_text(
        &numeral,
        Point::new(center.x, center.y - SlideLayout::line_advance(size) / 2.0),
        size,
        style.theme.badge_text,
        TextAlign::Center,
    )
}

/// Reserve the lower half for an image: the provided one fitted inside, or a labelled placeholder.
fn draw_image_region(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    style: &SlideStyle,
    reference: Option<&str>,
    images: &mut dyn ImageSource,
) -> ReelResult<()> {
    let region = layout.image_region;
    if let Some(image) = reference.and_then(|r| images.image(r)) {
        let fitted = contain_rect(region, image.width, image.height);
        match surface.draw_image(fitted, &image) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "image draw failed, drawing placeholder");
            }
        }
    }

    surface.fill_rect(region, style.theme.placeholder_fill);
    let border = (layout.canvas.width_f64() / 270.0).max(1.0);
    surface.stroke_rect(region, border, style.theme.placeholder_border);
    let label_top = region.center().y - SlideLayout::line_advance(layout.caption_size) / 2.0;
    surface.fill_text(
        &style.copy.image_placeholder,
        Point::new(region.center().x, label_top),
        layout.caption_size,
        style.theme.placeholder_text,
        TextAlign::Center,
    )
}

/// Largest rect with the image's aspect ratio that fits centered in `region`.
pub(crate) fn contain_rect(region: Rect, width: u32, height: u32) -> Rect {
    if width == 0 || height == 0 {
        return region;
    }
    let scale = (region.width() / f64::from(width)).min(region.height() / f64::from(height));
    let w = f64::from(width) * scale;
    let h = f64::from(height) * scale;
    let c = region.center();
    Rect::new(c.x - w / 2.0, c.y - h / 2.0, c.x + w / 2.0, c.y + h / 2.0)
}

fn lines_that_fit(layout: &SlideLayout, top: f64, size: f64) -> usize {
    let avail = (layout.text_region.y1 - top).max(0.0);
    ((avail / SlideLayout::line_advance(size)).floor() as usize).max(1)
}

fn fit_lines(
    surface: &mut dyn DrawSurface,
    layout: &SlideLayout,
    style: &SlideStyle,
    text: &str,
    size: f64,
    max_lines: usize,
) -> Vec<String> {
    let lines = wrap_on_surface(surface, text, size, layout.max_text_width, style.wrap);
    truncate_lines(lines, max_lines, layout.max_text_width, |s| {
        surface.measure_text(s, size)
    })
}

/// Draw pre-wrapped lines downward from `origin`; returns the y just below the last line.
fn draw_lines(
    surface: &mut dyn DrawSurface,
    lines: &[String],
    origin: Point,
    size: f64,
    color: Rgba8,
    align: TextAlign,
) -> ReelResult<f64> {
    let advance = SlideLayout::line_advance(size);
    let mut y = origin.y;
    for line in lines {
        surface.fill_text(line, Point::new(origin.x, y), size, color, align)?;
        y += advance;
    }
    Ok(y)
}

#[cfg(test)]
#[path = "../../tests/unit/render/frame.rs"]
mod tests;
