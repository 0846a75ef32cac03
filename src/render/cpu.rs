use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use vello_cpu::kurbo::{Affine, Shape as _};

use crate::assets::store::PreparedImage;
use crate::foundation::core::{Canvas, Point, Rect, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::backend::FrameRGBA;
use crate::render::surface::{DrawSurface, TextAlign};

/// Shaped layouts kept before the cache is dropped wholesale.
const LAYOUT_CACHE_LIMIT: usize = 4096;

/// Font configuration for [`CpuSurface`].
#[derive(Clone, Debug)]
pub struct CpuSurfaceOpts {
    /// TrueType/OpenType bytes used for every text draw.
    pub font_bytes: Arc<Vec<u8>>,
}

impl CpuSurfaceOpts {
    pub fn from_font_bytes(bytes: Vec<u8>) -> Self {
        Self {
            font_bytes: Arc::new(bytes),
        }
    }

    /// Read the font file; a missing or unreadable font is a setup failure.
    pub fn from_font_path(path: &Path) -> ReelResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ReelError::setup(format!("read font '{}': {e}", path.display()))
        })?;
        if bytes.is_empty() {
            return Err(ReelError::setup(format!(
                "font '{}' is empty",
                path.display()
            )));
        }
        Ok(Self::from_font_bytes(bytes))
    }
}

/// Raster surface backed by `vello_cpu`, with text shaped by `parley`.
pub struct CpuSurface {
    canvas: Canvas,
    width: u16,
    height: u16,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
    font: vello_cpu::peniko::FontData,
    family_name: String,
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<()>,
    layouts: HashMap<(String, u32), parley::Layout<()>>,
    images: HashMap<usize, (Arc<Vec<u8>>, vello_cpu::Image)>,
}

impl std::fmt::Debug for CpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuSurface")
            .field("canvas", &self.canvas)
            .field("family_name", &self.family_name)
            .field("cached_layouts", &self.layouts.len())
            .finish_non_exhaustive()
    }
}

impl CpuSurface {
    pub fn new(canvas: Canvas, opts: CpuSurfaceOpts) -> ReelResult<Self> {
        canvas.validate()?;
        let width: u16 = canvas
            .width
            .try_into()
            .map_err(|_| ReelError::setup("canvas width exceeds u16"))?;
        let height: u16 = canvas
            .height
            .try_into()
            .map_err(|_| ReelError::setup("canvas height exceeds u16"))?;

        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx.collection.register_fonts(
            parley::fontique::Blob::from(opts.font_bytes.as_ref().clone()),
            None,
        );
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| ReelError::setup("no font families registered from font bytes"))?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ReelError::setup("registered font family has no name"))?
            .to_string();
        tracing::debug!(family = %family_name, "cpu surface font registered");

        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(opts.font_bytes.as_ref().clone()),
            0,
        );

        Ok(Self {
            canvas,
            width,
            height,
            ctx: vello_cpu::RenderContext::new(width, height),
            pixmap: vello_cpu::Pixmap::new(width, height),
            font,
            family_name,
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            layouts: HashMap::new(),
            images: HashMap::new(),
        })
    }

    pub fn family_name(&self) -> &str {
        &self.family_name
    }

    fn layout(&mut self, text: &str, size: f64) -> &parley::Layout<()> {
        let size_px = size as f32;
        let key = (text.to_owned(), size_px.to_bits());
        if !self.layouts.contains_key(&key) && self.layouts.len() >= LAYOUT_CACHE_LIMIT {
            self.layouts.clear();
        }
        let Self {
            layouts,
            layout_ctx,
            font_ctx,
            family_name,
            ..
        } = self;
        layouts.entry(key).or_insert_with(|| {
            let mut builder = layout_ctx.ranged_builder(font_ctx, text, 1.0, true);
            builder.push_default(parley::style::StyleProperty::FontStack(
                parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name.clone())),
            ));
            builder.push_default(parley::style::StyleProperty::FontSize(size_px));
            let mut layout: parley::Layout<()> = builder.build(text);
            layout.break_all_lines(None);
            layout
        })
    }

    fn image_paint(&mut self, image: &PreparedImage) -> ReelResult<vello_cpu::Image> {
        let key = Arc::as_ptr(&image.rgba8_premul) as usize;
        if let Some((_, paint)) = self.images.get(&key) {
            return Ok(paint.clone());
        }
        let pixmap = premul_bytes_to_pixmap(&image.rgba8_premul, image.width, image.height)?;
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        };
        self.images
            .insert(key, (Arc::clone(&image.rgba8_premul), paint.clone()));
        Ok(paint)
    }

    fn set_color(&mut self, color: Rgba8) {
        self.ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.r, color.g, color.b, color.a,
        ));
    }
}

impl DrawSurface for CpuSurface {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn clear(&mut self, color: Rgba8) {
        self.ctx = vello_cpu::RenderContext::new(self.width, self.height);
        self.set_color(color);
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            self.canvas.width_f64(),
            self.canvas.height_f64(),
        ));
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba8) {
        self.set_color(color);
        self.ctx.fill_rect(&rect_to_cpu(rect));
    }

    fn stroke_rect(&mut self, rect: Rect, width: f64, color: Rgba8) {
        let w = width.max(0.0).min(rect.width() / 2.0).min(rect.height() / 2.0);
        if w <= 0.0 {
            return;
        }
        self.set_color(color);
        let sides = [
            Rect::new(rect.x0, rect.y0, rect.x1, rect.y0 + w),
            Rect::new(rect.x0, rect.y1 - w, rect.x1, rect.y1),
            Rect::new(rect.x0, rect.y0 + w, rect.x0 + w, rect.y1 - w),
            Rect::new(rect.x1 - w, rect.y0 + w, rect.x1, rect.y1 - w),
        ];
        for side in sides {
            self.ctx.fill_rect(&rect_to_cpu(side));
        }
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba8) {
        if radius <= 0.0 {
            return;
        }
        self.set_color(color);
        let circle =
            vello_cpu::kurbo::Circle::new(vello_cpu::kurbo::Point::new(center.x, center.y), radius);
        self.ctx.fill_path(&circle.to_path(0.1));
    }

    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        size: f64,
        color: Rgba8,
        align: TextAlign,
    ) -> ReelResult<()> {
        if !size.is_finite() || size <= 0.0 {
            return Err(ReelError::render("text size must be finite and > 0"));
        }
        if text.trim().is_empty() {
            return Ok(());
        }

        let layout = self.layout(text, size).clone();
        let x = match align {
            TextAlign::Left => origin.x,
            TextAlign::Center => origin.x - f64::from(layout.width()) / 2.0,
        };
        self.set_color(color);
        self.ctx.set_transform(Affine::translate((x, origin.y)));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                self.ctx
                    .glyph_run(&self.font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
        self.ctx.set_transform(Affine::IDENTITY);
        Ok(())
    }

    fn measure_text(&mut self, text: &str, size: f64) -> f64 {
        if text.is_empty() || !size.is_finite() || size <= 0.0 {
            return 0.0;
        }
        f64::from(self.layout(text, size).width())
    }

    fn draw_image(&mut self, rect: Rect, image: &PreparedImage) -> ReelResult<()> {
        if image.width == 0 || image.height == 0 || rect.width() <= 0.0 || rect.height() <= 0.0 {
            return Ok(());
        }
        let paint = self.image_paint(image)?;
        let sx = rect.width() / f64::from(image.width);
        let sy = rect.height() / f64::from(image.height);

        self.ctx.set_paint_transform(Affine::IDENTITY);
        self.ctx
            .set_transform(Affine::translate((rect.x0, rect.y0)) * Affine::scale_non_uniform(sx, sy));
        self.ctx.set_paint(paint);
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(image.width),
            f64::from(image.height),
        ));
        self.ctx.set_transform(Affine::IDENTITY);
        Ok(())
    }

    fn snapshot(&mut self) -> ReelResult<FrameRGBA> {
        for px in self.pixmap.data_as_u8_slice_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 0, 0]);
        }
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);

        let data = self.pixmap.data_as_u8_slice().to_vec();
        if data.len() != self.canvas.rgba_len() {
            return Err(ReelError::render("pixmap readback size mismatch"));
        }
        Ok(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data,
            premultiplied: true,
        })
    }
}

fn rect_to_cpu(r: Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}

fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> ReelResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| ReelError::render("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| ReelError::render("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(ReelError::render("prepared image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let pixels = rgba8_premul
        .chunks_exact(4)
        .map(|px| {
            may_have_opacities |= px[3] != 255;
            vello_cpu::peniko::color::PremulRgba8 {
                r: px[0],
                g: px[1],
                b: px[2],
                a: px[3],
            }
        })
        .collect::<Vec<_>>();

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
