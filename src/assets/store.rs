use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;

use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::premultiply_rgba8_in_place;

/// Decoded raster image in premultiplied RGBA8 form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

/// Normalize and validate design-relative asset paths.
///
/// The normalized result uses `/` separators, removes `.` segments, and rejects absolute paths or
/// parent traversals (`..`).
pub fn normalize_rel_path(source: &str) -> ReelResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(ReelError::validation("asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(ReelError::validation("asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(ReelError::validation("asset paths must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(ReelError::validation("asset path must contain a file name"));
    }

    Ok(out.join("/"))
}

/// Decode any format supported by `image` into a [`PreparedImage`].
pub fn decode_image(bytes: &[u8]) -> ReelResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

/// Resolves a slide's image reference to pixels.
///
/// Returning `None` means "draw the placeholder"; a missing image never fails a frame.
pub trait ImageSource {
    fn image(&mut self, reference: &str) -> Option<Arc<PreparedImage>>;
}

/// Image source that never has images.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoImages;

impl ImageSource for NoImages {
    fn image(&mut self, _reference: &str) -> Option<Arc<PreparedImage>> {
        None
    }
}

/// Loads images from disk relative to a root directory, decoding each reference once.
#[derive(Debug)]
pub struct ImageStore {
    root: PathBuf,
    cache: HashMap<String, Option<Arc<PreparedImage>>>,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load and decode `reference`, reporting why it failed.
    pub fn load(&self, reference: &str) -> ReelResult<PreparedImage> {
        let norm = normalize_rel_path(reference)?;
        let path = self.root.join(Path::new(&norm));
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read image asset '{}'", path.display()))?;
        decode_image(&bytes)
    }
}

impl ImageSource for ImageStore {
    fn image(&mut self, reference: &str) -> Option<Arc<PreparedImage>> {
        if let Some(hit) = self.cache.get(reference) {
            return hit.clone();
        }
        let loaded = match self.load(reference) {
            Ok(img) => Some(Arc::new(img)),
            Err(e) => {
                tracing::warn!(reference, error = %e, "image unavailable, drawing placeholder");
                None
            }
        };
        self.cache.insert(reference.to_owned(), loaded.clone());
        loaded
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/store.rs"]
mod tests;
