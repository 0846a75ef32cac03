use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelError, ReelResult};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Shortest recording the composer will produce, in seconds.
pub const MIN_DURATION_SECS: f64 = 15.0;
/// Longest recording the composer will produce, in seconds.
pub const MAX_DURATION_SECS: f64 = 180.0;
/// Duration used when the document omits one.
pub const DEFAULT_DURATION_SECS: f64 = 30.0;

/// Clamp a requested duration into `[MIN_DURATION_SECS, MAX_DURATION_SECS]`.
///
/// Out-of-range values are corrected, never rejected. NaN maps to the minimum.
pub fn clamp_duration(requested_secs: f64) -> f64 {
    if requested_secs.is_nan() {
        return MIN_DURATION_SECS;
    }
    requested_secs.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
}

/// A "video design" document.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VideoDesign {
    pub title: String,
    /// Requested total length in seconds. See [`VideoDesign::effective_duration_secs`].
    #[serde(default = "default_duration")]
    pub duration: f64,
    #[serde(default)]
    pub canvas: Canvas,
    #[serde(default)]
    pub items: Vec<Item>,
    /// Optional image for the title and summary slides (relative to the assets root).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenes: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

fn default_duration() -> f64 {
    DEFAULT_DURATION_SECS
}

/// One enumerable content unit (e.g. a ranking entry).
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub content: ItemContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Descriptive text attached to an [`Item`]. Both parts are optional.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ItemContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Item {
    /// Display label: `name`, falling back to `title`.
    pub fn label(&self) -> &str {
        non_blank(self.name.as_deref())
            .or_else(|| non_blank(self.title.as_deref()))
            .unwrap_or("")
    }

    /// Primary description, if present and not blank.
    pub fn main_text(&self) -> Option<&str> {
        non_blank(self.content.main.as_deref())
    }

    /// Supporting text, if present and not blank.
    pub fn details_text(&self) -> Option<&str> {
        non_blank(self.content.details.as_deref())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

impl VideoDesign {
    /// Parse a design from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> ReelResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| ReelError::serde(format!("parse video design JSON: {e}")))
    }

    /// Parse a design from a JSON string.
    pub fn from_json(s: &str) -> ReelResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| ReelError::serde(format!("parse video design JSON: {e}")))
    }

    /// Parse a design from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> ReelResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            ReelError::validation(format!("open video design '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Structural checks. Duration is not checked here: it is clamped, not rejected.
    pub fn validate(&self) -> ReelResult<()> {
        if self.title.trim().is_empty() {
            return Err(ReelError::validation("design title must be non-empty"));
        }
        self.canvas.validate()?;
        if let Some(i) = self.items.iter().position(|it| it.label().is_empty()) {
            return Err(ReelError::validation(format!(
                "item #{} has neither a name nor a title",
                i + 1
            )));
        }
        Ok(())
    }

    /// The duration actually used for timing, in seconds.
    pub fn effective_duration_secs(&self) -> f64 {
        clamp_duration(self.duration)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/design/model.rs"]
mod tests;
