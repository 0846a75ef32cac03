use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};
use crate::record::recorder::RecorderKind;
use crate::render::backend::SurfaceKind;
use crate::render::frame::{SlideCopy, SlideStyle, Theme};
use crate::render::text::WrapStrategy;
use crate::session::composer::ComposerOpts;
use crate::session::guard::GuardOpts;
use crate::template::plan::SubSlidePolicy;

/// Studio settings: everything about a recording that is not part of the design document.
///
/// Every field has a default, so `{}` is a valid config file.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudioConfig {
    /// Capture rate in whole frames per second.
    pub fps: u32,
    pub grace_ms: u64,
    pub max_session_ms: u64,
    pub stop_grace_ms: u64,
    pub finalize_timeout_ms: u64,
    pub sub_slides: SubSlidePolicy,
    pub wrap: WrapStrategy,
    pub theme: Theme,
    pub copy: SlideCopy,
    /// TrueType/OpenType font for the CPU surface.
    pub font_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub assets_root: Option<PathBuf>,
    pub recorder: RecorderKind,
    pub static_frame_elision: bool,
}

impl Default for StudioConfig {
    fn default() -> Self {
        let composer = ComposerOpts::default();
        Self {
            fps: 30,
            grace_ms: millis(composer.guard.grace),
            max_session_ms: millis(composer.guard.max_session),
            stop_grace_ms: millis(composer.stop_grace),
            finalize_timeout_ms: millis(composer.finalize_timeout),
            sub_slides: composer.sub_slides,
            wrap: composer.style.wrap,
            theme: Theme::default(),
            copy: SlideCopy::default(),
            font_path: None,
            output_dir: composer.output_dir,
            assets_root: None,
            recorder: RecorderKind::default(),
            static_frame_elision: false,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl StudioConfig {
    /// Load a JSON config file. Environment overrides are not applied.
    pub fn from_path(path: impl AsRef<Path>) -> ReelResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        serde_json::from_reader(BufReader::new(f)).map_err(|e| {
            ReelError::serde(format!("parse config '{}': {e}", path.display()))
        })
    }

    /// Apply `SLIDEREEL_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> ReelResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Recognized: `SLIDEREEL_FPS`, `SLIDEREEL_FONT`, `SLIDEREEL_OUTPUT_DIR`,
    /// `SLIDEREEL_MAX_SESSION_MS`. Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> ReelResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SLIDEREEL_FPS") {
            self.fps = parse_env("SLIDEREEL_FPS", &v)?;
        }
        if let Some(v) = get("SLIDEREEL_FONT") {
            self.font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SLIDEREEL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SLIDEREEL_MAX_SESSION_MS") {
            self.max_session_ms = parse_env("SLIDEREEL_MAX_SESSION_MS", &v)?;
        }
        Ok(self)
    }

    pub fn fps(&self) -> ReelResult<Fps> {
        Fps::new(self.fps, 1)
    }

    pub fn validate(&self) -> ReelResult<()> {
        self.fps()?;
        if self.max_session_ms == 0 {
            return Err(ReelError::validation("max_session_ms must be > 0"));
        }
        Ok(())
    }

    pub fn composer_opts(&self) -> ReelResult<ComposerOpts> {
        self.validate()?;
        Ok(ComposerOpts {
            fps: self.fps()?,
            guard: GuardOpts {
                grace: Duration::from_millis(self.grace_ms),
                max_session: Duration::from_millis(self.max_session_ms),
            },
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            finalize_timeout: Duration::from_millis(self.finalize_timeout_ms),
            sub_slides: self.sub_slides,
            style: SlideStyle {
                theme: self.theme.clone(),
                copy: self.copy.clone(),
                wrap: self.wrap,
            },
            static_frame_elision: self.static_frame_elision,
            assets_root: self.assets_root.clone(),
            output_dir: self.output_dir.clone(),
            persist: true,
        })
    }

    /// CPU surface for the configured font. A missing font is a setup error.
    pub fn surface_kind(&self) -> ReelResult<SurfaceKind> {
        let font_path = self.font_path.clone().ok_or_else(|| {
            ReelError::setup("no font configured (set font_path or SLIDEREEL_FONT)")
        })?;
        Ok(SurfaceKind::Cpu { font_path })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> ReelResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ReelError::validation(format!("{key}={value:?}: {e}")))
}
