//! Drawing surfaces and slide painting.
//!
//! [`surface::DrawSurface`] is the seam between slide layout and pixels. The CPU surface
//! rasterizes with `vello_cpu`; the recording surface logs calls for tests and dry runs.

/// Frame buffers and surface construction.
pub mod backend;
/// `vello_cpu` raster surface.
pub mod cpu;
/// Slide painting.
pub mod frame;
/// Draw-call log surface.
pub mod recording;
/// The drawing context trait.
pub mod surface;
/// Line wrapping.
pub mod text;
