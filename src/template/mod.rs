//! Slide template model.
//!
//! Maps a [`crate::VideoDesign`] onto a fixed-duration slide sequence and each slide kind onto an
//! on-canvas layout.

/// Per-kind layout regions derived from the canvas size.
pub mod layout;
/// Slide plan computation and elapsed-time resolution.
pub mod plan;
