//! Frame-stream recorders.
//!
//! A recorder consumes the frames captured from the drawing surface and reports completion through
//! an event channel, like a platform media recorder.

/// System `ffmpeg` MP4 recorder.
pub mod ffmpeg;
/// In-process animated GIF recorder.
pub mod gif;
/// In-memory recorder for tests and debugging.
pub mod memory;
/// Recorder trait, events, and factory.
pub mod recorder;
