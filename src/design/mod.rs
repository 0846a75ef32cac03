//! Video design boundary model.
//!
//! A design is the JSON document produced by the content-generation step: a title, an ordered list
//! of items, a target duration, and a canvas size.

/// Design document types and loading.
pub mod model;
