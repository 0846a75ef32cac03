//! Timed recording sessions.
//!
//! The [`composer::Composer`] drives a generation tick by tick against a [`clock::Clock`]; the
//! [`guard::SessionGuard`] bounds the session and owns its teardown.

/// Monotonic time, one-shot timers, and animation tick handles.
pub mod clock;
/// Composition/Recording Driver.
pub mod composer;
/// Recording Session Guard.
pub mod guard;
