//! Trigger-phrase detection in comment text.

pub mod detector;

pub use detector::{detect, TriggerMatch};
