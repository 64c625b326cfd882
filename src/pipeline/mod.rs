//! Pipeline triggering: variable construction and supersession.

pub mod trigger;
pub mod variables;

pub use trigger::{cancel_superseded, start_pipeline};
pub use variables::{build_variables, minimized_payload, MAX_PAYLOAD_BYTES};
