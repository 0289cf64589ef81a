//! Application crate: settings, utterance buffering, scheduling,
//! translation dispatch, batch processing, and the CLI wiring.

pub mod batch;
pub mod buffer;
pub mod cli;
pub mod dispatcher;
pub mod display;
pub mod media;
pub mod scheduler;
pub mod session;
pub mod settings;
