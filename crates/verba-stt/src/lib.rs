//! STT result model, engine abstraction, model cache, and output filters.

pub mod engine;
pub mod filter;
pub mod manager;
pub mod mock;
pub mod model;
pub mod noop;
pub mod types;

pub use engine::{AlignSource, AudioInput, EngineLoader, SttEngine};
pub use filter::{remove_repetitions, HallucinationFilter};
pub use manager::{DownloadProgress, ModelManager};
pub use mock::{MockConfig, MockEngine};
pub use model::{cache_root, Backend, ModelHandle, ModelSpec, MODEL_KEYS};
pub use noop::{NoOpEngine, NoOpLoader};
pub use types::{Segment, Task, Temperature, TranscribeOptions, WhisperResult, Word};
