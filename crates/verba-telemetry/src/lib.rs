pub mod pipeline_metrics;

pub use pipeline_metrics::{LevelEnvelope, PipelineMetrics, PipelineStage};
