//! Model inference: candle backend, batch scoring unit, async service.

pub mod backend;
pub mod scoring;
pub mod service;

pub use backend::{select_device, ModelFiles, SequenceModel};
pub use scoring::{ChunkOutcome, Prediction, ScoringOptions, ScoringUnit};
pub use service::{
    score_frame, LocalScoringService, NoopScoringService, PartitionOptions, ScoringService,
};
