pub mod normalizer;
pub mod pipeline;
pub mod types;

pub use pipeline::InferencePipeline;
pub use types::{PredictOptions, Prediction, PredictionResponse};
