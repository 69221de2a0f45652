pub mod config;
pub mod image;
pub mod inference;
pub mod models;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use inference::{Prediction, PredictionResponse};
pub use utils::error::ServiceError;

pub type Result<T> = std::result::Result<T, ServiceError>;
