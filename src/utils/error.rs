use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Model '{name}' not found.")]
    ModelNotFound { name: String, available: Vec<String> },

    #[error("No image file uploaded. Use field name 'image'.")]
    MissingImage,

    #[error("Failed to load model '{name}': {reason}")]
    ModelLoad { name: String, reason: String },

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large, max allowed: {0} bytes")]
    FileTooLarge(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::MissingImage => StatusCode::BAD_REQUEST,
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            // 解码失败按服务端错误返回，与旧接口保持一致
            ServiceError::ImageDecode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::ModelLoad { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            ServiceError::MissingImage => "MISSING_IMAGE",
            ServiceError::ModelLoad { .. } => "MODEL_LOAD_ERROR",
            ServiceError::InvalidArtifact(_) => "INVALID_ARTIFACT",
            ServiceError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            ServiceError::Inference(_) => "INFERENCE_ERROR",
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
            ServiceError::FileTooLarge(_) => "FILE_TOO_LARGE",
            ServiceError::Config(_) => "CONFIG_ERROR",
            ServiceError::Io(_) => "IO_ERROR",
            ServiceError::Json(_) => "JSON_ERROR",
            ServiceError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            ServiceError::Ort(_) => "ORT_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.error_code(),
        });

        match &self {
            ServiceError::ModelNotFound { available, .. } => {
                body["available"] = serde_json::json!(available);
                tracing::warn!("Request rejected: {} ({})", self, status);
            }
            // 加载失败时只返回简短信息，详细原因在 /models 中查看
            ServiceError::ModelLoad { name, .. } => {
                body["error"] = serde_json::json!(format!("Failed to load model '{}'", name));
                tracing::error!("Request failed: {} ({})", self, status);
            }
            _ if status.is_client_error() => {
                tracing::warn!("Request rejected: {} ({})", self, status);
            }
            _ => {
                tracing::error!("Request failed: {} ({})", self, status);
            }
        }

        (status, axum::Json(body)).into_response()
    }
}
