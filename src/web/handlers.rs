use crate::{
    inference::{InferencePipeline, PredictOptions, PredictionResponse},
    utils::error::ServiceError,
    web::{
        extractors::{PredictQuery, RequestId},
        AppState,
    },
    Result,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use std::time::Instant;

/// 上传文件使用的表单字段名
const IMAGE_FIELD: &str = "image";

/// 通用预测接口 POST /predict/:model_name
pub async fn predict_handler(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
    request_id: RequestId,
    Query(query): Query<PredictQuery>,
    multipart: Option<Multipart>,
) -> Result<Json<PredictionResponse>> {
    predict(state, &model_name, request_id, query, multipart).await
}

pub async fn predict_alzheimer(
    State(state): State<AppState>,
    request_id: RequestId,
    Query(query): Query<PredictQuery>,
    multipart: Option<Multipart>,
) -> Result<Json<PredictionResponse>> {
    predict(state, "alzheimer", request_id, query, multipart).await
}

pub async fn predict_brain_tumor(
    State(state): State<AppState>,
    request_id: RequestId,
    Query(query): Query<PredictQuery>,
    multipart: Option<Multipart>,
) -> Result<Json<PredictionResponse>> {
    predict(state, "brain_tumor", request_id, query, multipart).await
}

pub async fn predict_parkinson(
    State(state): State<AppState>,
    request_id: RequestId,
    Query(query): Query<PredictQuery>,
    multipart: Option<Multipart>,
) -> Result<Json<PredictionResponse>> {
    predict(state, "parkinson", request_id, query, multipart).await
}

async fn predict(
    state: AppState,
    model_name: &str,
    RequestId(request_id): RequestId,
    query: PredictQuery,
    multipart: Option<Multipart>,
) -> Result<Json<PredictionResponse>> {
    let start_time = Instant::now();
    let model_name = model_name.to_lowercase();

    tracing::info!(
        "Processing prediction request: request_id={}, model={}",
        request_id,
        model_name
    );

    if !state.registry.contains(&model_name) {
        return Err(ServiceError::ModelNotFound {
            name: model_name,
            available: state.registry.available(),
        });
    }

    let image = match multipart {
        Some(multipart) => {
            read_image_field(multipart, state.config.server_config.max_image_size).await?
        }
        None => None,
    };
    let image = image.ok_or(ServiceError::MissingImage)?;

    let options = PredictOptions {
        threshold: query.threshold(),
    };

    let prediction =
        InferencePipeline::run(state.registry.clone(), model_name.clone(), image, options).await?;

    tracing::info!(
        "Prediction completed: request_id={}, model={}, time={:.3}s",
        request_id,
        model_name,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(PredictionResponse::new(model_name, prediction)))
}

/// 读取表单中的图像字段，其余字段忽略
async fn read_image_field(mut multipart: Multipart, max_bytes: usize) -> Result<Option<Bytes>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Failed to read multipart field", max_bytes))?
    {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if field_name != IMAGE_FIELD {
            tracing::debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        if let Some(content_type) = field.content_type() {
            tracing::debug!("Image content type: {}", content_type);
        }

        // 分块读取，超过上限立即中止
        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, "Failed to read file data", max_bytes))?
        {
            if data.len() + chunk.len() > max_bytes {
                return Err(ServiceError::FileTooLarge(max_bytes));
            }
            data.extend_from_slice(&chunk);
        }

        tracing::debug!("Received image: {} bytes", data.len());
        return Ok(Some(Bytes::from(data)));
    }

    Ok(None)
}

/// 请求体超限映射为 413，其余为 400
fn multipart_error(err: MultipartError, context: &str, max_bytes: usize) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::FileTooLarge(max_bytes)
    } else {
        ServiceError::InvalidInput(format!("{}: {}", context, err.body_text()))
    }
}

/// GET /models
pub async fn list_models_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "models": state.registry.loaded_names(),
        "skipped": state.registry.skipped(),
    }))
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "models_loaded": state.registry.loaded_names(),
        "skipped": state.registry.skipped(),
        "features": state.registry.feature_capabilities(),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
