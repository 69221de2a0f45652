use crate::{
    image::{FeatureExtractor, ImageLoader, ImagePreprocessor, InputLayout},
    inference::{normalizer, PredictOptions, Prediction},
    models::{LoadedModel, ModelDescriptor, ModelRegistry},
    utils::error::ServiceError,
    Result,
};
use axum::body::Bytes;
use std::sync::Arc;
use std::time::Instant;

/// 推理流水线：解码 -> 预处理/特征提取 -> 推理 -> 归一化
pub struct InferencePipeline;

impl InferencePipeline {
    /// 在阻塞线程池中执行，避免占用异步运行时
    pub async fn run(
        registry: Arc<ModelRegistry>,
        model_name: String,
        image: Bytes,
        options: PredictOptions,
    ) -> Result<Prediction> {
        tokio::task::spawn_blocking(move || {
            Self::run_blocking(&registry, &model_name, &image, &options)
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Inference task failed: {}", e)))?
    }

    pub fn run_blocking(
        registry: &ModelRegistry,
        model_name: &str,
        image: &[u8],
        options: &PredictOptions,
    ) -> Result<Prediction> {
        let start_time = Instant::now();

        let model = registry.get_or_load(model_name)?;
        let descriptor = registry.descriptor_for(model_name).ok_or_else(|| {
            ServiceError::Internal(format!("Descriptor missing for '{}'", model_name))
        })?;

        let image = ImageLoader::from_bytes(image)?;

        let prediction = match model.as_ref() {
            LoadedModel::Neural(neural) => {
                let layout = InputLayout::from_shape(neural.input_shape());
                let batch = ImagePreprocessor::to_tensor(&image, &layout)?;
                let output = neural.predict(batch)?;
                let threshold = Self::threshold_for(model_name, descriptor, options);
                normalizer::normalize_output(&output.view(), &descriptor.labels, threshold)?
            }
            LoadedModel::Classical(classical) => {
                if options.threshold.is_some() {
                    tracing::debug!("Threshold ignored for classical model '{}'", model_name);
                }
                let features = FeatureExtractor::from_image(&image)?;
                let score = classical.positive_score(&features)?;
                normalizer::normalize_classical(score, &descriptor.labels)
            }
        };

        tracing::info!(
            "Prediction: model={}, class={}, confidence={:.4}, time={:.3}s",
            model_name,
            prediction.class,
            prediction.confidence,
            start_time.elapsed().as_secs_f32()
        );

        Ok(prediction)
    }

    fn threshold_for(model_name: &str, descriptor: &ModelDescriptor, options: &PredictOptions) -> f32 {
        // 请求名称（可能是别名）优先于规范名称的默认值
        let model_default = crate::models::catalog::default_threshold(model_name)
            .or(descriptor.default_threshold);
        normalizer::resolve_threshold(options.threshold, model_default)
    }
}
