use crate::config::OnnxConfig;
use crate::utils::error::ServiceError;
use crate::Result;
use ndarray::ArrayD;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// 以像素张量为输入的模型
pub trait NeuralModel: Send + Sync {
    /// 模型声明的输入形状，动态维度用 -1 表示
    fn input_shape(&self) -> Option<&[i64]>;

    /// 单次推理，返回原始输出张量
    fn predict(&self, batch: ArrayD<f32>) -> Result<ArrayD<f32>>;
}

/// 模型文件加载器，便于在测试中替换推理后端
pub trait NeuralLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn NeuralModel>>;
}

pub struct OnnxModel {
    session: Arc<Mutex<Session>>,
    input_name: String,
    output_name: String, // 动态发现的输出名称
    input_shape: Option<Vec<i64>>,
}

impl OnnxModel {
    pub fn new(model_path: &Path, config: &OnnxConfig) -> Result<Self> {
        if !model_path.exists() {
            return Err(ServiceError::InvalidArtifact(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading ONNX model from: {}", model_path.display());

        let level = if config.enable_optimization {
            match config.optimization_level {
                0 => GraphOptimizationLevel::Disable,
                1 => GraphOptimizationLevel::Level1,
                2 => GraphOptimizationLevel::Level2,
                _ => GraphOptimizationLevel::Level3,
            }
        } else {
            GraphOptimizationLevel::Disable
        };

        let session = Session::builder()?
            .with_optimization_level(level)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(model_path)?;

        let input = session.inputs.first().ok_or_else(|| {
            ServiceError::InvalidArtifact(format!("{} has no inputs", model_path.display()))
        })?;
        let input_name = input.name.clone();
        let input_shape = input.input_type.tensor_shape().map(|s| s.to_vec());

        // 动态发现输出名称
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(ServiceError::InvalidArtifact(format!(
                    "{} has no outputs",
                    model_path.display()
                )))
            }
        };

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Model output[{}]: '{}'", i, output.name);
        }
        tracing::info!(
            "Model input '{}' shape {:?}, output '{}'",
            input_name,
            input_shape,
            output_name
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            input_shape,
        })
    }
}

impl NeuralModel for OnnxModel {
    fn input_shape(&self) -> Option<&[i64]> {
        self.input_shape.as_deref()
    }

    fn predict(&self, batch: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let input_tensor = Tensor::from_array(batch)?;

        let mut session = self.session.lock();
        let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

        match outputs.get(self.output_name.as_str()) {
            Some(output) => Ok(output.try_extract_array::<f32>()?.into_owned()),
            None => {
                let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                Err(ServiceError::Inference(format!(
                    "Output '{}' not found. Available outputs: {:?}",
                    self.output_name, available
                )))
            }
        }
    }
}

/// 基于 ONNX Runtime 的默认加载器
pub struct OnnxLoader {
    config: OnnxConfig,
}

impl OnnxLoader {
    pub fn new(config: OnnxConfig) -> Self {
        Self { config }
    }
}

impl NeuralLoader for OnnxLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn NeuralModel>> {
        Ok(Arc::new(OnnxModel::new(path, &self.config)?))
    }
}
