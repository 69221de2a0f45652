use serde::{Deserialize, Serialize};

/// 统一的预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 类别名称
    pub class: String,
    /// 所选类别的概率 (0.0 - 1.0)
    pub confidence: f32,
}

impl Prediction {
    pub fn new(class: impl Into<String>, confidence: f32) -> Self {
        Self {
            class: class.into(),
            confidence,
        }
    }
}

/// 预测选项
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictOptions {
    /// 二分类阈值，未指定时使用模型默认值
    #[serde(default)]
    pub threshold: Option<f32>,
}

/// 预测接口的响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub model: String,
    pub class: String,
    pub confidence: f32,
}

impl PredictionResponse {
    pub fn new(model: impl Into<String>, prediction: Prediction) -> Self {
        Self {
            model: model.into(),
            class: prediction.class,
            confidence: prediction.confidence,
        }
    }
}
