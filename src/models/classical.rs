//! 基于手工特征的传统分类器（标准化 + 线性模型）。
//!
//! 模型文件为JSON格式，必须包含 `scaler` 和 `model` 两部分。
//! 加载时校验特征模式版本、特征数量以及类别顺序（正类必须在最后）。

use crate::image::features::{FEATURE_COUNT, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
use crate::image::FeatureVector;
use crate::utils::error::ServiceError;
use crate::Result;
use serde::Deserialize;
use std::path::Path;

/// 约定的正类标签
pub const POSITIVE_CLASS: i64 = 1;

/// 无概率输出时，硬标签转换成的伪概率
pub const PSEUDO_PROB_POSITIVE: f32 = 0.9;
pub const PSEUDO_PROB_NEGATIVE: f32 = 0.1;

#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (m, s))| {
                // 方差为0的特征只做中心化
                let s = if *s == 0.0 { 1.0 } else { *s };
                (x - m) / s
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinearClassifier {
    /// 提供类别概率
    LogisticRegression { coef: Vec<f64>, intercept: f64 },
    /// 只提供硬标签
    LinearSvc { coef: Vec<f64>, intercept: f64 },
}

impl LinearClassifier {
    fn coef(&self) -> &[f64] {
        match self {
            LinearClassifier::LogisticRegression { coef, .. } => coef,
            LinearClassifier::LinearSvc { coef, .. } => coef,
        }
    }

    fn decision_function(&self, x: &[f64]) -> f64 {
        let intercept = match self {
            LinearClassifier::LogisticRegression { intercept, .. } => *intercept,
            LinearClassifier::LinearSvc { intercept, .. } => *intercept,
        };
        self.coef().iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + intercept
    }

    /// 类别概率（按 classes 顺序），不支持时返回 None
    pub fn predict_proba(&self, x: &[f64]) -> Option<Vec<f64>> {
        match self {
            LinearClassifier::LogisticRegression { .. } => {
                let p = 1.0 / (1.0 + (-self.decision_function(x)).exp());
                Some(vec![1.0 - p, p])
            }
            LinearClassifier::LinearSvc { .. } => None,
        }
    }

    /// 预测类别在 classes 中的下标
    pub fn predict(&self, x: &[f64]) -> usize {
        usize::from(self.decision_function(x) > 0.0)
    }
}

/// 模型文件内容
#[derive(Debug, Deserialize)]
struct ClassicalArtifact {
    schema_version: u32,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    classes: Vec<i64>,
    scaler: Option<StandardScaler>,
    model: Option<LinearClassifier>,
}

#[derive(Debug, Clone)]
pub struct ClassicalModel {
    scaler: StandardScaler,
    classifier: LinearClassifier,
    classes: Vec<i64>,
}

impl ClassicalModel {
    pub fn from_path(path: &Path) -> Result<Self> {
        tracing::info!("Loading classical model from: {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let artifact: ClassicalArtifact = serde_json::from_str(raw)?;

        let (scaler, classifier) = match (artifact.scaler, artifact.model) {
            (Some(scaler), Some(model)) => (scaler, model),
            _ => {
                return Err(ServiceError::InvalidArtifact(
                    "artifact missing expected keys (model, scaler)".to_string(),
                ))
            }
        };

        let model = Self {
            scaler,
            classifier,
            classes: artifact.classes,
        };
        model.validate(artifact.schema_version, artifact.feature_names.as_deref())?;
        Ok(model)
    }

    /// 加载时校验，避免特征顺序或类别顺序不一致导致静默错误
    fn validate(&self, schema_version: u32, feature_names: Option<&[String]>) -> Result<()> {
        if schema_version != FEATURE_SCHEMA_VERSION {
            return Err(ServiceError::InvalidArtifact(format!(
                "feature schema version {} does not match extractor version {}",
                schema_version, FEATURE_SCHEMA_VERSION
            )));
        }

        let counts = [
            ("scaler.mean", self.scaler.mean.len()),
            ("scaler.scale", self.scaler.scale.len()),
            ("model.coef", self.classifier.coef().len()),
        ];
        for (field, len) in counts {
            if len != FEATURE_COUNT {
                return Err(ServiceError::InvalidArtifact(format!(
                    "{} has {} features, extractor produces {}",
                    field, len, FEATURE_COUNT
                )));
            }
        }

        if let Some(names) = feature_names {
            let matches = names.len() == FEATURE_COUNT
                && names.iter().zip(FEATURE_NAMES.iter()).all(|(a, b)| a.as_str() == *b);
            if !matches {
                return Err(ServiceError::InvalidArtifact(
                    "feature names do not match extractor order".to_string(),
                ));
            }
        }

        if self.classes.len() != 2 || self.classes[1] != POSITIVE_CLASS {
            return Err(ServiceError::InvalidArtifact(format!(
                "expected two classes with positive class {} last, got {:?}",
                POSITIVE_CLASS, self.classes
            )));
        }

        Ok(())
    }

    pub fn has_probabilities(&self) -> bool {
        matches!(self.classifier, LinearClassifier::LogisticRegression { .. })
    }

    /// 正类得分：有概率输出时取最后一列，否则用硬标签换算伪概率
    pub fn positive_score(&self, features: &FeatureVector) -> Result<f32> {
        if features.len() != FEATURE_COUNT {
            return Err(ServiceError::Inference(format!(
                "expected {} features, got {}",
                FEATURE_COUNT,
                features.len()
            )));
        }

        let scaled = self.scaler.transform(features.as_slice());

        let score = match self.classifier.predict_proba(&scaled) {
            Some(probs) => probs.last().copied().unwrap_or(0.0) as f32,
            None => {
                let label = self.classes[self.classifier.predict(&scaled)];
                if label == POSITIVE_CLASS {
                    PSEUDO_PROB_POSITIVE
                } else {
                    PSEUDO_PROB_NEGATIVE
                }
            }
        };

        tracing::debug!("Classical positive score: {:.4}", score);
        Ok(score)
    }
}
