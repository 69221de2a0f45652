//! 已知模型的固定配置：别名、类别标签、默认阈值。

/// 神经网络模型文件扩展名
pub const NEURAL_MODEL_EXTENSION: &str = "onnx";

/// 传统（特征）模型的固定文件名
pub const CLASSICAL_MODEL_FILE: &str = "parkinson_model.json";

/// 传统模型注册的名称，第一个为规范名称
pub const CLASSICAL_MODEL_NAMES: [&str; 2] = ["parkinson", "parkinsons"];

/// 友好名称 -> 规范名称
pub const ALIASES: [(&str, &str); 2] = [
    ("alzheimer", "alzimer"),
    ("brain_tumor", "brain_tumor_cnn_model"),
];

const ALZHEIMER_LABELS: [&str; 4] = [
    "Mild Demented",
    "Moderate Demented",
    "Non Demented",
    "Very Mild Demented",
];
const BRAIN_TUMOR_LABELS: [&str; 2] = ["No Tumor", "Tumor Detected"];
const PARKINSON_LABELS: [&str; 2] = ["No Parkinson's", "Parkinson's"];

/// 按名称查找类别标签，未知模型返回空集合
pub fn labels_for(name: &str) -> Vec<String> {
    let labels: &[&str] = match name {
        "alzheimer" | "alzimer" => &ALZHEIMER_LABELS,
        "brain_tumor" | "brain_tumor_cnn_model" => &BRAIN_TUMOR_LABELS,
        "parkinson" | "parkinsons" | "parkinson_model" => &PARKINSON_LABELS,
        _ => &[],
    };
    labels.iter().map(|s| s.to_string()).collect()
}

/// 二分类模型在请求未指定阈值时使用的默认阈值
pub fn default_threshold(name: &str) -> Option<f32> {
    match name {
        "brain_tumor" | "brain_tumor_cnn_model" => Some(0.8),
        _ => None,
    }
}
