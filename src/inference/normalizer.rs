//! 将不同模型的原始输出统一为 `{class, confidence}`。

use crate::inference::Prediction;
use crate::utils::error::ServiceError;
use crate::Result;
use ndarray::ArrayViewD;

/// 未指定阈值时的二分类阈值
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// 传统分类器的固定判定阈值（不可由请求覆盖）
pub const CLASSICAL_THRESHOLD: f32 = 0.8;

/// 阈值优先级：请求参数 > 模型默认值 > 0.5
pub fn resolve_threshold(requested: Option<f32>, model_default: Option<f32>) -> f32 {
    requested.or(model_default).unwrap_or(DEFAULT_THRESHOLD)
}

fn label_at(labels: &[String], idx: usize) -> String {
    labels
        .get(idx)
        .cloned()
        .unwrap_or_else(|| format!("Class {}", idx))
}

/// 第一个最大值的下标
fn argmax<'a>(scores: impl Iterator<Item = &'a f32>) -> Option<(usize, f32)> {
    scores
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
}

/// 多分类：取最大分数对应的类别，分数直接作为置信度
pub fn decode_multiclass<'a>(
    scores: impl Iterator<Item = &'a f32>,
    labels: &[String],
) -> Result<Prediction> {
    let (idx, score) = argmax(scores)
        .ok_or_else(|| ServiceError::Inference("Model returned no scores".to_string()))?;
    Ok(Prediction::new(label_at(labels, idx), score))
}

/// 二分类：score 为正类概率，置信度为所选一侧的概率
pub fn decode_binary(score: f32, threshold: f32, labels: &[String]) -> Prediction {
    if score >= threshold {
        Prediction::new(label_at(labels, 1), score)
    } else {
        Prediction::new(label_at(labels, 0), 1.0 - score)
    }
}

/// 神经网络输出归一化
pub fn normalize_output(
    output: &ArrayViewD<f32>,
    labels: &[String],
    threshold: f32,
) -> Result<Prediction> {
    let shape = output.shape();

    // (1, N) 多分类概率
    if shape.len() == 2 && shape[0] == 1 && shape[1] > 1 {
        return decode_multiclass(output.iter(), labels);
    }

    // (B, 1) sigmoid 输出，取第一行
    if shape.len() == 2 && shape[0] >= 1 && shape[1] == 1 {
        return Ok(decode_binary(output[[0, 0]], threshold, labels));
    }

    // 其他形状按展平后的向量处理
    match output.len() {
        0 => Err(ServiceError::Inference(format!(
            "Model returned an empty output with shape {:?}",
            shape
        ))),
        1 => {
            let score = output.iter().next().copied().unwrap_or_default();
            Ok(decode_binary(score, threshold, labels))
        }
        _ => decode_multiclass(output.iter(), labels),
    }
}

/// 传统分类器：固定阈值0.8，置信度取 max(score, 1-score)
pub fn normalize_classical(score: f32, labels: &[String]) -> Prediction {
    let idx = usize::from(score >= CLASSICAL_THRESHOLD);
    Prediction::new(label_at(labels, idx), score.max(1.0 - score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array, IxDyn};
    use proptest::prelude::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn multiclass_picks_argmax() {
        let out = arr2(&[[0.1f32, 0.6, 0.2, 0.1]]).into_dyn();
        let l = labels(&["a", "b", "c", "d"]);
        let pred = normalize_output(&out.view(), &l, 0.5).unwrap();
        assert_eq!(pred.class, "b");
        assert!((pred.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn multiclass_ties_pick_first_index() {
        let out = arr2(&[[0.4f32, 0.4, 0.2]]).into_dyn();
        let pred = normalize_output(&out.view(), &labels(&["a", "b", "c"]), 0.5).unwrap();
        assert_eq!(pred.class, "a");
    }

    #[test]
    fn out_of_range_index_falls_back_to_generic_label() {
        let out = arr2(&[[0.1f32, 0.2, 0.7]]).into_dyn();
        let pred = normalize_output(&out.view(), &labels(&["a", "b"]), 0.5).unwrap();
        assert_eq!(pred.class, "Class 2");
    }

    #[test]
    fn binary_scalar_uses_threshold() {
        let l = labels(&["No Tumor", "Tumor Detected"]);
        let out = arr2(&[[0.85f32]]).into_dyn();

        let strict = normalize_output(&out.view(), &l, 0.8).unwrap();
        assert_eq!(strict.class, "Tumor Detected");
        assert!((strict.confidence - 0.85).abs() < 1e-6);

        let stricter = normalize_output(&out.view(), &l, 0.9).unwrap();
        assert_eq!(stricter.class, "No Tumor");
        assert!((stricter.confidence - 0.15).abs() < 1e-6);
    }

    #[test]
    fn flat_vector_is_treated_as_multiclass() {
        let out = arr1(&[0.2f32, 0.3, 0.5]).into_dyn();
        let pred = normalize_output(&out.view(), &labels(&["x", "y", "z"]), 0.5).unwrap();
        assert_eq!(pred.class, "z");
        assert!((pred.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn degenerate_scalar_is_treated_as_binary() {
        let out = Array::from_shape_vec(IxDyn(&[1, 1, 1]), vec![0.3f32]).unwrap();
        let pred = normalize_output(&out.view(), &labels(&["neg", "pos"]), 0.5).unwrap();
        assert_eq!(pred.class, "neg");
        assert!((pred.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn empty_output_is_an_error() {
        let out = Array::<f32, _>::zeros(IxDyn(&[1, 0]));
        assert!(normalize_output(&out.view(), &labels(&["a", "b"]), 0.5).is_err());
    }

    #[test]
    fn threshold_resolution_order() {
        assert_eq!(resolve_threshold(Some(0.3), Some(0.8)), 0.3);
        assert_eq!(resolve_threshold(None, Some(0.8)), 0.8);
        assert_eq!(resolve_threshold(None, None), 0.5);
    }

    #[test]
    fn classical_pseudo_probability_passes_fixed_threshold() {
        let l = labels(&["No Parkinson's", "Parkinson's"]);
        let pred = normalize_classical(0.9, &l);
        assert_eq!(pred.class, "Parkinson's");
        assert!((pred.confidence - 0.9).abs() < 1e-6);

        // 0.7 低于固定阈值0.8，判为负类，但置信度仍取较大一侧
        let pred = normalize_classical(0.7, &l);
        assert_eq!(pred.class, "No Parkinson's");
        assert!((pred.confidence - 0.7).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn one_hot_maps_to_its_label(n in 2usize..12, seed in 0usize..1000, peak in 0.5f32..1.0) {
            let i = seed % n;
            let l: Vec<String> = (0..n).map(|k| format!("label{k}")).collect();
            let rest = (1.0 - peak) / n as f32;
            let scores: Vec<f32> = (0..n).map(|k| if k == i { peak } else { rest }).collect();
            let out = Array::from_shape_vec(IxDyn(&[1, n]), scores).unwrap();

            let pred = normalize_output(&out.view(), &l, 0.5).unwrap();
            prop_assert_eq!(&pred.class, &l[i]);
            prop_assert_eq!(pred.confidence, peak);
        }

        #[test]
        fn binary_confidence_is_mass_of_chosen_side(p in 0.0f32..=1.0, t in 0.0f32..=1.0) {
            let l = vec!["neg".to_string(), "pos".to_string()];
            let pred = decode_binary(p, t, &l);
            if p >= t {
                prop_assert_eq!(pred.class.as_str(), "pos");
                prop_assert_eq!(pred.confidence, p);
            } else {
                prop_assert_eq!(pred.class.as_str(), "neg");
                prop_assert_eq!(pred.confidence, 1.0 - p);
            }
        }

        #[test]
        fn default_threshold_confidence_at_least_half(p in 0.0f32..=1.0) {
            let l = vec!["neg".to_string(), "pos".to_string()];
            let pred = decode_binary(p, DEFAULT_THRESHOLD, &l);
            prop_assert!(pred.confidence >= 0.5);
        }

        #[test]
        fn classical_confidence_at_least_half(p in 0.0f32..=1.0) {
            let l = vec!["neg".to_string(), "pos".to_string()];
            prop_assert!(normalize_classical(p, &l).confidence >= 0.5);
        }
    }
}
