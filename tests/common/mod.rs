#![allow(dead_code)]

use ndarray::ArrayD;
use onnx_medscan::models::{NeuralLoader, NeuralModel};
use onnx_medscan::{Result, ServiceError};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 固定输出的假模型
pub struct FixedModel {
    pub shape: Option<Vec<i64>>,
    pub output: ArrayD<f32>,
}

impl NeuralModel for FixedModel {
    fn input_shape(&self) -> Option<&[i64]> {
        self.shape.as_deref()
    }

    fn predict(&self, batch: ArrayD<f32>) -> Result<ArrayD<f32>> {
        if let Some(shape) = &self.shape {
            assert_eq!(batch.ndim(), shape.len());
        }
        Ok(self.output.clone())
    }
}

/// 按文件名返回假模型；文件名包含 "corrupt" 时加载失败，
/// 包含 "flaky" 时只有第一次加载失败
#[derive(Default)]
pub struct FakeLoader {
    outputs: HashMap<String, ArrayD<f32>>,
    pub loads: AtomicUsize,
    flaky_attempts: AtomicUsize,
}

impl FakeLoader {
    pub fn with_output(mut self, stem: &str, output: ArrayD<f32>) -> Self {
        self.outputs.insert(stem.to_string(), output);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl NeuralLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn NeuralModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase();

        if stem.contains("flaky") {
            let attempt = self.flaky_attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                // 第一次加载慢且失败，让并发请求在槽位上等待
                std::thread::sleep(std::time::Duration::from_millis(50));
                return Err(ServiceError::InvalidArtifact(format!("{} not ready", stem)));
            }
        }

        if stem.contains("corrupt") {
            return Err(ServiceError::InvalidArtifact(format!("{} is corrupt", stem)));
        }

        let output = self
            .outputs
            .get(&stem)
            .cloned()
            .unwrap_or_else(|| ndarray::arr2(&[[0.5f32]]).into_dyn());

        Ok(Arc::new(FixedModel {
            shape: Some(vec![-1, 64, 64, 3]),
            output,
        }))
    }
}

/// 在目录中创建空的模型文件
pub fn touch(dir: &Path, file: &str) {
    std::fs::write(dir.join(file), b"").unwrap();
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 9 % 256) as u8, (y * 5 % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// 与 src/models/classical.rs 中格式一致的传统模型文件
pub fn classical_artifact(kind: &str, intercept: f64) -> String {
    use onnx_medscan::image::features::{FEATURE_COUNT, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};

    serde_json::json!({
        "schema_version": FEATURE_SCHEMA_VERSION,
        "feature_names": &FEATURE_NAMES[..],
        "classes": [0, 1],
        "scaler": {
            "mean": vec![0.0; FEATURE_COUNT],
            "scale": vec![1.0; FEATURE_COUNT],
        },
        "model": {
            "kind": kind,
            "coef": vec![0.0; FEATURE_COUNT],
            "intercept": intercept,
        }
    })
    .to_string()
}
