use crate::image::{FeatureCapabilities, FeatureExtractor};
use crate::models::catalog::{
    self, ALIASES, CLASSICAL_MODEL_FILE, CLASSICAL_MODEL_NAMES, NEURAL_MODEL_EXTENSION,
};
use crate::models::{ClassicalModel, NeuralLoader, NeuralModel};
use crate::utils::error::ServiceError;
use crate::Result;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Neural,
    Classical,
}

/// 发现阶段创建，之后不再修改
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub kind: ModelKind,
    pub labels: Vec<String>,
    pub default_threshold: Option<f32>,
}

pub enum LoadedModel {
    Neural(Arc<dyn NeuralModel>),
    Classical(ClassicalModel),
}

/// 一个模型文件对应一个槽位，别名共享同一个槽位
struct ModelSlot {
    descriptor: ModelDescriptor,
    names: Vec<String>,
    model: OnceCell<Arc<LoadedModel>>,
}

/// 模型注册表：发现、别名、懒加载与失败记录
pub struct ModelRegistry {
    slots: BTreeMap<String, Arc<ModelSlot>>,
    skipped: Mutex<BTreeMap<String, String>>,
    loader: Arc<dyn NeuralLoader>,
}

impl ModelRegistry {
    /// 扫描模型目录并注册所有模型（不加载）
    pub fn discover(models_dir: impl AsRef<Path>, loader: Arc<dyn NeuralLoader>) -> Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        let mut registry = Self {
            slots: BTreeMap::new(),
            skipped: Mutex::new(BTreeMap::new()),
            loader,
        };

        if !models_dir.is_dir() {
            tracing::warn!(
                "Models directory not found: {}, no models registered",
                models_dir.display()
            );
            return Ok(registry);
        }

        let mut neural: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in std::fs::read_dir(&models_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_model = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(NEURAL_MODEL_EXTENSION));
            if !is_model {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                neural.insert(stem.to_lowercase(), path);
            }
        }

        for (name, path) in &neural {
            let mut names = vec![name.clone()];
            for (alias, target) in ALIASES {
                if target == name.as_str() && !neural.contains_key(alias) {
                    names.push(alias.to_string());
                }
            }
            registry.insert_slot(Self::descriptor(name, path.clone(), ModelKind::Neural), names);
        }

        let classical_path = models_dir.join(CLASSICAL_MODEL_FILE);
        if classical_path.is_file() {
            let names: Vec<String> = CLASSICAL_MODEL_NAMES
                .iter()
                .filter(|n| !registry.slots.contains_key(**n))
                .map(|n| n.to_string())
                .collect();

            if let Some(canonical) = names.first() {
                let descriptor = Self::descriptor(canonical, classical_path, ModelKind::Classical);
                registry.insert_slot(descriptor, names);

                let caps = FeatureExtractor::capabilities();
                if caps.degraded() {
                    tracing::warn!(
                        "Feature extraction is degraded (texture={}, edges={}), classical predictions lose accuracy",
                        caps.texture,
                        caps.edges
                    );
                }
            } else {
                tracing::warn!(
                    "{} ignored: names {:?} already taken",
                    CLASSICAL_MODEL_FILE,
                    CLASSICAL_MODEL_NAMES
                );
            }
        }

        tracing::info!(
            "Discovered {} model names in {}",
            registry.slots.len(),
            models_dir.display()
        );
        Ok(registry)
    }

    fn descriptor(name: &str, path: PathBuf, kind: ModelKind) -> ModelDescriptor {
        ModelDescriptor {
            name: name.to_string(),
            path,
            kind,
            labels: catalog::labels_for(name),
            default_threshold: catalog::default_threshold(name),
        }
    }

    fn insert_slot(&mut self, descriptor: ModelDescriptor, names: Vec<String>) {
        tracing::debug!(
            "Registered {:?} model '{}' as {:?}",
            descriptor.kind,
            descriptor.name,
            names
        );
        let slot = Arc::new(ModelSlot {
            descriptor,
            names: names.clone(),
            model: OnceCell::new(),
        });
        for name in names {
            self.slots.insert(name, Arc::clone(&slot));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// 所有已注册的名称（含别名），已排序
    pub fn available(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn descriptor_for(&self, name: &str) -> Option<&ModelDescriptor> {
        self.slots.get(name).map(|slot| &slot.descriptor)
    }

    /// 已加载成功的名称（含别名），已排序
    pub fn loaded_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.model.get().is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// 加载失败的名称及原因
    pub fn skipped(&self) -> BTreeMap<String, String> {
        self.skipped.lock().clone()
    }

    pub fn feature_capabilities(&self) -> FeatureCapabilities {
        FeatureExtractor::capabilities()
    }

    /// 获取模型，首次访问时加载
    ///
    /// 同一槽位的并发首次访问只会触发一次加载。加载失败会记录到 skipped，
    /// 下一次请求该名称时重新尝试。
    pub fn get_or_load(&self, name: &str) -> Result<Arc<LoadedModel>> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| ServiceError::ModelNotFound {
                name: name.to_string(),
                available: self.available(),
            })?;

        if let Some(model) = slot.model.get() {
            return Ok(Arc::clone(model));
        }

        // skipped 的更新放在初始化闭包内，与槽位的初始化锁串行
        let loaded = slot.model.get_or_try_init(|| {
            let result = self.load_slot(slot);
            let mut skipped = self.skipped.lock();
            match &result {
                Ok(_) => {
                    for n in &slot.names {
                        skipped.remove(n);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", slot.descriptor.name, e);
                    let reason = format!("Failed to load: {}", e);
                    for n in &slot.names {
                        skipped.insert(n.clone(), reason.clone());
                    }
                }
            }
            result
        });

        loaded.map(Arc::clone).map_err(|e| ServiceError::ModelLoad {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn load_slot(&self, slot: &ModelSlot) -> Result<Arc<LoadedModel>> {
        let start = Instant::now();
        let descriptor = &slot.descriptor;

        let model = match descriptor.kind {
            ModelKind::Neural => LoadedModel::Neural(self.loader.load(&descriptor.path)?),
            ModelKind::Classical => {
                LoadedModel::Classical(ClassicalModel::from_path(&descriptor.path)?)
            }
        };

        tracing::info!(
            "Loaded {:?} model: {} -> {} ({:.3}s)",
            descriptor.kind,
            descriptor.name,
            descriptor.path.display(),
            start.elapsed().as_secs_f32()
        );
        Ok(Arc::new(model))
    }

    /// 启动时预加载全部模型，失败只记录不中断
    pub fn preload(&self) -> usize {
        let canonical: BTreeSet<&str> = self
            .slots
            .values()
            .map(|slot| slot.descriptor.name.as_str())
            .collect();

        canonical
            .into_iter()
            .filter(|name| self.get_or_load(name).is_ok())
            .count()
    }
}
