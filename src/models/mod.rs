pub mod catalog;
pub mod classical;
pub mod neural;
pub mod registry;

pub use classical::ClassicalModel;
pub use neural::{NeuralLoader, NeuralModel, OnnxLoader, OnnxModel};
pub use registry::{LoadedModel, ModelDescriptor, ModelKind, ModelRegistry};
