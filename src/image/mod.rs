pub mod features;
pub mod loader;
pub mod preprocessing;

pub use features::{FeatureCapabilities, FeatureExtractor, FeatureVector};
pub use loader::ImageLoader;
pub use preprocessing::{ChannelOrder, ImagePreprocessor, InputLayout};
