//! Dataset types, file loading and fitted preprocessing.

pub mod loader;
pub mod preprocessing;
pub mod types;

pub use loader::{DatasetLoader, LoaderError};
pub use preprocessing::{FeatureSelection, KBestSelector, ScalerParams, StandardScaler};
pub use types::{Dataset, DatasetError, DatasetResult, OrderKey, Record};
