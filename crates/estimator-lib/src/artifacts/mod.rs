//! Model artifacts
//!
//! This module provides:
//! - Regression models and scalers deserialized from exported artifacts
//! - The `ArtifactStore` seam used at startup to obtain bundles
//! - A read-only registry holding one bundle per (city, property type)

mod regressor;
mod scaler;
mod store_fs;

pub use regressor::{DecisionTree, RegressionModel, TreeNode};
pub use scaler::Scaler;
pub use store_fs::JsonArtifactStore;

use crate::error::{ArtifactError, PredictError};
use crate::models::{City, PropertyType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Number of model input features
pub const NUM_FEATURES: usize = 4;

/// Model plus input and output scalers for one (city, property type)
#[derive(Debug, Clone)]
pub struct ModelBundle {
    model: RegressionModel,
    input_scaler: Scaler,
    output_scaler: Scaler,
}

impl ModelBundle {
    /// Build a bundle, checking that the three parts agree on shapes
    pub fn new(
        model: RegressionModel,
        input_scaler: Scaler,
        output_scaler: Scaler,
    ) -> Result<Self, ArtifactError> {
        input_scaler.validate(NUM_FEATURES)?;
        output_scaler.validate(1)?;
        model.validate(NUM_FEATURES)?;
        Ok(Self {
            model,
            input_scaler,
            output_scaler,
        })
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Scale the input row, run the model, and unscale the output
    pub fn estimate(&self, vector: &[f64; NUM_FEATURES]) -> Result<f64, PredictError> {
        let scaled = self.input_scaler.transform(vector)?;
        let output_scaled = self.model.predict(&scaled)?;
        let output = self.output_scaler.inverse_transform(&[output_scaled])?;

        match output.first() {
            Some(value) if value.is_finite() => Ok(*value),
            Some(value) => Err(PredictError::InferenceFailure(format!(
                "model produced non-finite value {}",
                value
            ))),
            None => Err(PredictError::InferenceFailure("model produced no output".into())),
        }
    }
}

/// Source of model bundles, consulted once per bundle at startup
pub trait ArtifactStore: Send + Sync {
    fn load(&self, city: City, property_type: PropertyType) -> Result<ModelBundle, ArtifactError>;
}

/// Read-only set of bundles keyed by (city, property type)
#[derive(Debug, Clone, Default)]
pub struct BundleRegistry {
    bundles: HashMap<(City, PropertyType), Arc<ModelBundle>>,
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Eagerly load every property type for each city; any failure aborts
    pub fn load_all(store: &dyn ArtifactStore, cities: &[City]) -> Result<Self, ArtifactError> {
        let mut registry = Self::new();
        for &city in cities {
            for property_type in PropertyType::ALL {
                let bundle = store.load(city, property_type)?;
                info!(
                    city = %city,
                    property_type = %property_type,
                    model = bundle.model_name(),
                    "Model bundle loaded"
                );
                registry.insert(city, property_type, bundle);
            }
        }
        Ok(registry)
    }

    /// Add a bundle; a later insert for the same key replaces the earlier one
    pub fn insert(&mut self, city: City, property_type: PropertyType, bundle: ModelBundle) {
        self.bundles.insert((city, property_type), Arc::new(bundle));
    }

    pub fn get(&self, city: City, property_type: PropertyType) -> Option<&Arc<ModelBundle>> {
        self.bundles.get(&(city, property_type))
    }

    pub fn supports_city(&self, city: City) -> bool {
        self.bundles.keys().any(|(c, _)| *c == city)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(City, PropertyType), &Arc<ModelBundle>)> {
        self.bundles.iter()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_bundle(intercept: f64) -> ModelBundle {
        ModelBundle::new(
            RegressionModel::LinearRegression {
                coefficients: vec![1.0, 0.0, 0.0, 0.0],
                intercept,
            },
            Scaler::StandardScaler {
                mean: vec![0.0; NUM_FEATURES],
                scale: vec![1.0; NUM_FEATURES],
            },
            Scaler::StandardScaler {
                mean: vec![0.0],
                scale: vec![1.0],
            },
        )
        .unwrap()
    }

    struct FailingStore;

    impl ArtifactStore for FailingStore {
        fn load(&self, _city: City, _pt: PropertyType) -> Result<ModelBundle, ArtifactError> {
            Err(ArtifactError::Shape("corrupt".into()))
        }
    }

    struct CountingStore {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl ArtifactStore for CountingStore {
        fn load(&self, _city: City, _pt: PropertyType) -> Result<ModelBundle, ArtifactError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(identity_bundle(0.0))
        }
    }

    #[test]
    fn test_bundle_rejects_mismatched_scaler() {
        let result = ModelBundle::new(
            RegressionModel::LinearRegression {
                coefficients: vec![1.0; NUM_FEATURES],
                intercept: 0.0,
            },
            Scaler::StandardScaler {
                mean: vec![0.0; 3],
                scale: vec![1.0; 3],
            },
            Scaler::StandardScaler {
                mean: vec![0.0],
                scale: vec![1.0],
            },
        );
        assert!(matches!(result, Err(ArtifactError::Shape(_))));
    }

    #[test]
    fn test_bundle_estimate_pipeline() {
        let bundle = ModelBundle::new(
            RegressionModel::LinearRegression {
                coefficients: vec![0.5, 0.0, 0.0, 0.0],
                intercept: 0.0,
            },
            Scaler::StandardScaler {
                mean: vec![100.0, 0.0, 0.0, 0.0],
                scale: vec![10.0, 1.0, 1.0, 1.0],
            },
            Scaler::StandardScaler {
                mean: vec![3000.0],
                scale: vec![200.0],
            },
        )
        .unwrap();

        // (120 - 100) / 10 = 2 -> 1.0 -> 1.0 * 200 + 3000
        let value = bundle.estimate(&[120.0, 3.0, 0.0, 0.0]).unwrap();
        assert!((value - 3200.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_all_loads_every_pair_once() {
        let store = CountingStore {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let registry = BundleRegistry::load_all(&store, &City::ALL).unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(store.calls.load(std::sync::atomic::Ordering::SeqCst), 4);
        for city in City::ALL {
            assert!(registry.supports_city(city));
            for pt in PropertyType::ALL {
                assert!(registry.get(city, pt).is_some());
            }
        }
    }

    #[test]
    fn test_load_all_fails_on_any_bundle_error() {
        assert!(BundleRegistry::load_all(&FailingStore, &City::ALL).is_err());
    }
}
