//! Stateless prediction dispatcher over a read-only bundle registry

use crate::artifacts::BundleRegistry;
use crate::error::PredictError;
use crate::models::{City, FeatureRecord, FeatureRow, HouseInput, PredictionResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Result of a dispatch: the client response plus the drift-monitor row
#[derive(Debug, Clone)]
pub struct Prediction {
    pub result: PredictionResult,
    pub row: FeatureRow,
}

/// Routes validated features to the matching model bundle
///
/// Cheap to clone; all clones share the same registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    bundles: Arc<BundleRegistry>,
}

impl Dispatcher {
    pub fn new(bundles: Arc<BundleRegistry>) -> Self {
        Self { bundles }
    }

    pub fn bundles(&self) -> &BundleRegistry {
        &self.bundles
    }

    /// Predict the price per m² for validated features in a city
    pub fn predict(&self, features: &FeatureRecord, city: City) -> Result<Prediction, PredictError> {
        if !self.bundles.supports_city(city) {
            return Err(PredictError::UnsupportedCity(city.to_string()));
        }

        let property_type = features.type_local();
        let bundle = self
            .bundles
            .get(city, property_type)
            .ok_or_else(|| PredictError::UnsupportedPropertyType(property_type.to_string()))?;

        let start = Instant::now();
        let value = bundle.estimate(&features.to_vector())?;
        debug!(
            city = %city,
            property_type = %property_type,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Inference completed"
        );

        Ok(Prediction {
            result: PredictionResult {
                estimated_price_per_area: value,
                city_label: city.label().to_string(),
                model_name: bundle.model_name().to_string(),
            },
            row: features.to_row(),
        })
    }

    /// Validate a raw payload and city name, then predict
    ///
    /// The city is checked first, but either check fails with its own
    /// error regardless of the other.
    pub fn dispatch(&self, input: HouseInput, city: &str) -> Result<Prediction, PredictError> {
        let city: City = city.parse()?;
        let features = FeatureRecord::try_from(input)?;
        self.predict(&features, city)
    }

    /// Run `predict` on the blocking pool so async callers are not held
    pub async fn predict_offloaded(
        &self,
        features: FeatureRecord,
        city: City,
    ) -> Result<Prediction, PredictError> {
        let dispatcher = self.clone();
        tokio::task::spawn_blocking(move || dispatcher.predict(&features, city))
            .await
            .map_err(|e| PredictError::InferenceFailure(format!("inference task failed: {}", e)))?
    }
}
