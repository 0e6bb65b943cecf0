//! Core data models for the price estimator

use crate::error::PredictError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column names shared by drift rows and the reference dataset
pub mod columns {
    pub const SURFACE_BATI: &str = "Surface reelle bati";
    pub const NOMBRE_PIECES: &str = "Nombre pieces principales";
    pub const SURFACE_TERRAIN: &str = "Surface terrain";
    pub const NOMBRE_LOTS: &str = "Nombre de lots";
    pub const PRIX_M2: &str = "prix_m2";

    /// All drift columns, in frame order
    pub const ALL: [&str; 5] = [
        SURFACE_BATI,
        NOMBRE_PIECES,
        SURFACE_TERRAIN,
        NOMBRE_LOTS,
        PRIX_M2,
    ];
}

/// Supported cities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum City {
    Lille,
    Bordeaux,
}

impl City {
    pub const ALL: [City; 2] = [City::Lille, City::Bordeaux];

    pub fn as_str(&self) -> &'static str {
        match self {
            City::Lille => "lille",
            City::Bordeaux => "bordeaux",
        }
    }

    /// Capitalized name reported to clients
    pub fn label(&self) -> &'static str {
        match self {
            City::Lille => "Lille",
            City::Bordeaux => "Bordeaux",
        }
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for City {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lille" => Ok(City::Lille),
            "bordeaux" => Ok(City::Bordeaux),
            _ => Err(PredictError::UnsupportedCity(s.to_string())),
        }
    }
}

/// Supported property categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Appartement,
    Maison,
}

impl PropertyType {
    pub const ALL: [PropertyType; 2] = [PropertyType::Appartement, PropertyType::Maison];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Appartement => "appartement",
            PropertyType::Maison => "maison",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "appartement" => Ok(PropertyType::Appartement),
            "maison" => Ok(PropertyType::Maison),
            _ => Err(PredictError::UnsupportedPropertyType(s.to_string())),
        }
    }
}

/// Raw property description as received over the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseInput {
    pub surface_bati: f64,
    pub nombre_pieces: u32,
    pub type_local: String,
    pub surface_terrain: f64,
    pub nombre_lots: u32,
}

/// Property description paired with the target city
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityHouseInput {
    pub ville: String,
    pub features: HouseInput,
}

/// Validated property features
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRecord {
    surface_bati: f64,
    nombre_pieces: u32,
    type_local: PropertyType,
    surface_terrain: f64,
    nombre_lots: u32,
}

impl FeatureRecord {
    pub fn new(
        surface_bati: f64,
        nombre_pieces: u32,
        type_local: PropertyType,
        surface_terrain: f64,
        nombre_lots: u32,
    ) -> Result<Self, PredictError> {
        check_surface("surface_bati", surface_bati)?;
        check_surface("surface_terrain", surface_terrain)?;
        Ok(Self {
            surface_bati,
            nombre_pieces,
            type_local,
            surface_terrain,
            nombre_lots,
        })
    }

    pub fn surface_bati(&self) -> f64 {
        self.surface_bati
    }

    pub fn nombre_pieces(&self) -> u32 {
        self.nombre_pieces
    }

    pub fn type_local(&self) -> PropertyType {
        self.type_local
    }

    pub fn surface_terrain(&self) -> f64 {
        self.surface_terrain
    }

    pub fn nombre_lots(&self) -> u32 {
        self.nombre_lots
    }

    /// Model input vector: surface_bati, nombre_pieces, surface_terrain, nombre_lots
    pub fn to_vector(&self) -> [f64; 4] {
        [
            self.surface_bati,
            self.nombre_pieces as f64,
            self.surface_terrain,
            self.nombre_lots as f64,
        ]
    }

    /// Labelled mapping consumed by the drift monitor
    pub fn to_row(&self) -> FeatureRow {
        FeatureRow {
            surface_reelle_bati: self.surface_bati,
            nombre_pieces_principales: self.nombre_pieces as f64,
            surface_terrain: self.surface_terrain,
            nombre_de_lots: self.nombre_lots as f64,
        }
    }
}

impl TryFrom<HouseInput> for FeatureRecord {
    type Error = PredictError;

    fn try_from(input: HouseInput) -> Result<Self, Self::Error> {
        let type_local: PropertyType = input.type_local.parse()?;
        FeatureRecord::new(
            input.surface_bati,
            input.nombre_pieces,
            type_local,
            input.surface_terrain,
            input.nombre_lots,
        )
    }
}

fn check_surface(name: &str, value: f64) -> Result<(), PredictError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PredictError::InvalidFeatures(format!(
            "{} doit être un nombre positif (reçu {})",
            name, value
        )));
    }
    Ok(())
}

/// Estimated price returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "prix_m2_estime")]
    pub estimated_price_per_area: f64,
    #[serde(rename = "ville_modele")]
    pub city_label: String,
    #[serde(rename = "model")]
    pub model_name: String,
}

/// Input features keyed by reference dataset column names
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    #[serde(rename = "Surface reelle bati")]
    pub surface_reelle_bati: f64,
    #[serde(rename = "Nombre pieces principales")]
    pub nombre_pieces_principales: f64,
    #[serde(rename = "Surface terrain")]
    pub surface_terrain: f64,
    #[serde(rename = "Nombre de lots")]
    pub nombre_de_lots: f64,
}

/// One buffered prediction: features plus predicted price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftRow {
    #[serde(rename = "Surface reelle bati")]
    pub surface_reelle_bati: f64,
    #[serde(rename = "Nombre pieces principales")]
    pub nombre_pieces_principales: f64,
    #[serde(rename = "Surface terrain")]
    pub surface_terrain: f64,
    #[serde(rename = "Nombre de lots")]
    pub nombre_de_lots: f64,
    pub prix_m2: f64,
}

impl DriftRow {
    pub fn new(row: FeatureRow, predicted: f64) -> Self {
        Self {
            surface_reelle_bati: row.surface_reelle_bati,
            nombre_pieces_principales: row.nombre_pieces_principales,
            surface_terrain: row.surface_terrain,
            nombre_de_lots: row.nombre_de_lots,
            prix_m2: predicted,
        }
    }

    /// Value for a column name, `None` for unknown columns
    pub fn value(&self, column: &str) -> Option<f64> {
        match column {
            columns::SURFACE_BATI => Some(self.surface_reelle_bati),
            columns::NOMBRE_PIECES => Some(self.nombre_pieces_principales),
            columns::SURFACE_TERRAIN => Some(self.surface_terrain),
            columns::NOMBRE_LOTS => Some(self.nombre_de_lots),
            columns::PRIX_M2 => Some(self.prix_m2),
            _ => None,
        }
    }
}
