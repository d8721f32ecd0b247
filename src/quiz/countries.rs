use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

use crate::quiz::{Coordinates, UsedCodes};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read the country file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse the country file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("country {iso3} is invalid: {reason}")]
    Invalid { iso3: String, reason: String },

    #[error("the country file has no entries")]
    Empty,
}

/// Bounding box in degrees, stored in the file as `[west, south, east, north]`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([west, south, east, north]: [f64; 4]) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.west, b.south, b.east, b.north]
    }
}

impl BoundingBox {
    // Boxes with west > east wrap around the antimeridian
    fn width(&self) -> f64 {
        if self.west <= self.east {
            self.east - self.west
        } else {
            360.0 - (self.west - self.east)
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        if lat < self.south || lat > self.north {
            return false;
        }
        if self.west <= self.east {
            lng >= self.west && lng <= self.east
        } else {
            lng >= self.west || lng <= self.east
        }
    }

    pub fn area(&self) -> f64 {
        self.width() * (self.north - self.south)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Country {
    pub iso2: String,
    pub iso3: String,
    pub name_en: String,
    pub name_ko: String,
    pub capital_name: String,
    pub capital_lat: f64,
    pub capital_lng: f64,
    pub population: u64,
    pub bbox: BoundingBox,
}

impl Country {
    pub fn capital(&self) -> Coordinates {
        Coordinates {
            lat: self.capital_lat,
            lng: self.capital_lng,
        }
    }

    fn check(&self) -> Result<(), DatasetError> {
        let invalid = |reason: &str| DatasetError::Invalid {
            iso3: self.iso3.clone(),
            reason: reason.to_string(),
        };

        if self.iso3.len() != 3 || !self.iso3.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(invalid("iso3 must be three uppercase letters"));
        }
        if self.population == 0 {
            return Err(invalid("population must be positive"));
        }
        if !Coordinates::new(self.capital_lat, self.capital_lng).is_valid() {
            return Err(invalid("capital coordinates are out of range"));
        }
        if self.bbox.south > self.bbox.north {
            return Err(invalid("bounding box south edge is above its north edge"));
        }
        Ok(())
    }
}

/// Trims and upper-cases a user supplied country code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Read-only country reference data, loaded once at startup.
#[derive(Debug, Clone)]
pub struct CountryDataset {
    countries: Vec<Country>,
    index: HashMap<String, usize>,
}

impl CountryDataset {
    pub fn new(countries: Vec<Country>) -> Result<Self, DatasetError> {
        if countries.is_empty() {
            return Err(DatasetError::Empty);
        }

        let mut index = HashMap::with_capacity(countries.len());
        for (i, country) in countries.iter().enumerate() {
            country.check()?;
            if index.insert(country.iso3.clone(), i).is_some() {
                return Err(DatasetError::Invalid {
                    iso3: country.iso3.clone(),
                    reason: "duplicate iso3 code".to_string(),
                });
            }
        }

        Ok(Self { countries, index })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let countries: Vec<Country> = serde_json::from_reader(reader)?;
        Self::new(countries)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Country> {
        self.countries.iter()
    }

    pub fn by_iso3(&self, code: &str) -> Option<&Country> {
        self.index
            .get(&normalize_code(code))
            .map(|&i| &self.countries[i])
    }

    /// Case-insensitive exact match on the capital's name.
    pub fn by_capital_name(&self, name: &str) -> Option<&Country> {
        let name = name.trim().to_lowercase();
        self.countries
            .iter()
            .find(|c| c.capital_name.to_lowercase() == name)
    }

    /// Looks a country up by one of its own identifiers: either code, or
    /// the English or Korean name. Capitals never match.
    pub fn by_country_name(&self, query: &str) -> Option<&Country> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        if let Some(country) = self.by_iso3(query) {
            return Some(country);
        }

        let lowered = query.to_lowercase();
        self.countries.iter().find(|c| {
            c.iso2.eq_ignore_ascii_case(query)
                || c.name_en.to_lowercase() == lowered
                || c.name_ko == query
        })
    }

    /// The country whose bounding box contains the point. Boxes overlap
    /// along borders, so the tightest box wins.
    pub fn locate(&self, lat: f64, lng: f64) -> Option<&Country> {
        self.countries
            .iter()
            .filter(|c| c.bbox.contains(lat, lng))
            .min_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()))
    }

    /// Uniformly draws up to `count` distinct countries that are not in `exclude`.
    /// Returns fewer than `count` when the remaining pool is too small.
    pub fn random_sample<R: Rng + ?Sized>(
        &self,
        count: usize,
        exclude: &UsedCodes,
        rng: &mut R,
    ) -> Vec<&Country> {
        let pool: Vec<&Country> = self
            .countries
            .iter()
            .filter(|c| !exclude.contains(&c.iso3))
            .collect();

        pool.choose_multiple(rng, count).copied().collect()
    }

    /// Codes ordered from most to least populous. Unknown codes are dropped.
    pub fn sort_descending_by_population(&self, codes: &[String]) -> Vec<String> {
        let mut known: Vec<&Country> = codes.iter().filter_map(|c| self.by_iso3(c)).collect();
        known.sort_by(|a, b| b.population.cmp(&a.population));
        known.into_iter().map(|c| c.iso3.clone()).collect()
    }
}
