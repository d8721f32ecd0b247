use crate::quiz::countries::CountryDataset;
use crate::quiz::error::{QuizError, QuizResult};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_THRESHOLD_KM: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClickValidation {
    pub correct: bool,
    pub distance_km: f64,
}

pub fn country_match(target_iso3: &str, clicked_iso3: &str) -> bool {
    target_iso3 == clicked_iso3
}

/// Great-circle distance between two points given in degrees.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` just past 1 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// A click counts when it lands within `threshold_km` of the capital.
/// The distance is reported either way so players can see how close they got.
pub fn capital_distance(
    click_lat: f64,
    click_lng: f64,
    true_lat: f64,
    true_lng: f64,
    threshold_km: f64,
) -> ClickValidation {
    let distance_km = haversine_km(click_lat, click_lng, true_lat, true_lng);
    ClickValidation {
        correct: distance_km <= threshold_km,
        distance_km,
    }
}

fn non_increasing(populations: &[u64]) -> bool {
    populations.windows(2).all(|pair| pair[0] >= pair[1])
}

/// Lenient check: codes without a dataset entry are skipped.
pub fn population_order_correct(dataset: &CountryDataset, ordered: &[String]) -> bool {
    let populations: Vec<u64> = ordered
        .iter()
        .filter_map(|code| dataset.by_iso3(code))
        .map(|c| c.population)
        .collect();

    non_increasing(&populations)
}

/// Strict check: any unknown code is a dataset gap, not a silent skip.
pub fn population_order_strict(dataset: &CountryDataset, ordered: &[String]) -> QuizResult<bool> {
    let populations = ordered
        .iter()
        .map(|code| {
            dataset
                .by_iso3(code)
                .map(|c| c.population)
                .ok_or_else(|| QuizError::DatasetGap { iso3: code.clone() })
        })
        .collect::<QuizResult<Vec<u64>>>()?;

    Ok(non_increasing(&populations))
}
