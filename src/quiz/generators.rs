use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz::countries::CountryDataset;
use crate::quiz::{CapitalStep, CountrySummary, Mode, Question, Tier, UsedCodes};

pub fn generate_find_on_globe<R: Rng + ?Sized>(
    dataset: &CountryDataset,
    used: &UsedCodes,
    rng: &mut R,
) -> Option<Question> {
    let country = dataset.random_sample(1, used, rng).pop()?;

    Some(Question::FindOnGlobe {
        target: CountrySummary::from(country),
    })
}

/// Capital questions always start on the country-picking step.
pub fn generate_capital_locate<R: Rng + ?Sized>(
    dataset: &CountryDataset,
    used: &UsedCodes,
    rng: &mut R,
) -> Option<Question> {
    let country = dataset.random_sample(1, used, rng).pop()?;

    Some(Question::CapitalLocate {
        iso3: country.iso3.clone(),
        capital_name: country.capital_name.clone(),
        capital: country.capital(),
        step: CapitalStep::PickCountry,
    })
}

pub fn generate_population_order<R: Rng + ?Sized>(
    dataset: &CountryDataset,
    tier: Tier,
    used: &UsedCodes,
    rng: &mut R,
) -> Option<Question> {
    let count = tier.item_count();
    let sample = dataset.random_sample(count, used, rng);
    if sample.len() < count {
        return None;
    }

    // Shuffle so the presented order never leaks the answer
    let mut items: Vec<CountrySummary> = sample.into_iter().map(CountrySummary::from).collect();
    items.shuffle(rng);

    Some(Question::PopulationOrder { tier, items })
}

/// Builds the next question for `mode`, or `None` when the unused pool
/// cannot fill one.
pub fn generate_question<R: Rng + ?Sized>(
    mode: Mode,
    dataset: &CountryDataset,
    used: &UsedCodes,
    rng: &mut R,
) -> Option<Question> {
    match mode {
        Mode::FindOnGlobe => generate_find_on_globe(dataset, used, rng),
        Mode::CapitalLocate => generate_capital_locate(dataset, used, rng),
        Mode::PopulationOrder(tier) => generate_population_order(dataset, tier, used, rng),
    }
}
