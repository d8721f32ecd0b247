pub mod ai_helper;
pub mod countries;
pub mod engine;
pub mod error;
pub mod generators;
pub mod run;
pub mod storage;
pub mod validators;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub use countries::{Country, CountryDataset};
pub use engine::{QuizEngine, SubmitOutcome};
pub use error::{InvalidState, QuizError, QuizResult};
pub use run::{Run, RunStatus, Verdict};
pub use storage::{InMemoryRunStore, RunStore};

/// Country codes already shown in a run.
pub type UsedCodes = BTreeSet<String>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct RunId(uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Tier {
    One,
    Two,
}

impl Tier {
    pub fn item_count(self) -> usize {
        match self {
            Tier::One => 3,
            Tier::Two => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    FindOnGlobe,
    CapitalLocate,
    PopulationOrder(Tier),
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::FindOnGlobe,
        Mode::CapitalLocate,
        Mode::PopulationOrder(Tier::One),
        Mode::PopulationOrder(Tier::Two),
    ];

    pub fn code(self) -> &'static str {
        match self {
            Mode::FindOnGlobe => "A1",
            Mode::CapitalLocate => "A2",
            Mode::PopulationOrder(Tier::One) => "B1",
            Mode::PopulationOrder(Tier::Two) => "B2",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Mode::FindOnGlobe => "Find on the globe",
            Mode::CapitalLocate => "Locate the capital",
            Mode::PopulationOrder(Tier::One) => "Population order (3)",
            Mode::PopulationOrder(Tier::Two) => "Population order (5)",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown game mode '{}'", self.0)
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Mode::ALL
            .into_iter()
            .find(|m| m.code().eq_ignore_ascii_case(trimmed) || m.title() == trimmed)
            .ok_or_else(|| UnknownMode(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CapitalStep {
    PickCountry,
    ClickCapital,
}

/// What the player sees of a country: its code and display names.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CountrySummary {
    pub iso3: String,
    pub name: String,
    pub name_ko: String,
}

impl From<&Country> for CountrySummary {
    fn from(c: &Country) -> Self {
        Self {
            iso3: c.iso3.clone(),
            name: c.name_en.clone(),
            name_ko: c.name_ko.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Question {
    FindOnGlobe {
        target: CountrySummary,
    },
    CapitalLocate {
        iso3: String,
        capital_name: String,
        capital: Coordinates,
        step: CapitalStep,
    },
    PopulationOrder {
        tier: Tier,
        // presented order, never pre-sorted
        items: Vec<CountrySummary>,
    },
}

impl Question {
    pub fn mode(&self) -> Mode {
        match self {
            Question::FindOnGlobe { .. } => Mode::FindOnGlobe,
            Question::CapitalLocate { .. } => Mode::CapitalLocate,
            Question::PopulationOrder { tier, .. } => Mode::PopulationOrder(*tier),
        }
    }

    /// Codes that become used once this question is answered correctly.
    pub fn country_codes(&self) -> Vec<String> {
        match self {
            Question::FindOnGlobe { target } => vec![target.iso3.clone()],
            Question::CapitalLocate { iso3, .. } => vec![iso3.clone()],
            Question::PopulationOrder { items, .. } => {
                items.iter().map(|i| i.iso3.clone()).collect()
            }
        }
    }
}

/// A player's submission, one shape per kind of interaction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum Answer {
    /// Clicked a country on the globe
    CountryClick { iso3: String },
    /// First step of a capital question
    CapitalCountry { iso3: String },
    /// Second step of a capital question
    CapitalClick { lat: f64, lng: f64 },
    PopulationOrder { ordered: Vec<String> },
}

/// Scoring and validation knobs shared by every run of an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Rules {
    pub max_attempts: u8,
    pub capital_threshold_km: f64,
    /// Fail closed when an ordered code has no dataset entry
    pub strict_population_order: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            capital_threshold_km: validators::DEFAULT_THRESHOLD_KM,
            strict_population_order: true,
        }
    }
}
