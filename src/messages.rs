use globe_quiz::quiz::ai_helper::Recommendation;
use globe_quiz::quiz::countries::CountryDataset;
use globe_quiz::quiz::{
    Answer, CapitalStep, CountrySummary, Mode, Question, Rules, Run, RunStatus, SubmitOutcome,
};
use teloxide::types::{KeyboardButton, KeyboardMarkup};

/// Why a game is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Stopped,
    OutOfAttempts,
    RanOutOfCountries,
}

impl Ending {
    /// How a run that the engine closed came to an end. A run that is
    /// still active can only be over because the player left.
    pub fn after(run: &Run) -> Self {
        match run.status {
            RunStatus::Active => Ending::Stopped,
            RunStatus::Ended if run.attempts_left == 0 => Ending::OutOfAttempts,
            RunStatus::Ended => Ending::RanOutOfCountries,
        }
    }
}

/// What a chat message can carry as an answer.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Text(&'a str),
    Location { lat: f64, lng: f64 },
}

pub fn mode_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(
        Mode::ALL
            .iter()
            .map(|mode| vec![KeyboardButton::new(mode.title())])
            .collect::<Vec<_>>(),
    )
}

pub fn question_text(question: &Question, rules: &Rules) -> String {
    match question {
        Question::FindOnGlobe { target } => format!(
            "🌍 Find <b>{}</b> ({}) on the globe.\nDrop a location pin inside it (📎 → Location).",
            target.name, target.name_ko
        ),
        Question::CapitalLocate {
            capital_name,
            step: CapitalStep::PickCountry,
            ..
        } => format!(
            "🏛 Which country has <b>{}</b> as its capital?",
            capital_name
        ),
        Question::CapitalLocate {
            capital_name,
            step: CapitalStep::ClickCapital,
            ..
        } => format!(
            "📍 Now drop a location pin on <b>{}</b>. Anything within {} km counts.",
            capital_name, rules.capital_threshold_km
        ),
        Question::PopulationOrder { items, .. } => {
            let list = items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {} ({})", i + 1, item.name, item.name_ko))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "👥 Order these countries from most to least populous:\n{}\n\nReply with the numbers, e.g. <code>2 1 3</code>, or the names separated by commas.",
                list
            )
        }
    }
}

pub fn verdict_text(outcome: &SubmitOutcome) -> String {
    let mut text = if outcome.correct {
        format!("✅ Correct! +{}", outcome.points)
    } else {
        "❌ Not quite.".to_string()
    };
    if let Some(distance) = outcome.distance_km {
        text.push_str(&format!(" Your pin was {:.1} km away.", distance));
    }
    text.push_str(&format!(
        "\nScore: {} · Attempts left: {}",
        outcome.run.score, outcome.run.attempts_left
    ));
    text
}

pub fn final_text(run: &Run, ending: Ending) -> String {
    let headline = match ending {
        Ending::Stopped => "🏁 Stopped.",
        Ending::OutOfAttempts => "🏁 Game over!",
        Ending::RanOutOfCountries => "🏁 You went through every country I know!",
    };
    format!("{} Final score: <b>{}</b>.", headline, run.score)
}

pub fn recommendation_text(recommendation: &Recommendation) -> String {
    let picks = recommendation
        .top3
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{}. <b>{}</b> ({}): {}", i + 1, d.country, d.country_ko, d.reason))
        .collect::<Vec<_>>()
        .join("\n");
    format!("✈️ Where to next?\n{}\n\n{}", picks, recommendation.summary)
}

/// Turns a chat message into an answer for the current question.
/// `Err` carries a hint for the player; nothing is submitted in that case.
pub fn read_answer(
    question: &Question,
    input: Input,
    dataset: &CountryDataset,
) -> Result<Answer, String> {
    match question {
        // The prompt names the country, so only a pin shows the player found it
        Question::FindOnGlobe { .. } => match input {
            Input::Location { lat, lng } => {
                country_at(lat, lng, dataset).map(|iso3| Answer::CountryClick { iso3 })
            }
            Input::Text(_) => {
                Err("Drop a location pin inside the country (📎 → Location).".to_string())
            }
        },
        Question::CapitalLocate {
            step: CapitalStep::PickCountry,
            ..
        } => country_from(input, dataset).map(|iso3| Answer::CapitalCountry { iso3 }),
        Question::CapitalLocate {
            step: CapitalStep::ClickCapital,
            ..
        } => match input {
            Input::Location { lat, lng } => Ok(Answer::CapitalClick { lat, lng }),
            Input::Text(_) => {
                Err("Drop a location pin on the capital (📎 → Location).".to_string())
            }
        },
        Question::PopulationOrder { items, .. } => match input {
            Input::Text(text) => {
                parse_order(text, items, dataset).map(|ordered| Answer::PopulationOrder { ordered })
            }
            Input::Location { .. } => {
                Err("Reply with the numbers in order, e.g. <code>2 1 3</code>.".to_string())
            }
        },
    }
}

// Typed text never resolves through a capital: the capital is what the prompt shows
fn country_from(input: Input, dataset: &CountryDataset) -> Result<String, String> {
    match input {
        Input::Text(text) => dataset
            .by_country_name(text)
            .map(|c| c.iso3.clone())
            .ok_or_else(|| format!("I don't know a country called \"{}\".", text.trim())),
        Input::Location { lat, lng } => country_at(lat, lng, dataset),
    }
}

fn country_at(lat: f64, lng: f64, dataset: &CountryDataset) -> Result<String, String> {
    dataset
        .locate(lat, lng)
        .map(|c| c.iso3.clone())
        .ok_or_else(|| "That spot isn't inside any country I know.".to_string())
}

/// Accepts `2 1 3`, `2,1,3` or `Brazil, Japan, Peru`.
fn parse_order(
    text: &str,
    items: &[CountrySummary],
    dataset: &CountryDataset,
) -> Result<Vec<String>, String> {
    let mut tokens: Vec<&str> = text
        .split(|c: char| c == ',' || c == '\n' || c == ';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let only_digits = |t: &str| t.split_whitespace().all(|p| p.chars().all(|c| c.is_ascii_digit()));
    if tokens.len() == 1 && only_digits(tokens[0]) {
        tokens = tokens[0].split_whitespace().collect();
    }

    if tokens.len() != items.len() {
        return Err(format!("Please list all {} countries.", items.len()));
    }

    tokens
        .into_iter()
        .map(|token| match token.parse::<usize>() {
            Ok(n) if (1..=items.len()).contains(&n) => Ok(items[n - 1].iso3.clone()),
            Ok(n) => Err(format!("There is no country number {}.", n)),
            Err(_) => dataset
                .by_country_name(token)
                .map(|c| c.iso3.clone())
                .ok_or_else(|| format!("I don't know a country called \"{}\".", token)),
        })
        .collect()
}
