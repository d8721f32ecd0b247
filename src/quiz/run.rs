use log::debug;
use rand::Rng;

use crate::quiz::countries::{normalize_code, CountryDataset};
use crate::quiz::error::{InvalidState, QuizError, QuizResult};
use crate::quiz::generators::generate_question;
use crate::quiz::validators::{
    capital_distance, country_match, population_order_correct, population_order_strict,
};
use crate::quiz::{Answer, CapitalStep, Coordinates, Mode, Question, Rules, RunId, Tier, UsedCodes};

pub const FIND_ON_GLOBE_POINTS: u32 = 10;
pub const CAPITAL_COUNTRY_POINTS: u32 = 5;
pub const CAPITAL_CLICK_POINTS: u32 = 10;

pub fn population_points(tier: Tier) -> u32 {
    match tier {
        Tier::One => 10,
        Tier::Two => 20,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunStatus {
    Active,
    Ended,
}

/// Result of applying one answer to a run.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Verdict {
    pub correct: bool,
    pub points: u32,
    /// Only set for capital clicks
    pub distance_km: Option<f64>,
}

/// One player's quiz session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Run {
    pub id: RunId,
    pub mode: Mode,
    pub score: u32,
    pub attempts_left: u8,
    pub question: Question,
    pub used: UsedCodes,
    pub status: RunStatus,
}

/// What to do with the run once the answer has been judged.
enum Effect {
    Advance { points: u32 },
    PickedCountry,
    Miss { back_to_pick: bool },
}

impl Run {
    pub fn start<R: Rng + ?Sized>(
        mode: Mode,
        rules: &Rules,
        dataset: &CountryDataset,
        rng: &mut R,
    ) -> QuizResult<Self> {
        let used = UsedCodes::new();
        let question = generate_question(mode, dataset, &used, rng).ok_or_else(|| {
            QuizError::PoolExhausted {
                mode: mode.to_string(),
            }
        })?;

        Ok(Self {
            id: RunId::new(),
            mode,
            score: 0,
            attempts_left: rules.max_attempts,
            question,
            used,
            status: RunStatus::Active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active
    }

    /// Judges `answer` against the current question and applies the outcome.
    /// On error the run is left exactly as it was.
    pub fn submit<R: Rng + ?Sized>(
        &mut self,
        answer: &Answer,
        rules: &Rules,
        dataset: &CountryDataset,
        rng: &mut R,
    ) -> QuizResult<Verdict> {
        if !self.is_active() {
            return Err(self.invalid(InvalidState::RunEnded));
        }

        let (correct, distance_km) = self.judge(answer, rules, dataset)?;

        let effect = match (&self.question, correct) {
            (Question::FindOnGlobe { .. }, true) => Effect::Advance {
                points: FIND_ON_GLOBE_POINTS,
            },
            (
                Question::CapitalLocate {
                    step: CapitalStep::PickCountry,
                    ..
                },
                true,
            ) => Effect::PickedCountry,
            (
                Question::CapitalLocate {
                    step: CapitalStep::ClickCapital,
                    ..
                },
                true,
            ) => Effect::Advance {
                points: CAPITAL_CLICK_POINTS,
            },
            (Question::PopulationOrder { tier, .. }, true) => Effect::Advance {
                points: population_points(*tier),
            },
            (Question::CapitalLocate { .. }, false) => Effect::Miss { back_to_pick: true },
            (_, false) => Effect::Miss {
                back_to_pick: false,
            },
        };

        let points = match effect {
            Effect::Advance { points } => {
                self.score += points;
                self.used.extend(self.question.country_codes());
                match generate_question(self.mode, dataset, &self.used, rng) {
                    Some(next) => self.question = next,
                    None => {
                        debug!("run {}: no countries left, ending", self.id);
                        self.status = RunStatus::Ended;
                    }
                }
                points
            }
            Effect::PickedCountry => {
                self.score += CAPITAL_COUNTRY_POINTS;
                self.set_step(CapitalStep::ClickCapital);
                CAPITAL_COUNTRY_POINTS
            }
            Effect::Miss { back_to_pick } => {
                self.attempts_left = self.attempts_left.saturating_sub(1);
                if self.attempts_left == 0 {
                    self.status = RunStatus::Ended;
                } else if back_to_pick {
                    // Retry the same capital from the first step
                    self.set_step(CapitalStep::PickCountry);
                }
                0
            }
        };

        debug!(
            "run {}: correct={} score={} attempts_left={} status={:?}",
            self.id, correct, self.score, self.attempts_left, self.status
        );

        Ok(Verdict {
            correct,
            points,
            distance_km,
        })
    }

    /// Pure check of the answer; never mutates the run.
    fn judge(
        &self,
        answer: &Answer,
        rules: &Rules,
        dataset: &CountryDataset,
    ) -> QuizResult<(bool, Option<f64>)> {
        match (&self.question, answer) {
            (Question::FindOnGlobe { target }, Answer::CountryClick { iso3 }) => {
                let clicked = require_code(iso3)?;
                Ok((country_match(&target.iso3, &clicked), None))
            }
            (Question::CapitalLocate { iso3: target, step, .. }, Answer::CapitalCountry { iso3 }) => {
                if *step != CapitalStep::PickCountry {
                    return Err(self.invalid(InvalidState::OutOfSequence));
                }
                let picked = require_code(iso3)?;
                Ok((country_match(target, &picked), None))
            }
            (Question::CapitalLocate { capital, step, .. }, Answer::CapitalClick { lat, lng }) => {
                if *step != CapitalStep::ClickCapital {
                    return Err(self.invalid(InvalidState::OutOfSequence));
                }
                let click = Coordinates::new(*lat, *lng);
                if !click.is_valid() {
                    return Err(QuizError::validation(format!(
                        "coordinates ({}, {}) are out of range",
                        lat, lng
                    )));
                }
                let result = capital_distance(
                    click.lat,
                    click.lng,
                    capital.lat,
                    capital.lng,
                    rules.capital_threshold_km,
                );
                Ok((result.correct, Some(result.distance_km)))
            }
            (Question::PopulationOrder { items, .. }, Answer::PopulationOrder { ordered }) => {
                let ordered = ordered
                    .iter()
                    .map(|c| require_code(c))
                    .collect::<QuizResult<Vec<String>>>()?;

                let mut submitted = ordered.clone();
                submitted.sort();
                let mut presented: Vec<String> = items.iter().map(|i| i.iso3.clone()).collect();
                presented.sort();
                if submitted != presented {
                    return Err(QuizError::validation(
                        "the order must list each presented country exactly once",
                    ));
                }

                let correct = if rules.strict_population_order {
                    population_order_strict(dataset, &ordered)?
                } else {
                    population_order_correct(dataset, &ordered)
                };
                Ok((correct, None))
            }
            (question, answer) => Err(QuizError::validation(format!(
                "a {:?} answer does not fit a {} question",
                answer_kind(answer),
                question.mode()
            ))),
        }
    }

    fn set_step(&mut self, next: CapitalStep) {
        if let Question::CapitalLocate { step, .. } = &mut self.question {
            *step = next;
        }
    }

    fn invalid(&self, reason: InvalidState) -> QuizError {
        QuizError::InvalidState {
            run_id: self.id,
            reason,
        }
    }
}

fn require_code(code: &str) -> QuizResult<String> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(QuizError::validation("country code is empty"));
    }
    Ok(code)
}

fn answer_kind(answer: &Answer) -> &'static str {
    match answer {
        Answer::CountryClick { .. } => "country click",
        Answer::CapitalCountry { .. } => "capital country",
        Answer::CapitalClick { .. } => "capital click",
        Answer::PopulationOrder { .. } => "population order",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::countries::tests::{country, small_dataset};
    use crate::quiz::CountrySummary;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn target_of(run: &Run) -> String {
        run.question.country_codes().remove(0)
    }

    fn wrong_code(run: &Run) -> String {
        let target = target_of(run);
        let wrong = if target == "AAA" { "BBB" } else { "AAA" };
        wrong.to_string()
    }

    #[test]
    fn start_sets_up_a_fresh_run() {
        let dataset = small_dataset();
        for mode in Mode::ALL {
            let run = Run::start(mode, &Rules::default(), &dataset, &mut rng()).unwrap();
            assert_eq!(run.score, 0);
            assert_eq!(run.attempts_left, 3);
            assert_eq!(run.status, RunStatus::Active);
            assert!(run.used.is_empty());
            assert_eq!(run.question.mode(), mode);
        }
    }

    #[test]
    fn start_fails_when_dataset_is_too_small() {
        let dataset = CountryDataset::new(vec![country("AAA", 1), country("BBB", 2)]).unwrap();
        let err = Run::start(
            Mode::PopulationOrder(Tier::One),
            &Rules::default(),
            &dataset,
            &mut rng(),
        )
        .unwrap_err();
        assert!(matches!(err, QuizError::PoolExhausted { .. }));
    }

    #[test]
    fn correct_click_scores_and_moves_on() {
        let dataset = small_dataset();
        let mut rng = rng();
        let mut run = Run::start(Mode::FindOnGlobe, &Rules::default(), &dataset, &mut rng).unwrap();
        let target = target_of(&run);

        let verdict = run
            .submit(
                &Answer::CountryClick {
                    iso3: target.to_lowercase(),
                },
                &Rules::default(),
                &dataset,
                &mut rng,
            )
            .unwrap();

        assert!(verdict.correct);
        assert_eq!(verdict.points, 10);
        assert_eq!(run.score, 10);
        assert!(run.used.contains(&target));
        assert_ne!(target_of(&run), target);
    }

    #[test]
    fn three_misses_end_the_run_and_a_fourth_is_rejected() {
        let dataset = small_dataset();
        let mut rng = rng();
        let rules = Rules::default();
        let mut run = Run::start(Mode::FindOnGlobe, &rules, &dataset, &mut rng).unwrap();
        let question = run.question.clone();
        let wrong = Answer::CountryClick {
            iso3: wrong_code(&run),
        };

        for left in [2, 1, 0] {
            let verdict = run.submit(&wrong, &rules, &dataset, &mut rng).unwrap();
            assert!(!verdict.correct);
            assert_eq!(run.attempts_left, left);
            assert_eq!(run.question, question);
        }
        assert_eq!(run.status, RunStatus::Ended);

        let frozen = run.clone();
        let err = run.submit(&wrong, &rules, &dataset, &mut rng).unwrap_err();
        assert!(err.is_terminal_state());
        assert_eq!(run, frozen);
    }

    #[test]
    fn capital_question_walks_both_steps() {
        let dataset = small_dataset();
        let mut rng = rng();
        let rules = Rules::default();
        let mut run = Run::start(Mode::CapitalLocate, &rules, &dataset, &mut rng).unwrap();
        let target = target_of(&run);

        let picked = run
            .submit(
                &Answer::CapitalCountry {
                    iso3: target.clone(),
                },
                &rules,
                &dataset,
                &mut rng,
            )
            .unwrap();
        assert!(picked.correct);
        assert_eq!(run.score, 5);
        assert!(matches!(
            run.question,
            Question::CapitalLocate {
                step: CapitalStep::ClickCapital,
                ..
            }
        ));

        // Test capitals all sit at (10, 20)
        let clicked = run
            .submit(
                &Answer::CapitalClick {
                    lat: 10.1,
                    lng: 20.1,
                },
                &rules,
                &dataset,
                &mut rng,
            )
            .unwrap();
        assert!(clicked.correct);
        assert!(clicked.distance_km.unwrap() < 50.0);
        assert_eq!(run.score, 15);
        assert!(run.used.contains(&target));
        assert!(matches!(
            run.question,
            Question::CapitalLocate {
                step: CapitalStep::PickCountry,
                ..
            }
        ));
        assert_ne!(target_of(&run), target);
    }

    #[test]
    fn missed_capital_click_goes_back_to_picking_the_same_country() {
        let dataset = small_dataset();
        let mut rng = rng();
        let rules = Rules::default();
        let mut run = Run::start(Mode::CapitalLocate, &rules, &dataset, &mut rng).unwrap();
        let target = target_of(&run);

        run.submit(
            &Answer::CapitalCountry {
                iso3: target.clone(),
            },
            &rules,
            &dataset,
            &mut rng,
        )
        .unwrap();
        let verdict = run
            .submit(
                &Answer::CapitalClick {
                    lat: -40.0,
                    lng: 100.0,
                },
                &rules,
                &dataset,
                &mut rng,
            )
            .unwrap();

        assert!(!verdict.correct);
        assert!(verdict.distance_km.unwrap() > 50.0);
        assert_eq!(run.attempts_left, 2);
        assert_eq!(run.score, 5);
        assert_eq!(target_of(&run), target);
        assert!(matches!(
            run.question,
            Question::CapitalLocate {
                step: CapitalStep::PickCountry,
                ..
            }
        ));
    }

    #[test]
    fn steps_must_come_in_order() {
        let dataset = small_dataset();
        let mut rng = rng();
        let rules = Rules::default();
        let mut run = Run::start(Mode::CapitalLocate, &rules, &dataset, &mut rng).unwrap();
        let before = run.clone();

        let err = run
            .submit(
                &Answer::CapitalClick {
                    lat: 10.0,
                    lng: 20.0,
                },
                &rules,
                &dataset,
                &mut rng,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            QuizError::InvalidState {
                reason: InvalidState::OutOfSequence,
                ..
            }
        ));
        assert_eq!(run, before);

        let target = target_of(&run);
        run.submit(
            &Answer::CapitalCountry {
                iso3: target.clone(),
            },
            &rules,
            &dataset,
            &mut rng,
        )
        .unwrap();
        let err = run
            .submit(
                &Answer::CapitalCountry { iso3: target },
                &rules,
                &dataset,
                &mut rng,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            QuizError::InvalidState {
                reason: InvalidState::OutOfSequence,
                ..
            }
        ));
    }

    #[test]
    fn malformed_answers_leave_the_run_untouched() {
        let dataset = small_dataset();
        let mut rng = rng();
        let rules = Rules::default();
        let mut run = Run::start(Mode::FindOnGlobe, &rules, &dataset, &mut rng).unwrap();
        let before = run.clone();

        for answer in [
            Answer::CountryClick {
                iso3: "  ".to_string(),
            },
            Answer::PopulationOrder { ordered: vec![] },
            Answer::CapitalClick { lat: 0.0, lng: 0.0 },
        ] {
            let err = run.submit(&answer, &rules, &dataset, &mut rng).unwrap_err();
            assert!(matches!(err, QuizError::Validation(_)), "{:?}", err);
        }
        assert_eq!(run, before);
    }

    fn population_run(dataset: &CountryDataset, rules: &Rules) -> Run {
        let mut run = Run::start(
            Mode::PopulationOrder(Tier::One),
            rules,
            dataset,
            &mut rng(),
        )
        .unwrap();
        run.question = Question::PopulationOrder {
            tier: Tier::One,
            items: ["AAA", "BBB", "CCC"]
                .iter()
                .map(|c| CountrySummary::from(dataset.by_iso3(c).unwrap()))
                .collect(),
        };
        run
    }

    fn order(codes: &[&str]) -> Answer {
        Answer::PopulationOrder {
            ordered: codes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn population_order_scores_descending_answers() {
        let dataset = small_dataset();
        let rules = Rules::default();
        let mut rng = rng();

        // AAA=10, BBB=30, CCC=20
        let mut run = population_run(&dataset, &rules);
        let verdict = run.submit(&order(&["BBB", "CCC", "AAA"]), &rules, &dataset, &mut rng).unwrap();
        assert!(verdict.correct);
        assert_eq!(run.score, 10);
        for code in ["AAA", "BBB", "CCC"] {
            assert!(run.used.contains(code));
        }
        // Only DDD, EEE and FFF remain
        let mut next = run.question.country_codes();
        next.sort();
        assert_eq!(next, vec!["DDD", "EEE", "FFF"]);

        let mut run = population_run(&dataset, &rules);
        let verdict = run.submit(&order(&["AAA", "BBB", "CCC"]), &rules, &dataset, &mut rng).unwrap();
        assert!(!verdict.correct);
        assert_eq!(verdict.points, 0);
        assert_eq!(run.score, 0);
        assert_eq!(run.attempts_left, 2);
    }

    #[test]
    fn population_order_must_be_a_permutation_of_the_items() {
        let dataset = small_dataset();
        let rules = Rules::default();
        let mut run = population_run(&dataset, &rules);

        for bad in [
            order(&["BBB", "CCC"]),
            order(&["BBB", "CCC", "DDD"]),
            order(&["BBB", "BBB", "AAA"]),
        ] {
            let err = run.submit(&bad, &rules, &dataset, &mut rng()).unwrap_err();
            assert!(matches!(err, QuizError::Validation(_)));
        }
        assert_eq!(run.attempts_left, 3);
    }

    #[test]
    fn tier_two_is_worth_twenty() {
        let dataset = small_dataset();
        let rules = Rules::default();
        let mut rng = rng();
        let mut run = Run::start(Mode::PopulationOrder(Tier::Two), &rules, &dataset, &mut rng).unwrap();
        let answer = dataset.sort_descending_by_population(&run.question.country_codes());

        let verdict = run
            .submit(
                &Answer::PopulationOrder { ordered: answer },
                &rules,
                &dataset,
                &mut rng,
            )
            .unwrap();
        assert_eq!(verdict.points, 20);
        // Only one country is left, so no tier-two question can follow
        assert_eq!(run.status, RunStatus::Ended);
        assert_eq!(run.score, 20);
    }

    #[test]
    fn running_out_of_countries_ends_the_run() {
        let dataset = CountryDataset::new(vec![country("AAA", 1)]).unwrap();
        let rules = Rules::default();
        let mut rng = rng();
        let mut run = Run::start(Mode::FindOnGlobe, &rules, &dataset, &mut rng).unwrap();

        run.submit(
            &Answer::CountryClick {
                iso3: "AAA".to_string(),
            },
            &rules,
            &dataset,
            &mut rng,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::Ended);
        assert_eq!(run.score, 10);
    }

    #[test]
    fn runs_round_trip_through_json() {
        let dataset = small_dataset();
        let run = Run::start(Mode::CapitalLocate, &Rules::default(), &dataset, &mut rng()).unwrap();
        let json = serde_json::to_string(&run).unwrap();
        let back: Run = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }
}
