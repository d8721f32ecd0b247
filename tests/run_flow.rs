//! End-to-end runs through the public engine API.

use std::collections::HashSet;
use std::sync::Arc;

use globe_quiz::quiz::countries::{BoundingBox, Country};
use globe_quiz::quiz::{
    CapitalStep, CountryDataset, InMemoryRunStore, Mode, Question, QuizEngine, QuizError, Rules,
    RunStatus, Tier,
};

fn bundled() -> Arc<CountryDataset> {
    Arc::new(
        CountryDataset::open(concat!(env!("CARGO_MANIFEST_DIR"), "/data/countries.json")).unwrap(),
    )
}

fn engine_over(dataset: Arc<CountryDataset>) -> QuizEngine {
    QuizEngine::with_seed(dataset, Arc::new(InMemoryRunStore::new()), Rules::default(), 2024)
}

fn country(iso3: &str, population: u64) -> Country {
    Country {
        iso2: iso3[..2].to_string(),
        iso3: iso3.to_string(),
        name_en: iso3.to_string(),
        name_ko: iso3.to_string(),
        capital_name: format!("{} capital", iso3),
        capital_lat: 0.0,
        capital_lng: 0.0,
        population,
        bbox: BoundingBox::from([-1.0, -1.0, 1.0, 1.0]),
    }
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn every_mode_starts_fresh() {
    let engine = engine_over(bundled());
    for mode in Mode::ALL {
        let run = engine.start_run(mode).unwrap();
        assert_eq!(run.score, 0);
        assert_eq!(run.attempts_left, 3);
        assert_eq!(run.status, RunStatus::Active);
        assert_eq!(run.question.mode(), mode);
    }
}

#[test]
fn three_wrong_answers_end_the_game() {
    let engine = engine_over(bundled());
    let run = engine.start_run(Mode::FindOnGlobe).unwrap();
    let target = run.question.country_codes().remove(0);
    let wrong = if target == "KOR" { "JPN" } else { "KOR" };

    for left in [2, 1, 0] {
        let outcome = engine.submit_country_click(run.id, wrong).unwrap();
        assert!(!outcome.correct);
        assert_eq!(outcome.run.attempts_left, left);
    }
    assert_eq!(engine.get_run(run.id).unwrap().status, RunStatus::Ended);

    let err = engine.submit_country_click(run.id, &target).unwrap_err();
    assert!(err.is_terminal_state());
    assert_eq!(engine.get_run(run.id).unwrap().score, 0);
}

#[test]
fn missed_capital_keeps_the_same_country() {
    let engine = engine_over(bundled());
    let run = engine.start_run(Mode::CapitalLocate).unwrap();
    let Question::CapitalLocate { iso3, capital, .. } = run.question.clone() else {
        panic!("expected a capital question");
    };

    let picked = engine.submit_capital_country(run.id, &iso3).unwrap();
    assert!(picked.correct);
    assert_eq!(picked.run.score, 5);

    // Antipode of the capital is as far off as it gets
    let lng = if capital.lng > 0.0 { capital.lng - 180.0 } else { capital.lng + 180.0 };
    let missed = engine.submit_capital_click(run.id, -capital.lat, lng).unwrap();
    assert!(!missed.correct);
    assert!(missed.distance_km.unwrap() > 19_000.0);
    assert_eq!(missed.run.attempts_left, 2);
    assert_eq!(missed.run.score, 5);
    match missed.run.question {
        Question::CapitalLocate {
            iso3: ref again,
            step,
            ..
        } => {
            assert_eq!(again, &iso3);
            assert_eq!(step, CapitalStep::PickCountry);
        }
        ref other => panic!("unexpected question {:?}", other),
    }

    // Second time round, a pin right on the capital scores the full 10
    engine.submit_capital_country(run.id, &iso3).unwrap();
    let hit = engine.submit_capital_click(run.id, capital.lat, capital.lng).unwrap();
    assert!(hit.correct);
    assert_eq!(hit.distance_km, Some(0.0));
    assert_eq!(hit.run.score, 20);
    assert!(hit.run.used.contains(&iso3));
}

#[test]
fn capital_click_before_picking_the_country_is_rejected() {
    let engine = engine_over(bundled());
    let run = engine.start_run(Mode::CapitalLocate).unwrap();

    let err = engine.submit_capital_click(run.id, 0.0, 0.0).unwrap_err();
    assert!(matches!(err, QuizError::InvalidState { .. }));
    assert!(!err.is_terminal_state());
    assert_eq!(engine.get_run(run.id).unwrap(), run);
}

#[test]
fn population_order_scenario() {
    // A=10, B=30, C=20: the only tier one question is these three
    let dataset = Arc::new(
        CountryDataset::new(vec![country("AAA", 10), country("BBB", 30), country("CCC", 20)])
            .unwrap(),
    );
    let engine = engine_over(dataset);

    let run = engine.start_run(Mode::PopulationOrder(Tier::One)).unwrap();
    let wrong = engine
        .submit_population_order(run.id, &codes(&["AAA", "BBB", "CCC"]))
        .unwrap();
    assert!(!wrong.correct);
    assert_eq!(wrong.points, 0);
    assert_eq!(wrong.run.score, 0);
    assert_eq!(wrong.run.attempts_left, 2);
    assert_eq!(wrong.run.question, run.question);

    let right = engine
        .submit_population_order(run.id, &codes(&["BBB", "CCC", "AAA"]))
        .unwrap();
    assert!(right.correct);
    assert_eq!(right.points, 10);
    assert_eq!(right.run.score, 10);
    // Nothing left to ask
    assert_eq!(right.run.status, RunStatus::Ended);
}

#[test]
fn tier_two_pays_double() {
    let engine = engine_over(bundled());
    let run = engine.start_run(Mode::PopulationOrder(Tier::Two)).unwrap();
    assert_eq!(run.question.country_codes().len(), 5);

    let answer = engine
        .dataset()
        .sort_descending_by_population(&run.question.country_codes());
    let outcome = engine.submit_population_order(run.id, &answer).unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.run.score, 20);
    assert_eq!(outcome.run.used.len(), 5);

    let next: HashSet<String> = outcome.run.question.country_codes().into_iter().collect();
    assert!(next.is_disjoint(&answer.into_iter().collect()));
}

#[test]
fn a_perfect_game_visits_every_country_once() {
    let dataset = bundled();
    let engine = engine_over(dataset.clone());
    let mut run = engine.start_run(Mode::FindOnGlobe).unwrap();
    let mut seen = HashSet::new();

    while run.status == RunStatus::Active {
        let target = run.question.country_codes().remove(0);
        assert!(seen.insert(target.clone()), "{} was asked twice", target);
        run = engine.submit_country_click(run.id, &target).unwrap().run;
    }

    assert_eq!(seen.len(), dataset.len());
    assert_eq!(run.score, 10 * dataset.len() as u32);
    assert_eq!(run.attempts_left, 3);
}
