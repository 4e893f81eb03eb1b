use std::path::PathBuf;

use roomsim::model::{Model, PRIMARY, SECONDARY};
use roomsim::parameters::Parameters;
use roomsim::person::InfectionState;

const MAX_STEPS: usize = 200_000;

fn parameters(method: &str) -> Parameters {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/single_room.json");
    let mut parameters = Parameters::from_json_file(&path).unwrap();
    parameters.simulation.numerical_method = method.to_string();
    parameters
}

fn finished_model(method: &str, seed: u64) -> Model {
    let mut model = Model::new(&parameters(method), seed).unwrap();
    model.run_until(MAX_STEPS).unwrap();
    model
}

#[test]
fn equal_seeds_give_identical_histories() {
    for method in ["EventStream", "FixedGrid"] {
        let first = finished_model(method, 11);
        let second = finished_model(method, 11);
        for (a, b) in first.people().iter().zip(second.people()) {
            assert_eq!(a.history(), b.history(), "{method}: {} differs", a.id());
        }
        assert_eq!(first.room().history(), second.room().history());
        assert_eq!(first.summary(), second.summary());
    }
}

#[test]
fn both_methods_terminate() {
    for method in ["EventStream", "FixedGrid", "EquiDistance", "Events"] {
        for seed in 0..3 {
            let mut model = Model::new(&parameters(method), seed).unwrap();
            let summary = model.run_until(MAX_STEPS).unwrap();
            assert!(model.is_finished());
            assert_eq!(summary.seed, seed);
            assert_eq!(summary.steps, model.steps());
        }
    }
}

#[test]
fn one_history_row_per_step() {
    let model = finished_model("EventStream", 5);
    let steps = model.steps();
    assert_eq!(model.primary().history().len(), steps);
    assert_eq!(model.secondary().history().len(), steps);
    assert_eq!(model.room().history().len(), steps);
    assert_eq!(model.primary().history()[0].name, PRIMARY);
    assert_eq!(model.secondary().history()[0].name, SECONDARY);
}

#[test]
fn time_advances_and_reservoirs_stay_non_negative() {
    for method in ["EventStream", "FixedGrid"] {
        let model = finished_model(method, 3);
        let room_rows = model.room().history();
        for pair in room_rows.windows(2) {
            assert!(pair[1].time > pair[0].time);
            assert!(pair[1].time - pair[0].time <= 600.0 + 1e-9);
        }
        for row in room_rows {
            assert!(row.air_concentration >= 0.0);
            assert!(row.fomite_concentration >= 0.0);
        }
        for person in model.people() {
            for row in person.history() {
                assert!(row.viral_load >= 0.0);
                assert!(row.hand_concentration >= 0.0);
                assert!(row.total_exposure >= 0.0);
            }
        }
    }
}

#[test]
fn infection_states_never_go_back() {
    for seed in 0..5 {
        let model = finished_model("EventStream", seed);
        for person in model.people() {
            let states: Vec<InfectionState> =
                person.history().iter().map(|row| row.state).collect();
            assert!(states.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}

#[test]
fn summary_is_consistent_with_final_states() {
    for seed in 0..5 {
        let model = finished_model("EventStream", seed);
        let summary = model.summary();
        assert_eq!(summary.primary_state, model.primary().state());
        assert_eq!(summary.secondary_state, model.secondary().state());
        assert_eq!(
            summary.secondary_sick,
            summary.secondary_state >= InfectionState::Exposed
        );
        assert_eq!(summary.final_time, model.clock().now());
        assert!(summary.primary_exposure >= 0.0);
        if !summary.secondary_sick {
            assert!(summary.infection_date_diff.is_none());
            assert!(summary.serial_interval.is_none());
        }
    }
}

#[test]
fn without_immune_checks_the_secondary_stays_susceptible() {
    let mut parameters = parameters("EventStream");
    parameters.person.actions.retain(|name, _| name != "immuneSystem");
    let mut model = Model::new(&parameters, 9).unwrap();
    let summary = model.run_until(MAX_STEPS).unwrap();
    assert_eq!(summary.secondary_state, InfectionState::Susceptible);
    assert!(!summary.secondary_sick);
    assert!(summary.secondary_exposure > 0.0);
}
