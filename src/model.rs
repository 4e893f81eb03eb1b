//! The simulation controller: one room, a primary and a secondary occupant and the clock.
//!
//! A step resolves the due events of every entity (primary, secondary, room), integrates every
//! entity in the same order with the current effective timestep, and then advances the clock.
//! When the entities have pre-generated events the clock shortens its step to land exactly on
//! the soonest one.

use std::path::Path;
use std::rc::Rc;

use log::{debug, info};
use serde::Serialize;

use crate::entity::{Entity, EntityType};
use crate::error::SimError;
use crate::parameters::{Parameters, Settings, SimulationSettings};
use crate::person::{InfectionState, Person, PersonChanges, PersonSnapshot};
use crate::random::RngStore;
use crate::report::write_csv;
use crate::room::{Room, RoomChanges, RoomSnapshot};

pub const PRIMARY: &str = "primary";
pub const SECONDARY: &str = "secondary";
pub const ROOM: &str = "room";

/// Simulated time in seconds from the start of the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    now: f64,
    base_dt: f64,
    dt: f64,
}

impl Clock {
    #[must_use]
    pub fn new(base_dt: f64) -> Self {
        Clock {
            now: 0.0,
            base_dt,
            dt: base_dt,
        }
    }

    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// The timestep of the current step.
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    #[must_use]
    pub fn base_dt(&self) -> f64 {
        self.base_dt
    }

    /// Moves to the next step. If `next_event` is closer than the base timestep the clock lands
    /// exactly on it.
    pub fn advance(&mut self, next_event: Option<f64>) {
        match next_event {
            Some(time) if time > self.now && time - self.now < self.base_dt => {
                self.dt = time - self.now;
                self.now = time;
            }
            _ => {
                self.dt = self.base_dt;
                self.now += self.base_dt;
            }
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub primary_state: InfectionState,
    pub secondary_state: InfectionState,
    pub secondary_sick: bool,
    /// Secondary minus primary incubation end, in seconds.
    pub serial_interval: Option<f64>,
    /// Secondary incubation start minus primary incubation end, in seconds.
    pub infection_date_diff: Option<f64>,
    pub primary_exposure: f64,
    pub secondary_exposure: f64,
    pub steps: usize,
    pub final_time: f64,
}

pub struct Model {
    simulation: SimulationSettings,
    clock: Clock,
    rng: RngStore,
    people: Vec<Person>,
    room: Room,
    steps: usize,
}

impl Model {
    /// Resolves `parameters` and builds a run seeded with `seed`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn new(parameters: &Parameters, seed: u64) -> Result<Self, SimError> {
        Self::from_settings(parameters.resolve()?, seed)
    }

    /// Builds a run: the primary starts Exposed and the secondary Susceptible, both in the room.
    /// Event streams are generated over the primary's incubation and sickness periods.
    ///
    /// # Errors
    ///
    /// Fails if an incubation period or an event count cannot be drawn.
    pub fn from_settings(settings: Settings, seed: u64) -> Result<Self, SimError> {
        let Settings {
            simulation,
            person,
            room,
        } = settings;
        let method = simulation.numerical_method;
        let rng = RngStore::new(seed);
        let clock = Clock::new(simulation.dt);

        let person = Rc::new(person);
        let primary = Person::new(
            PRIMARY,
            InfectionState::Exposed,
            Rc::clone(&person),
            method,
            clock.now(),
            &rng,
        )?;
        let secondary = Person::new(
            SECONDARY,
            InfectionState::Susceptible,
            Rc::clone(&person),
            method,
            clock.now(),
            &rng,
        )?;
        let mut people = vec![primary, secondary];
        let mut room = Room::new(ROOM, Rc::new(room), method);
        for (index, occupant) in people.iter_mut().enumerate() {
            room.enter_room(occupant, index);
        }

        let horizon = people[0].incubation_end().unwrap_or(clock.now()) + person.sickness_period
            - clock.now();
        for occupant in &mut people {
            occupant.prime(clock.now(), horizon, &rng)?;
        }
        room.prime(clock.now(), horizon, &rng)?;

        info!(
            "starting run with seed {seed}, {method} scheduling and a {} s step",
            simulation.dt
        );
        Ok(Model {
            simulation,
            clock,
            rng,
            people,
            room,
            steps: 0,
        })
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[must_use]
    pub fn settings(&self) -> &SimulationSettings {
        &self.simulation
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.rng.base_seed()
    }

    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    #[must_use]
    pub fn primary(&self) -> &Person {
        &self.people[0]
    }

    #[must_use]
    pub fn secondary(&self) -> &Person {
        &self.people[1]
    }

    #[must_use]
    pub fn people(&self) -> &[Person] {
        &self.people
    }

    #[must_use]
    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Advances the run by one step.
    ///
    /// # Errors
    ///
    /// Propagates handler and integration errors.
    pub fn step(&mut self) -> Result<(), SimError> {
        let now = self.clock.now();
        let dt = self.clock.dt();

        for person in &mut self.people {
            person.resolve_events(&mut self.room, now, dt, &self.rng)?;
        }
        self.room
            .resolve_events(&mut self.people, now, dt, &self.rng)?;

        for person in &mut self.people {
            person.integrate(&self.room, now, dt)?;
        }
        self.room.integrate(now, dt)?;

        let next_event = self
            .people
            .iter()
            .filter_map(Person::next_event_time)
            .chain(self.room.next_event_time())
            .min_by(f64::total_cmp);
        self.clock.advance(next_event);
        self.steps += 1;
        Ok(())
    }

    /// Whether the run has reached a terminal condition: the secondary got exposed, the primary
    /// is past its incubation with an undetectable viral load, or the primary reached the
    /// configured final state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        let primary = self.primary();
        if self.secondary().state() >= InfectionState::Exposed {
            return true;
        }
        if let Some(end) = primary.incubation_end() {
            if self.clock.now() > end && primary.viral_load() < self.simulation.detection_floor {
                return true;
            }
        }
        if self.simulation.terminate_primary_infected {
            primary.state() >= InfectionState::Infected
        } else {
            primary.state() == InfectionState::Recovered
        }
    }

    /// Steps until a terminal condition holds. Configurations that never terminate loop
    /// forever; use [`Model::run_until`] to bound the run.
    ///
    /// # Errors
    ///
    /// Propagates step errors.
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        loop {
            self.step()?;
            if self.is_finished() {
                return Ok(self.finish());
            }
        }
    }

    /// Like [`Model::run`], but gives up after `max_steps` steps.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StepLimitReached`] if no terminal condition holds after `max_steps`.
    pub fn run_until(&mut self, max_steps: usize) -> Result<RunSummary, SimError> {
        for _ in 0..max_steps {
            self.step()?;
            if self.is_finished() {
                return Ok(self.finish());
            }
        }
        Err(SimError::StepLimitReached(max_steps))
    }

    fn finish(&self) -> RunSummary {
        let summary = self.summary();
        info!(
            "run with seed {} finished after {} steps at {} s: primary {}, secondary {}",
            summary.seed,
            summary.steps,
            summary.final_time,
            summary.primary_state,
            summary.secondary_state
        );
        summary
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let primary = self.primary();
        let secondary = self.secondary();
        let primary_end = primary.incubation_end();
        RunSummary {
            seed: self.seed(),
            primary_state: primary.state(),
            secondary_state: secondary.state(),
            secondary_sick: secondary.state() >= InfectionState::Exposed,
            serial_interval: secondary
                .incubation_end()
                .zip(primary_end)
                .map(|(secondary_end, primary_end)| secondary_end - primary_end),
            infection_date_diff: secondary
                .incubation_start()
                .zip(primary_end)
                .map(|(secondary_start, primary_end)| secondary_start - primary_end),
            primary_exposure: primary.total_exposure(),
            secondary_exposure: secondary.total_exposure(),
            steps: self.steps,
            final_time: self.clock.now(),
        }
    }

    /// Writes `agents.csv` (both people) and `room.csv` into `directory`.
    ///
    /// # Errors
    ///
    /// Fails if a file cannot be written.
    pub fn write_histories(&self, directory: &Path) -> Result<(), SimError> {
        debug!("writing histories to {}", directory.display());
        write_csv(
            self.people.iter().flat_map(Person::history),
            &directory.join("agents.csv"),
        )?;
        self.room.entity().write_history(&directory.join("room.csv"))
    }

    /// The SI unit of every physical history column, per entity type.
    #[must_use]
    pub fn history_units() -> Vec<UnitRow> {
        let people = Entity::<PersonSnapshot, PersonChanges>::units()
            .iter()
            .map(|(column, unit)| UnitRow {
                entity: EntityType::Person,
                column,
                unit,
            });
        let rooms = Entity::<RoomSnapshot, RoomChanges>::units()
            .iter()
            .map(|(column, unit)| UnitRow {
                entity: EntityType::Room,
                column,
                unit,
            });
        people.chain(rooms).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRow {
    pub entity: EntityType,
    pub column: &'static str,
    pub unit: &'static str,
}
