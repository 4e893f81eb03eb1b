//! Scheduling strategies: how an entity decides which of its actions fire on a step.
//!
//! Every entity owns a boxed [`Scheduler`] built from its [`ActionTable`] by the run-wide
//! [`NumericalMethod`]:
//!
//! * [`EventStream`] pre-generates a Poisson number of equally spaced events per action over the
//!   whole horizon and hands them out as the clock reaches them. The model shortens its step so
//!   the clock lands on every event time.
//! * [`FixedGrid`] draws `Poisson(dt * frequency)` for every action on every step and fires the
//!   action once when the draw is positive.

use std::fmt::Display;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};

use crate::define_rng;
use crate::error::SimError;
use crate::person::InfectionState;
use crate::plan::Queue;
use crate::random::RngStore;

define_rng!(ScheduleRng);

/// Selects the scheduling strategy bound to every entity of a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumString, StrumDisplay, Serialize, Deserialize,
)]
pub enum NumericalMethod {
    #[strum(to_string = "EventStream", serialize = "EquiDistance")]
    EventStream,
    #[strum(to_string = "FixedGrid", serialize = "Events")]
    FixedGrid,
}

impl NumericalMethod {
    /// Builds the scheduler of one entity.
    #[must_use]
    pub fn scheduler<A>(self, table: ActionTable<A>) -> Box<dyn Scheduler<A>>
    where
        A: Copy + Display + 'static,
    {
        match self {
            NumericalMethod::EventStream => Box::new(EventStream::new(table)),
            NumericalMethod::FixedGrid => Box::new(FixedGrid::new(table)),
        }
    }
}

/// How often an action happens, in events per second.
#[derive(Debug, Clone, PartialEq)]
pub enum Frequency {
    Constant(f64),
    /// States missing from the table never fire the action.
    PerState(Vec<(InfectionState, f64)>),
}

impl Frequency {
    #[must_use]
    pub fn rate(&self, state: Option<InfectionState>) -> f64 {
        match self {
            Frequency::Constant(rate) => *rate,
            Frequency::PerState(table) => state
                .and_then(|state| {
                    table
                        .iter()
                        .find(|(key, _)| *key == state)
                        .map(|(_, rate)| *rate)
                })
                .unwrap_or(0.0),
        }
    }
}

/// The configured actions of an entity and their frequencies, in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTable<A> {
    entries: Vec<(A, Frequency)>,
}

impl<A: Copy> ActionTable<A> {
    #[must_use]
    pub fn new() -> Self {
        ActionTable {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, action: A, frequency: Frequency) {
        self.entries.push((action, frequency));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(A, Frequency)> {
        self.entries.iter()
    }

    /// The rate of every action for an entity in `state`.
    pub fn rates(&self, state: Option<InfectionState>) -> impl Iterator<Item = (A, f64)> + '_ {
        self.entries
            .iter()
            .map(move |(action, frequency)| (*action, frequency.rate(state)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A: Copy> Default for ActionTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Copy> FromIterator<(A, Frequency)> for ActionTable<A> {
    fn from_iter<I: IntoIterator<Item = (A, Frequency)>>(iter: I) -> Self {
        ActionTable {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Decides which actions of one entity fire on the current step.
pub trait Scheduler<A> {
    /// Prepares the scheduler for an entity in `state` over `[start, start + horizon]`.
    ///
    /// # Errors
    ///
    /// Fails if a rate produces an invalid Poisson mean.
    fn prime(
        &mut self,
        state: Option<InfectionState>,
        start: f64,
        horizon: f64,
        rng: &RngStore,
    ) -> Result<(), SimError>;

    /// Removes and returns the actions that fire at `now`, in firing order. `dt` is the
    /// effective step of the model.
    ///
    /// # Errors
    ///
    /// Fails if a rate produces an invalid Poisson mean.
    fn resolve_due(
        &mut self,
        now: f64,
        dt: f64,
        state: Option<InfectionState>,
        rng: &RngStore,
    ) -> Result<Vec<A>, SimError>;

    /// The time of the next pre-generated event, if the strategy has any.
    fn next_event_time(&self) -> Option<f64>;
}

/// Pre-generated event streams.
pub struct EventStream<A> {
    table: ActionTable<A>,
    queue: Queue<A>,
}

impl<A: Copy + Display> EventStream<A> {
    #[must_use]
    pub fn new(table: ActionTable<A>) -> Self {
        EventStream {
            table,
            queue: Queue::new(),
        }
    }

    /// Number of events still waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl<A: Copy + Display> Scheduler<A> for EventStream<A> {
    fn prime(
        &mut self,
        state: Option<InfectionState>,
        start: f64,
        horizon: f64,
        rng: &RngStore,
    ) -> Result<(), SimError> {
        for (action, rate) in self.table.rates(state) {
            let count = rng.sample_poisson(ScheduleRng, horizon * rate)?;
            #[allow(clippy::cast_precision_loss)]
            let spacing = horizon / (count + 1) as f64;
            for index in 1..=count {
                #[allow(clippy::cast_precision_loss)]
                let time = start + index as f64 * spacing;
                self.queue.add_plan(time, action);
            }
            debug!("scheduled {count} {action} events every {spacing:.1} s");
        }
        Ok(())
    }

    fn resolve_due(
        &mut self,
        now: f64,
        _dt: f64,
        _state: Option<InfectionState>,
        _rng: &RngStore,
    ) -> Result<Vec<A>, SimError> {
        let mut due = Vec::new();
        while let Some(plan) = self.queue.pop_due(now) {
            trace!("event {} due at {}", plan.data, plan.time);
            due.push(plan.data);
        }
        Ok(due)
    }

    fn next_event_time(&self) -> Option<f64> {
        self.queue.next_time()
    }
}

/// Per-step Poisson draws on the model's grid.
pub struct FixedGrid<A> {
    table: ActionTable<A>,
}

impl<A: Copy> FixedGrid<A> {
    #[must_use]
    pub fn new(table: ActionTable<A>) -> Self {
        FixedGrid { table }
    }
}

impl<A: Copy + Display> Scheduler<A> for FixedGrid<A> {
    fn prime(
        &mut self,
        _state: Option<InfectionState>,
        _start: f64,
        _horizon: f64,
        _rng: &RngStore,
    ) -> Result<(), SimError> {
        Ok(())
    }

    fn resolve_due(
        &mut self,
        _now: f64,
        dt: f64,
        state: Option<InfectionState>,
        rng: &RngStore,
    ) -> Result<Vec<A>, SimError> {
        let mut due = Vec::new();
        for (action, rate) in self.table.rates(state) {
            // Several occurrences within one step still fire the handler once.
            if rng.sample_poisson(ScheduleRng, dt * rate)? > 0 {
                trace!("event {action} fired");
                due.push(action);
            }
        }
        Ok(due)
    }

    fn next_event_time(&self) -> Option<f64> {
        None
    }
}
