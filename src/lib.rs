//! An agent-based model of virus transmission between two people sharing a room
//!
//! A run follows a _primary_ person who has just been exposed and a _secondary_ person who is
//! susceptible, both occupying one room. Each person progresses through the infection states
//! Susceptible, Exposed, Infected and Recovered; while sick they cough, sneeze and talk into
//! the room air and onto its surfaces. Both people breathe the air, touch a shared fomite,
//! their faces and other surfaces, and wash their hands. An immune-system check converts the
//! accumulated exposure into an infection probability through a dose-response model.
//!
//! The simulation advances in time steps. Within a step every entity first resolves the events
//! that came due and then integrates its continuous state (air and surface concentrations, hand
//! contamination, viral load) over the step with an implicit decay update. Event times come
//! from a [`scheduling::Scheduler`], chosen by the configured numerical method:
//! * `EventStream` draws all event times up front and shortens the step to land on each one.
//! * `FixedGrid` draws a Poisson count for every action at every step.
//!
//! A run stops when the secondary person is exposed, when the primary's infection is over, or
//! when the primary becomes infectious if the configuration asks for it. The [`model::Model`]
//! owns the clock, the random number streams and the entities; [`runner`] drives many seeded
//! runs from the command line and writes their histories as CSV files.
pub mod entity;
pub mod error;
pub mod hashing;
pub mod log;
pub mod model;
pub mod numeric;
pub mod parameters;
pub mod person;
pub mod plan;
pub mod random;
pub mod report;
pub mod room;
pub mod runner;
pub mod scheduling;
pub mod submodels;
pub mod units;

// Re-exported for use in the `define_rng!` macro.
pub use paste;
pub use rand;
