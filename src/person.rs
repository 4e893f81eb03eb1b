//! An occupant of the room.
//!
//! A person carries an infection state, a viral load, the exposure it has accumulated and the
//! concentration of virus on its hands. Event handlers write pending deltas during a step;
//! [`Person::integrate`] folds them in, records a history row and then advances the viral-load
//! state machine:
//!
//! * `Susceptible -> Exposed` in the immune check, with probability given by the dose response
//!   of the current exposure.
//! * While Exposed the viral load ramps log-linearly from the minimum to the maximum over the
//!   incubation period, then the person becomes Infected at the maximum.
//! * While Infected the viral load falls log-linearly towards a floor over the sickness period,
//!   then the person recovers.

use std::rc::Rc;

use log::{debug, trace};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::define_rng;
use crate::entity::{Entity, EntityType, HistoryRow};
use crate::error::SimError;
use crate::numeric::{implicit_decay, log_interpolate};
use crate::parameters::PersonSettings;
use crate::random::RngStore;
use crate::room::Room;
use crate::scheduling::{NumericalMethod, Scheduler};
use crate::submodels::Expulsion;
use crate::units::MILLILITER;

define_rng!(ContactRng);
define_rng!(ImmuneRng);

/// Viral load an infected person decays towards, per cubic metre.
pub const RECOVERY_VIRAL_LOAD: f64 = 1e-10 / MILLILITER;

/// Infection states in the order they are traversed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize,
)]
pub enum InfectionState {
    Susceptible,
    Exposed,
    #[strum(to_string = "Infected", serialize = "Infection")]
    Infected,
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum PersonAction {
    TouchFomite,
    TouchFace,
    TouchSurface,
    Cough,
    Sneeze,
    Talk,
    WashHands,
    ImmuneSystem,
}

impl PersonAction {
    #[must_use]
    pub fn expulsion(self) -> Option<Expulsion> {
        match self {
            PersonAction::Cough => Some(Expulsion::Cough),
            PersonAction::Sneeze => Some(Expulsion::Sneeze),
            PersonAction::Talk => Some(Expulsion::Talk),
            _ => None,
        }
    }
}

/// Deltas written by handlers during one step. Amounts are virus counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonChanges {
    pub surface_to_hand: f64,
    pub fomite_to_hand: f64,
    pub hand_interperson: f64,
    pub face_to_hand: f64,
    pub wash_hands: f64,
    pub expose_from_breath: f64,
    pub expose_from_hand: f64,
    pub expulsion_air_cough: f64,
    pub expulsion_air_sneeze: f64,
    pub expulsion_air_talk: f64,
    pub immune_clearance: f64,
    pub event_touch_fomite: u32,
    pub event_touch_face: u32,
    pub event_touch_surface: u32,
    pub event_cough: u32,
    pub event_sneeze: u32,
    pub event_talk: u32,
    pub event_wash_hands: u32,
    pub event_immune_system: u32,
}

impl PersonChanges {
    fn count(&mut self, action: PersonAction) {
        let counter = match action {
            PersonAction::TouchFomite => &mut self.event_touch_fomite,
            PersonAction::TouchFace => &mut self.event_touch_face,
            PersonAction::TouchSurface => &mut self.event_touch_surface,
            PersonAction::Cough => &mut self.event_cough,
            PersonAction::Sneeze => &mut self.event_sneeze,
            PersonAction::Talk => &mut self.event_talk,
            PersonAction::WashHands => &mut self.event_wash_hands,
            PersonAction::ImmuneSystem => &mut self.event_immune_system,
        };
        *counter += 1;
    }

    fn expulsion_air(&mut self, kind: Expulsion) -> &mut f64 {
        match kind {
            Expulsion::Cough => &mut self.expulsion_air_cough,
            Expulsion::Sneeze => &mut self.expulsion_air_sneeze,
            Expulsion::Talk => &mut self.expulsion_air_talk,
        }
    }
}

/// One history row of a person, taken after the hand update and before the state machine runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonSnapshot {
    pub name: String,
    pub time: f64,
    pub state: InfectionState,
    pub viral_load: f64,
    pub total_exposure: f64,
    pub current_exposure: f64,
    pub hand_concentration: f64,
    pub incubation_start: Option<f64>,
    pub symptoms_appear: Option<f64>,
    pub surface_to_hand: f64,
    pub fomite_to_hand: f64,
    pub hand_interperson: f64,
    pub face_to_hand: f64,
    pub wash_hands: f64,
    pub expose_from_breath: f64,
    pub expose_from_hand: f64,
    pub total_expose_from_breath: f64,
    pub total_expose_from_hand: f64,
    pub hand_with_decay: f64,
    pub expulsion_air_cough: f64,
    pub expulsion_air_sneeze: f64,
    pub expulsion_air_talk: f64,
    pub immune_clearance: f64,
    pub event_touch_fomite: u32,
    pub event_touch_face: u32,
    pub event_touch_surface: u32,
    pub event_cough: u32,
    pub event_sneeze: u32,
    pub event_talk: u32,
    pub event_wash_hands: u32,
    pub event_immune_system: u32,
}

impl HistoryRow for PersonSnapshot {
    const UNITS: &'static [(&'static str, &'static str)] = &[
        ("time", "s"),
        ("viral_load", "m^-3"),
        ("hand_concentration", "m^-2"),
        ("incubation_start", "s"),
        ("symptoms_appear", "s"),
        ("hand_with_decay", "m^-2"),
    ];
}

pub struct Person {
    entity: Entity<PersonSnapshot, PersonChanges>,
    settings: Rc<PersonSettings>,
    scheduler: Box<dyn Scheduler<PersonAction>>,
    state: InfectionState,
    room: Option<String>,
    viral_load: f64,
    hand_concentration: f64,
    current_exposure: f64,
    total_exposure: f64,
    incubation_start: Option<f64>,
    incubation_period: f64,
    total_expose_from_breath: f64,
    total_expose_from_hand: f64,
}

impl Person {
    /// Creates a person in `state` at time `start` and draws its incubation period. A person
    /// created past Susceptible starts its incubation at `start`.
    ///
    /// # Errors
    ///
    /// Fails if the incubation period cannot be drawn.
    pub fn new(
        id: &str,
        state: InfectionState,
        settings: Rc<PersonSettings>,
        method: NumericalMethod,
        start: f64,
        rng: &RngStore,
    ) -> Result<Self, SimError> {
        let incubation_period = settings.incubation.sample(rng)?;
        debug!("{id} starts {state} with an incubation period of {incubation_period:.0} s");
        Ok(Person {
            entity: Entity::new(id, EntityType::Person),
            scheduler: method.scheduler(settings.actions.clone()),
            settings,
            state,
            room: None,
            viral_load: 0.0,
            hand_concentration: 0.0,
            current_exposure: 0.0,
            total_exposure: 0.0,
            incubation_start: (state != InfectionState::Susceptible).then_some(start),
            incubation_period,
            total_expose_from_breath: 0.0,
            total_expose_from_hand: 0.0,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.entity.id()
    }

    #[must_use]
    pub fn state(&self) -> InfectionState {
        self.state
    }

    #[must_use]
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Per cubic metre.
    #[must_use]
    pub fn viral_load(&self) -> f64 {
        self.viral_load
    }

    /// Per square metre.
    #[must_use]
    pub fn hand_concentration(&self) -> f64 {
        self.hand_concentration
    }

    #[must_use]
    pub fn current_exposure(&self) -> f64 {
        self.current_exposure
    }

    #[must_use]
    pub fn total_exposure(&self) -> f64 {
        self.total_exposure
    }

    #[must_use]
    pub fn incubation_start(&self) -> Option<f64> {
        self.incubation_start
    }

    #[must_use]
    pub fn incubation_period(&self) -> f64 {
        self.incubation_period
    }

    /// Defined once the incubation has started.
    #[must_use]
    pub fn incubation_end(&self) -> Option<f64> {
        self.incubation_start
            .map(|start| start + self.incubation_period)
    }

    #[must_use]
    pub fn history(&self) -> &[PersonSnapshot] {
        self.entity.history()
    }

    #[must_use]
    pub fn entity(&self) -> &Entity<PersonSnapshot, PersonChanges> {
        &self.entity
    }

    #[must_use]
    pub fn hand_surface_area(&self) -> f64 {
        self.settings.hand_surface_area
    }

    #[must_use]
    pub fn hand_to_face(&self) -> f64 {
        self.settings.transfer.hand_to_face
    }

    pub(crate) fn enter_location(&mut self, room_id: &str) {
        self.room = Some(room_id.to_string());
    }

    pub(crate) fn leave_location(&mut self) {
        self.room = None;
    }

    /// Pre-generates events over `[start, start + horizon]` for the current state.
    ///
    /// # Errors
    ///
    /// Fails if a configured rate gives an invalid Poisson mean.
    pub fn prime(&mut self, start: f64, horizon: f64, rng: &RngStore) -> Result<(), SimError> {
        self.scheduler
            .prime(Some(self.state), start, horizon, rng)
    }

    #[must_use]
    pub fn next_event_time(&self) -> Option<f64> {
        self.scheduler.next_event_time()
    }

    /// Runs every action due at `now`.
    ///
    /// # Errors
    ///
    /// Propagates handler and scheduling errors.
    pub fn resolve_events(
        &mut self,
        room: &mut Room,
        now: f64,
        dt: f64,
        rng: &RngStore,
    ) -> Result<(), SimError> {
        let due = self
            .scheduler
            .resolve_due(now, dt, Some(self.state), rng)?;
        for action in due {
            self.handle(action, room, now, rng)?;
        }
        Ok(())
    }

    /// Runs the handler of `action` and counts the event.
    ///
    /// # Errors
    ///
    /// Fails if the handler's parameters were not configured.
    pub fn handle(
        &mut self,
        action: PersonAction,
        room: &mut Room,
        now: f64,
        rng: &RngStore,
    ) -> Result<(), SimError> {
        trace!("{} handles {action} at {now}", self.id());
        self.entity.pending_mut().count(action);
        match action {
            PersonAction::TouchFomite => self.touch_fomite(room),
            PersonAction::TouchFace => self.touch_face(),
            PersonAction::TouchSurface => self.touch_surface(room, rng),
            PersonAction::Cough => return self.expel(Expulsion::Cough, room, now),
            PersonAction::Sneeze => return self.expel(Expulsion::Sneeze, room, now),
            PersonAction::Talk => return self.expel(Expulsion::Talk, room, now),
            PersonAction::WashHands => return self.wash_hands(),
            PersonAction::ImmuneSystem => return self.immune_system(now, rng),
        }
        Ok(())
    }

    /// Exchanges virus between the hand and the shared fomite; the room receives the opposite
    /// of what the hand gains.
    pub fn touch_fomite(&mut self, room: &mut Room) {
        let area = self.settings.hand_surface_area;
        let transfer = &self.settings.transfer;
        let fomite_to_hand = transfer.surface_to_hand * area * room.fomite_concentration();
        let hand_to_fomite = transfer.hand_to_surface * area * self.hand_concentration;
        let gain = fomite_to_hand - hand_to_fomite;

        self.entity.pending_mut().fomite_to_hand += gain;
        room.update_fomite(-gain);
    }

    /// Exchanges virus between hand and face. Part of what reaches the face is taken up.
    pub fn touch_face(&mut self) {
        let area = self.settings.hand_surface_area;
        let transfer = &self.settings.transfer;
        let hand_to_face = transfer.hand_to_face * area * self.hand_concentration;
        let face_to_hand = transfer.hand_to_face * transfer.autoinoculation_volume * self.viral_load;
        let gain = face_to_hand - hand_to_face;

        let pending = self.entity.pending_mut();
        pending.face_to_hand += gain;
        pending.expose_from_hand -= gain * transfer.hand_to_mouth;
    }

    /// Touches at most one stain, each with probability proportional to its area.
    pub fn touch_surface(&mut self, room: &Room, rng: &RngStore) {
        let surface = room.effective_surface_area();
        let mut gain = 0.0;
        for stain in room.stains() {
            if rng.sample_uniform(ContactRng) < stain.area / surface {
                gain = stain.viral_load * self.settings.transfer.surface_to_hand
                    * self.settings.hand_surface_area
                    / stain.area;
                break;
            }
        }
        self.entity.pending_mut().surface_to_hand += gain;
    }

    /// Releases droplets: the evaporating part goes to the room air, the rest becomes a stain.
    ///
    /// # Errors
    ///
    /// Fails if the expulsion was not configured.
    pub fn expel(&mut self, kind: Expulsion, room: &mut Room, now: f64) -> Result<(), SimError> {
        let expulsion = self
            .settings
            .expulsion(kind)
            .ok_or_else(|| SimError::config(format!("{kind} is not configured")))?;
        let load = expulsion.viral_load_factor * self.viral_load;
        let to_air = load * expulsion.volumes.evaporating;
        let to_surface = load * expulsion.volumes.non_evaporating;

        if to_air > 0.0 {
            room.update_air(to_air);
        }
        if to_surface > 0.0 {
            room.add_stain(expulsion.stain_area, to_surface, now);
        }
        *self.entity.pending_mut().expulsion_air(kind) += to_air;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if no washing efficiency was configured.
    pub fn wash_hands(&mut self) -> Result<(), SimError> {
        let efficiency = self
            .settings
            .wash_efficiency
            .ok_or_else(|| SimError::config("washHands has no efficiency"))?;
        self.entity.pending_mut().wash_hands -=
            self.hand_concentration * efficiency * self.settings.hand_surface_area;
        self.hand_concentration *= 1.0 - efficiency;
        Ok(())
    }

    /// Checks whether the current exposure infects a susceptible person. On a negative draw the
    /// current exposure is cleared; the total exposure is kept.
    ///
    /// # Errors
    ///
    /// Fails if no dose response was configured.
    pub fn immune_system(&mut self, now: f64, rng: &RngStore) -> Result<(), SimError> {
        if self.state != InfectionState::Susceptible {
            return Ok(());
        }
        let dose_response = self
            .settings
            .dose_response
            .ok_or_else(|| SimError::config("immuneSystem has no dose response"))?;

        let probability = dose_response.probability(self.current_exposure);
        if rng.sample_uniform(ImmuneRng) < probability {
            debug!(
                "{} exposed at {now} after an exposure of {}",
                self.id(),
                self.current_exposure
            );
            self.incubation_start = Some(now);
            self.state = InfectionState::Exposed;
        } else {
            self.entity.pending_mut().immune_clearance -= self.current_exposure;
            self.current_exposure = 0.0;
        }
        Ok(())
    }

    /// Hand-to-hand transfer from the other occupant.
    pub fn receive_social(&mut self, amount: f64) {
        self.entity.pending_mut().hand_interperson += amount;
    }

    /// Folds in the deltas of the step at `now` with timestep `dt`, records a history row and
    /// advances the viral-load state machine.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NumericalInstability`] if the hand update is not finite.
    pub fn integrate(&mut self, room: &Room, now: f64, dt: f64) -> Result<(), SimError> {
        let settings = Rc::clone(&self.settings);

        let breath =
            room.air_concentration() * settings.breathing_rate * settings.breathing_efficiency * dt;
        let pending = self.entity.pending_mut();
        pending.expose_from_breath = breath;
        let exposure = pending.expose_from_hand + breath;
        let from_hand = pending.expose_from_hand;
        let hand_delta =
            pending.surface_to_hand + pending.fomite_to_hand + pending.hand_interperson + pending.face_to_hand;

        self.current_exposure = (self.current_exposure + exposure).max(0.0);
        self.total_exposure = (self.total_exposure + exposure).max(0.0);
        self.total_expose_from_breath += breath;
        self.total_expose_from_hand += from_hand;

        let hand_before = self.hand_concentration;
        self.hand_concentration = implicit_decay(
            self.hand_concentration,
            hand_delta,
            settings.hand_decay_rate,
            dt,
            settings.hand_surface_area,
        )?;

        let snapshot = self.snapshot(now, self.hand_concentration - hand_before);
        self.entity.commit(snapshot);

        self.update_viral_load(now);
        Ok(())
    }

    fn snapshot(&self, now: f64, hand_with_decay: f64) -> PersonSnapshot {
        let pending = self.entity.pending();
        PersonSnapshot {
            name: self.id().to_string(),
            time: now,
            state: self.state,
            viral_load: self.viral_load,
            total_exposure: self.total_exposure,
            current_exposure: self.current_exposure,
            hand_concentration: self.hand_concentration,
            incubation_start: self.incubation_start,
            symptoms_appear: self.incubation_end(),
            surface_to_hand: pending.surface_to_hand,
            fomite_to_hand: pending.fomite_to_hand,
            hand_interperson: pending.hand_interperson,
            face_to_hand: pending.face_to_hand,
            wash_hands: pending.wash_hands,
            expose_from_breath: pending.expose_from_breath,
            expose_from_hand: pending.expose_from_hand,
            total_expose_from_breath: self.total_expose_from_breath,
            total_expose_from_hand: self.total_expose_from_hand,
            hand_with_decay,
            expulsion_air_cough: pending.expulsion_air_cough,
            expulsion_air_sneeze: pending.expulsion_air_sneeze,
            expulsion_air_talk: pending.expulsion_air_talk,
            immune_clearance: pending.immune_clearance,
            event_touch_fomite: pending.event_touch_fomite,
            event_touch_face: pending.event_touch_face,
            event_touch_surface: pending.event_touch_surface,
            event_cough: pending.event_cough,
            event_sneeze: pending.event_sneeze,
            event_talk: pending.event_talk,
            event_wash_hands: pending.event_wash_hands,
            event_immune_system: pending.event_immune_system,
        }
    }

    fn update_viral_load(&mut self, now: f64) {
        let (Some(start), Some(end)) = (self.incubation_start, self.incubation_end()) else {
            return;
        };
        let settings = &self.settings;
        match self.state {
            InfectionState::Exposed => {
                if now > end {
                    debug!("{} infected at {now}", self.id());
                    self.state = InfectionState::Infected;
                    self.viral_load = settings.max_viral_load;
                } else {
                    self.viral_load = log_interpolate(
                        now - start,
                        (0.0, settings.min_viral_load),
                        (self.incubation_period, settings.max_viral_load),
                    );
                }
            }
            InfectionState::Infected => {
                let sick_for = now - end;
                if sick_for > settings.sickness_period {
                    debug!("{} recovered at {now}", self.id());
                    self.state = InfectionState::Recovered;
                } else {
                    self.viral_load = log_interpolate(
                        sick_for.max(0.0),
                        (0.0, settings.max_viral_load),
                        (settings.sickness_period, RECOVERY_VIRAL_LOAD),
                    );
                }
            }
            InfectionState::Susceptible | InfectionState::Recovered => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use crate::parameters::{ExpulsionSettings, TransferFactors};
    use crate::room::tests::test_room;
    use crate::scheduling::ActionTable;
    use crate::submodels::{DoseResponse, ExhalationVolumes, IncubationModel};
    use crate::units::{CENTIMETER, DAY, HOUR};

    pub(crate) fn test_settings() -> PersonSettings {
        PersonSettings {
            breathing_rate: 0.5 / HOUR,
            breathing_efficiency: 0.5,
            min_viral_load: 1.0 / MILLILITER,
            max_viral_load: 1e6 / MILLILITER,
            sickness_period: 7.0 * DAY,
            incubation: IncubationModel::Constant { period: 5.0 * DAY },
            hand_surface_area: 100.0 * CENTIMETER * CENTIMETER,
            hand_decay_rate: 0.0,
            transfer: TransferFactors {
                surface_to_hand: 0.2,
                hand_to_surface: 0.1,
                hand_to_face: 0.35,
                hand_to_mouth: 0.5,
                autoinoculation_volume: 1e-3 * MILLILITER,
            },
            expulsions: vec![(
                Expulsion::Cough,
                ExpulsionSettings {
                    viral_load_factor: 1.0,
                    stain_area: 5.0 * CENTIMETER * CENTIMETER,
                    volumes: ExhalationVolumes {
                        evaporating: 0.01 * MILLILITER,
                        non_evaporating: 0.5 * MILLILITER,
                    },
                },
            )],
            wash_efficiency: Some(0.8),
            dose_response: Some(DoseResponse::Exponential { k: 410.0 }),
            actions: ActionTable::new(),
        }
    }

    pub(crate) fn test_person(id: &str, state: InfectionState, settings: PersonSettings) -> Person {
        Person::new(
            id,
            state,
            Rc::new(settings),
            NumericalMethod::FixedGrid,
            0.0,
            &RngStore::new(0),
        )
        .unwrap()
    }

    #[test]
    fn action_names() {
        assert_eq!(PersonAction::WashHands.to_string(), "washHands");
        assert_eq!(
            "touchSurface".parse::<PersonAction>().unwrap(),
            PersonAction::TouchSurface
        );
        assert!("WashHands".parse::<PersonAction>().is_err());
        assert_eq!(
            "Infection".parse::<InfectionState>().unwrap(),
            InfectionState::Infected
        );
        assert!(InfectionState::Susceptible < InfectionState::Exposed);
        assert!(InfectionState::Infected < InfectionState::Recovered);
    }

    #[test]
    fn wash_hands_removes_a_fraction() {
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person.hand_concentration = 10.0;
        person.wash_hands().unwrap();
        assert_almost_eq!(person.hand_concentration(), 2.0, 1e-12);
        let removed = person.entity.pending().wash_hands;
        assert_almost_eq!(removed, -8.0 * person.hand_surface_area(), 1e-12);
    }

    #[test]
    fn exposed_viral_load_ramps_log_linearly() {
        let mut person = test_person("p", InfectionState::Exposed, test_settings());
        assert_eq!(person.incubation_end(), Some(5.0 * DAY));

        person.update_viral_load(0.0);
        assert_almost_eq!(person.viral_load() * MILLILITER, 1.0, 1e-9);

        person.update_viral_load(2.5 * DAY);
        assert_almost_eq!(person.viral_load() * MILLILITER, 1000.0, 1e-6);

        person.update_viral_load(5.0 * DAY);
        assert_eq!(person.state(), InfectionState::Exposed);
        assert_almost_eq!(person.viral_load() * MILLILITER, 1e6, 1e-3);
    }

    #[test]
    fn state_machine_moves_forward_only() {
        let mut person = test_person("p", InfectionState::Exposed, test_settings());
        let mut states = vec![person.state()];
        let mut now = 0.0;
        while now < 20.0 * DAY {
            person.update_viral_load(now);
            assert!(person.viral_load() >= 0.0);
            states.push(person.state());
            now += HOUR;
        }
        assert!(states.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(person.state(), InfectionState::Recovered);
    }

    #[test]
    fn infection_starts_at_maximum_and_decays() {
        let mut person = test_person("p", InfectionState::Exposed, test_settings());
        person.update_viral_load(5.0 * DAY + 1.0);
        assert_eq!(person.state(), InfectionState::Infected);
        assert_eq!(person.viral_load(), 1e6 / MILLILITER);

        person.update_viral_load(8.5 * DAY + 1.0);
        assert!(person.viral_load() < 1e6 / MILLILITER);
        assert!(person.viral_load() > RECOVERY_VIRAL_LOAD);
    }

    #[test]
    fn touch_fomite_conserves_mass() {
        let mut room = test_room();
        room.set_fomite_concentration(50.0);
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person.hand_concentration = 20.0;

        person.touch_fomite(&mut room);
        let gain = person.entity.pending().fomite_to_hand;
        assert!(gain > 0.0);
        assert_almost_eq!(room.pending_fomite(), -gain, 1e-15);
    }

    #[test]
    fn touch_face_moves_hand_virus_into_exposure() {
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person.hand_concentration = 100.0;
        person.touch_face();
        let pending = person.entity.pending();
        assert!(pending.face_to_hand < 0.0);
        assert_almost_eq!(pending.expose_from_hand, -pending.face_to_hand * 0.5, 1e-15);
    }

    #[test]
    fn immune_check_resets_only_current_exposure() {
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person.current_exposure = 0.0;
        person.total_exposure = 3.0;
        person.immune_system(10.0, &RngStore::new(1)).unwrap();
        // Zero exposure never infects.
        assert_eq!(person.state(), InfectionState::Susceptible);
        assert_eq!(person.total_exposure(), 3.0);

        person.current_exposure = 1e9;
        person.immune_system(20.0, &RngStore::new(1)).unwrap();
        assert_eq!(person.state(), InfectionState::Exposed);
        assert_eq!(person.incubation_start(), Some(20.0));
        assert_eq!(person.incubation_end(), Some(20.0 + 5.0 * DAY));
    }

    #[test]
    fn failed_immune_check_clears_current_exposure() {
        let mut settings = test_settings();
        settings.dose_response = Some(DoseResponse::Exponential { k: 1e300 });
        let mut person = test_person("p", InfectionState::Susceptible, settings);
        person.current_exposure = 2.0;
        person.total_exposure = 2.0;
        person.immune_system(0.0, &RngStore::new(4)).unwrap();
        assert_eq!(person.current_exposure(), 0.0);
        assert_eq!(person.total_exposure(), 2.0);
        assert_eq!(person.entity.pending().immune_clearance, -2.0);
    }

    #[test]
    fn cough_splits_between_air_and_stain() {
        let mut room = test_room();
        let mut person = test_person("p", InfectionState::Exposed, test_settings());
        person.viral_load = 1e6 / MILLILITER;
        person.expel(Expulsion::Cough, &mut room, 30.0).unwrap();

        assert_almost_eq!(room.pending_air(), 1e4, 1e-6);
        assert_eq!(room.stains().len(), 1);
        assert_almost_eq!(room.stains()[0].viral_load, 5e5, 1e-6);
        assert_eq!(room.stains()[0].created, 30.0);
        assert_almost_eq!(person.entity.pending().expulsion_air_cough, 1e4, 1e-6);

        assert!(person.expel(Expulsion::Talk, &mut room, 30.0).is_err());
    }

    #[test]
    fn stain_covering_the_whole_surface_is_always_touched() {
        let mut room = test_room();
        let surface = room.effective_surface_area();
        room.add_stain(surface, 800.0, 0.0);
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());

        person.touch_surface(&room, &RngStore::new(3));
        let expected = 800.0 * 0.2 * person.hand_surface_area() / surface;
        assert_almost_eq!(person.entity.pending().surface_to_hand, expected, 1e-15);
    }

    #[test]
    fn only_the_first_touched_stain_contributes() {
        let mut room = test_room();
        let surface = room.effective_surface_area();
        room.add_stain(surface, 800.0, 0.0);
        room.add_stain(surface, 4000.0, 10.0);
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());

        person.touch_surface(&room, &RngStore::new(5));
        let first = 800.0 * 0.2 * person.hand_surface_area() / surface;
        assert_almost_eq!(person.entity.pending().surface_to_hand, first, 1e-15);
    }

    #[test]
    fn touching_a_clean_room_gains_nothing() {
        let room = test_room();
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person.touch_surface(&room, &RngStore::new(0));
        assert_eq!(person.entity.pending().surface_to_hand, 0.0);
    }

    #[test]
    fn sneeze_and_talk_use_their_own_volumes() {
        let mut settings = test_settings();
        settings.expulsions.push((
            Expulsion::Sneeze,
            ExpulsionSettings {
                viral_load_factor: 2.0,
                stain_area: 10.0 * CENTIMETER * CENTIMETER,
                volumes: ExhalationVolumes {
                    evaporating: 0.04 * MILLILITER,
                    non_evaporating: 4.0 * MILLILITER,
                },
            },
        ));
        settings.expulsions.push((
            Expulsion::Talk,
            ExpulsionSettings {
                viral_load_factor: 1.0,
                stain_area: 1.0 * CENTIMETER * CENTIMETER,
                volumes: ExhalationVolumes {
                    evaporating: 3e-5 * MILLILITER,
                    non_evaporating: 0.0,
                },
            },
        ));
        let mut room = test_room();
        let mut person = test_person("p", InfectionState::Infected, settings);
        person.viral_load = 1e6 / MILLILITER;

        person.expel(Expulsion::Sneeze, &mut room, 60.0).unwrap();
        assert_almost_eq!(person.entity.pending().expulsion_air_sneeze, 8e4, 1e-6);
        assert_almost_eq!(room.pending_air(), 8e4, 1e-6);
        assert_eq!(room.stains().len(), 1);
        assert_almost_eq!(room.stains()[0].viral_load, 8e6, 1e-3);
        assert_almost_eq!(room.stains()[0].area, 1e-3, 1e-15);

        person.expel(Expulsion::Talk, &mut room, 90.0).unwrap();
        assert_almost_eq!(person.entity.pending().expulsion_air_talk, 30.0, 1e-9);
        assert_almost_eq!(room.pending_air(), 8e4 + 30.0, 1e-6);
        // Talking leaves no stain when nothing settles.
        assert_eq!(room.stains().len(), 1);
        assert_eq!(person.entity.pending().expulsion_air_cough, 0.0);
    }

    #[test]
    fn susceptible_cough_expels_nothing() {
        let mut room = test_room();
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person.expel(Expulsion::Cough, &mut room, 0.0).unwrap();
        assert_eq!(room.pending_air(), 0.0);
        assert!(room.stains().is_empty());
    }

    #[test]
    fn integrate_records_one_row_and_resets() {
        let room = test_room();
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person.receive_social(4.0);
        person.integrate(&room, 0.0, 60.0).unwrap();

        assert_eq!(person.history().len(), 1);
        let row = &person.history()[0];
        assert_eq!(row.hand_interperson, 4.0);
        assert_almost_eq!(row.hand_concentration, 4.0 / person.hand_surface_area(), 1e-9);
        assert_eq!(row.symptoms_appear, None);
        assert_eq!(person.entity.pending(), &PersonChanges::default());
    }

    #[test]
    fn hand_concentration_is_clamped() {
        let room = test_room();
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person.receive_social(-4.0);
        person.integrate(&room, 0.0, 60.0).unwrap();
        assert_eq!(person.hand_concentration(), 0.0);
    }

    #[test]
    fn handle_counts_events() {
        let mut room = test_room();
        let rng = RngStore::new(0);
        let mut person = test_person("p", InfectionState::Susceptible, test_settings());
        person
            .handle(PersonAction::TouchSurface, &mut room, 0.0, &rng)
            .unwrap();
        person
            .handle(PersonAction::TouchSurface, &mut room, 0.0, &rng)
            .unwrap();
        assert_eq!(person.entity.pending().event_touch_surface, 2);
    }
}
