//! The shared room: air, the shared fomite and the stains left by expulsions.
//!
//! The room owns the occupancy relation; a person only keeps the id of the room it is in.
//! Persons write into the room through [`Room::update_air`], [`Room::update_fomite`] and
//! [`Room::add_stain`] while handling their events, and [`Room::integrate`] applies the
//! accumulated amounts with implicit decay once per step.

use std::rc::Rc;

use indexmap::IndexMap;
use log::trace;
use serde::Serialize;
use strum::{Display, EnumString};

use crate::entity::{Entity, EntityType, HistoryRow};
use crate::error::SimError;
use crate::numeric::implicit_decay;
use crate::parameters::RoomSettings;
use crate::person::Person;
use crate::random::RngStore;
use crate::scheduling::{NumericalMethod, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum RoomAction {
    CleanFomite,
    Social,
}

/// A patch of deposited droplets. Stains never merge and decay independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stain {
    /// Square metres.
    pub area: f64,
    /// Virus count.
    pub viral_load: f64,
    /// Seconds.
    pub created: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomChanges {
    pub air: f64,
    pub fomite: f64,
    pub clean_fomite: f64,
    pub event_clean_fomite: u32,
    pub event_social: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSnapshot {
    pub name: String,
    pub time: f64,
    pub air_concentration: f64,
    pub fomite_concentration: f64,
    pub change_air: f64,
    pub change_fomite: f64,
    pub clean_fomite: f64,
    pub air_with_decay: f64,
    pub fomite_with_decay: f64,
    pub stains: usize,
    pub stain_viral_load: f64,
    pub event_clean_fomite: u32,
    pub event_social: u32,
}

impl HistoryRow for RoomSnapshot {
    const UNITS: &'static [(&'static str, &'static str)] = &[
        ("time", "s"),
        ("air_concentration", "m^-3"),
        ("fomite_concentration", "m^-2"),
        ("air_with_decay", "m^-3"),
        ("fomite_with_decay", "m^-2"),
    ];
}

pub struct Room {
    entity: Entity<RoomSnapshot, RoomChanges>,
    settings: Rc<RoomSettings>,
    scheduler: Box<dyn Scheduler<RoomAction>>,
    air_concentration: f64,
    fomite_concentration: f64,
    stains: Vec<Stain>,
    /// Person id to the index of the person in the model.
    occupants: IndexMap<String, usize>,
}

impl Room {
    #[must_use]
    pub fn new(id: &str, settings: Rc<RoomSettings>, method: NumericalMethod) -> Self {
        Room {
            entity: Entity::new(id, EntityType::Room),
            scheduler: method.scheduler(settings.actions.clone()),
            settings,
            air_concentration: 0.0,
            fomite_concentration: 0.0,
            stains: Vec::new(),
            occupants: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.entity.id()
    }

    /// Per cubic metre.
    #[must_use]
    pub fn air_concentration(&self) -> f64 {
        self.air_concentration
    }

    /// Per square metre.
    #[must_use]
    pub fn fomite_concentration(&self) -> f64 {
        self.fomite_concentration
    }

    #[must_use]
    pub fn stains(&self) -> &[Stain] {
        &self.stains
    }

    #[must_use]
    pub fn volume(&self) -> f64 {
        self.settings.volume()
    }

    #[must_use]
    pub fn effective_surface_area(&self) -> f64 {
        self.settings.effective_surface_area()
    }

    #[must_use]
    pub fn history(&self) -> &[RoomSnapshot] {
        self.entity.history()
    }

    #[must_use]
    pub fn entity(&self) -> &Entity<RoomSnapshot, RoomChanges> {
        &self.entity
    }

    /// Airborne amount added during the current step.
    #[must_use]
    pub fn pending_air(&self) -> f64 {
        self.entity.pending().air
    }

    /// Fomite amount added during the current step.
    #[must_use]
    pub fn pending_fomite(&self) -> f64 {
        self.entity.pending().fomite
    }

    /// Occupant ids with the index of each person in the model, in order of entry.
    pub fn occupants(&self) -> impl Iterator<Item = (&str, usize)> {
        self.occupants
            .iter()
            .map(|(id, index)| (id.as_str(), *index))
    }

    /// Registers `person`, stored at `index` in the model, as an occupant.
    pub fn enter_room(&mut self, person: &mut Person, index: usize) {
        self.occupants.insert(person.id().to_string(), index);
        person.enter_location(self.entity.id());
    }

    pub fn leave_room(&mut self, person: &mut Person) {
        if self.occupants.shift_remove(person.id()).is_some() {
            person.leave_location();
        }
    }

    pub fn update_air(&mut self, amount: f64) {
        self.entity.pending_mut().air += amount;
    }

    pub fn update_fomite(&mut self, amount: f64) {
        self.entity.pending_mut().fomite += amount;
    }

    pub fn add_stain(&mut self, area: f64, viral_load: f64, now: f64) {
        self.stains.push(Stain {
            area,
            viral_load,
            created: now,
        });
    }

    /// # Errors
    ///
    /// Fails if a configured rate gives an invalid Poisson mean.
    pub fn prime(&mut self, start: f64, horizon: f64, rng: &RngStore) -> Result<(), SimError> {
        self.scheduler.prime(None, start, horizon, rng)
    }

    #[must_use]
    pub fn next_event_time(&self) -> Option<f64> {
        self.scheduler.next_event_time()
    }

    /// Runs every room action due at `now`. `people` is indexed by the occupant indices.
    ///
    /// # Errors
    ///
    /// Propagates handler and scheduling errors.
    pub fn resolve_events(
        &mut self,
        people: &mut [Person],
        now: f64,
        dt: f64,
        rng: &RngStore,
    ) -> Result<(), SimError> {
        let due = self.scheduler.resolve_due(now, dt, None, rng)?;
        for action in due {
            self.handle(action, people, now)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the handler's parameters were not configured.
    pub fn handle(
        &mut self,
        action: RoomAction,
        people: &mut [Person],
        now: f64,
    ) -> Result<(), SimError> {
        trace!("{} handles {action} at {now}", self.id());
        let pending = self.entity.pending_mut();
        match action {
            RoomAction::CleanFomite => {
                pending.event_clean_fomite += 1;
                self.clean_fomite()
            }
            RoomAction::Social => {
                pending.event_social += 1;
                self.social(people);
                Ok(())
            }
        }
    }

    /// # Errors
    ///
    /// Fails if no cleaning efficiency was configured.
    pub fn clean_fomite(&mut self) -> Result<(), SimError> {
        let efficiency = self
            .settings
            .clean_efficiency
            .ok_or_else(|| SimError::config("cleanFomite has no efficiency"))?;
        self.entity.pending_mut().clean_fomite -=
            self.fomite_concentration * efficiency * self.settings.fomite_area;
        self.fomite_concentration *= 1.0 - efficiency;
        Ok(())
    }

    /// Hand-to-hand contact between the first two occupants. What one gains the other loses.
    pub fn social(&self, people: &mut [Person]) {
        let mut occupants = self.occupants.values().copied();
        let (Some(first), Some(second)) = (occupants.next(), occupants.next()) else {
            return;
        };
        let (Some(a), Some(b)) = (people.get(first), people.get(second)) else {
            return;
        };
        let amount = a.hand_surface_area()
            * a.hand_to_face()
            * (b.hand_concentration() - a.hand_concentration());
        people[first].receive_social(amount);
        people[second].receive_social(-amount);
    }

    /// Applies the amounts of the step at `now` with implicit decay and records a history row.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NumericalInstability`] if a reservoir update is not finite.
    pub fn integrate(&mut self, now: f64, dt: f64) -> Result<(), SimError> {
        let settings = Rc::clone(&self.settings);
        let pending = self.entity.pending().clone();

        let air_before = self.air_concentration;
        self.air_concentration = implicit_decay(
            self.air_concentration,
            pending.air,
            settings.air_decay_rate,
            dt,
            settings.volume(),
        )?;

        let fomite_before = self.fomite_concentration;
        self.fomite_concentration = implicit_decay(
            self.fomite_concentration,
            pending.fomite,
            settings.fomite_decay_rate,
            dt,
            settings.fomite_area,
        )?;

        for stain in &mut self.stains {
            stain.viral_load =
                implicit_decay(stain.viral_load, 0.0, settings.surface_decay_rate, dt, 1.0)?;
        }

        let snapshot = RoomSnapshot {
            name: self.id().to_string(),
            time: now,
            air_concentration: self.air_concentration,
            fomite_concentration: self.fomite_concentration,
            change_air: pending.air,
            change_fomite: pending.fomite,
            clean_fomite: pending.clean_fomite,
            air_with_decay: self.air_concentration - air_before,
            fomite_with_decay: self.fomite_concentration - fomite_before,
            stains: self.stains.len(),
            stain_viral_load: self.stains.iter().map(|stain| stain.viral_load).sum(),
            event_clean_fomite: pending.event_clean_fomite,
            event_social: pending.event_social,
        };
        self.entity.commit(snapshot);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_fomite_concentration(&mut self, concentration: f64) {
        self.fomite_concentration = concentration;
    }
}
