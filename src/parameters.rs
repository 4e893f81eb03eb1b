//! The run configuration.
//!
//! The configuration is a JSON document with three sections, `simulation`, `person` and `room`.
//! Physical values are unit-tagged strings (`"30 min"`, `"1e6/ml"`) and sub-models are
//! `{ "name": ..., "params": { ... } }` objects. [`Parameters`] mirrors the document as written;
//! [`Parameters::resolve`] checks every name, unit and range and produces [`Settings`], the plain
//! SI values the model runs on.
//!
//! ```json
//! "actions": {
//!     "cough": {
//!         "frequency": { "Exposed": "2/h", "Infected": "6/h" },
//!         "viral_load_factor": 1,
//!         "stain_area": "5 cm^2",
//!         "droplet_model": "Nicas"
//!     },
//!     "washHands": { "frequency": "0.5/h", "efficiency": 0.8 }
//! }
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uom::si::area::square_meter;
use uom::si::frequency::hertz;
use uom::si::length::meter;
use uom::si::time::second;
use uom::si::volume::cubic_meter;
use uom::si::volume_rate::cubic_meter_per_second;

use crate::error::SimError;
use crate::person::{InfectionState, PersonAction};
use crate::room::RoomAction;
use crate::scheduling::{self, ActionTable, NumericalMethod};
use crate::submodels::{
    required, required_quantity, DoseResponse, ExhalationVolumes, Expulsion, IncubationModel,
    NamedModel,
};
use crate::units::{
    number_density, quantity_text, Area, Frequency, Length, NumberDensity, Time, Volume,
    VolumeRate, MILLILITER,
};

/// The configuration document as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub simulation: SimulationParameters,
    pub person: PersonParameters,
    pub room: RoomParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationParameters {
    #[serde(with = "quantity_text")]
    pub dt: Time,
    pub numerical_method: String,
    #[serde(default = "default_terminate_primary_infected")]
    pub terminate_primary_infected: bool,
    /// Primary viral load under which a run past the incubation end stops.
    #[serde(default = "default_detection_floor", with = "quantity_text")]
    pub detection_floor: NumberDensity,
}

fn default_terminate_primary_infected() -> bool {
    true
}

fn default_detection_floor() -> NumberDensity {
    number_density(1.0 / MILLILITER)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonParameters {
    pub physiology: PhysiologyParameters,
    pub transfer: TransferParameters,
    pub actions: IndexMap<String, ActionParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhysiologyParameters {
    #[serde(with = "quantity_text")]
    pub breathing_rate: VolumeRate,
    pub breathing_efficiency: f64,
    #[serde(with = "quantity_text")]
    pub min_viral_load: NumberDensity,
    #[serde(with = "quantity_text")]
    pub max_viral_load: NumberDensity,
    #[serde(with = "quantity_text")]
    pub sickness_period: Time,
    pub incubation: NamedModel,
    pub hand: HandParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandParameters {
    #[serde(with = "quantity_text")]
    pub surface_area: Area,
    #[serde(with = "quantity_text")]
    pub decay_rate: Frequency,
}

/// Transfer fractions between hands, surfaces and the face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferParameters {
    pub surface_to_hand: f64,
    pub hand_to_surface: f64,
    pub hand_to_face: f64,
    pub hand_to_mouth: f64,
    #[serde(with = "quantity_text")]
    pub autoinoculation_volume: Volume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomParameters {
    pub physical: PhysicalParameters,
    pub air: AirParameters,
    pub surface: SurfaceParameters,
    pub fomite: FomiteParameters,
    pub actions: IndexMap<String, ActionParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhysicalParameters {
    /// Floor area.
    #[serde(with = "quantity_text")]
    pub surface_area: Area,
    #[serde(with = "quantity_text")]
    pub height: Length,
    /// Ratio of the total touchable surface to the floor area.
    pub furniture_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirParameters {
    #[serde(with = "quantity_text")]
    pub decay_rate: Frequency,
    #[serde(with = "quantity_text")]
    pub exchange_rate: Frequency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurfaceParameters {
    #[serde(with = "quantity_text")]
    pub decay_rate: Frequency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FomiteParameters {
    #[serde(with = "quantity_text")]
    pub surface_area: Area,
    #[serde(with = "quantity_text")]
    pub decay_rate: Frequency,
}

/// One configured action: its frequency and the parameters its handler reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParameters {
    pub frequency: FrequencyParameters,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// A single rate, or one rate per infection state of the acting person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrequencyParameters {
    Constant(#[serde(with = "quantity_text")] Frequency),
    PerState(#[serde(with = "rate_table")] IndexMap<String, Frequency>),
}

mod rate_table {
    use indexmap::IndexMap;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::units::{ConfigQuantity, Frequency};

    pub fn serialize<S: Serializer>(
        table: &IndexMap<String, Frequency>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(table.len()))?;
        for (state, rate) in table {
            map.serialize_entry(state, &rate.to_config())?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<String, Frequency>, D::Error> {
        IndexMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(state, text)| {
                Frequency::parse_config(&text)
                    .map(|rate| (state, rate))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

/// Validated settings in SI units.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub simulation: SimulationSettings,
    pub person: PersonSettings,
    pub room: RoomSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Base timestep in seconds.
    pub dt: f64,
    pub numerical_method: NumericalMethod,
    pub terminate_primary_infected: bool,
    /// Per cubic metre.
    pub detection_floor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonSettings {
    /// Cubic metres per second.
    pub breathing_rate: f64,
    pub breathing_efficiency: f64,
    /// Per cubic metre.
    pub min_viral_load: f64,
    /// Per cubic metre.
    pub max_viral_load: f64,
    /// Seconds.
    pub sickness_period: f64,
    pub incubation: IncubationModel,
    /// Square metres.
    pub hand_surface_area: f64,
    /// Per second.
    pub hand_decay_rate: f64,
    pub transfer: TransferFactors,
    pub expulsions: Vec<(Expulsion, ExpulsionSettings)>,
    pub wash_efficiency: Option<f64>,
    pub dose_response: Option<DoseResponse>,
    pub actions: ActionTable<PersonAction>,
}

impl PersonSettings {
    #[must_use]
    pub fn expulsion(&self, kind: Expulsion) -> Option<&ExpulsionSettings> {
        self.expulsions
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, settings)| settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferFactors {
    pub surface_to_hand: f64,
    pub hand_to_surface: f64,
    pub hand_to_face: f64,
    pub hand_to_mouth: f64,
    /// Cubic metres.
    pub autoinoculation_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpulsionSettings {
    pub viral_load_factor: f64,
    /// Square metres.
    pub stain_area: f64,
    pub volumes: ExhalationVolumes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomSettings {
    /// Square metres.
    pub floor_area: f64,
    /// Metres.
    pub height: f64,
    pub furniture_factor: f64,
    /// Decay plus air exchange, per second.
    pub air_decay_rate: f64,
    /// Per second.
    pub surface_decay_rate: f64,
    /// Square metres.
    pub fomite_area: f64,
    /// Per second.
    pub fomite_decay_rate: f64,
    pub clean_efficiency: Option<f64>,
    pub actions: ActionTable<RoomAction>,
}

impl RoomSettings {
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.floor_area * self.height
    }

    /// Floor plus furniture.
    #[must_use]
    pub fn effective_surface_area(&self) -> f64 {
        self.floor_area * self.furniture_factor
    }
}

impl Parameters {
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid configuration document.
    pub fn from_json_file(path: &Path) -> Result<Self, SimError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// # Errors
    ///
    /// Returns a configuration error if the document does not match the expected layout.
    pub fn from_json_str(text: &str) -> Result<Self, SimError> {
        serde_json::from_str(text)
            .map_err(|e| SimError::config(format!("invalid configuration: {e}")))
    }

    /// Checks names, units and ranges and converts everything to SI.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error on the first invalid entry.
    pub fn resolve(&self) -> Result<Settings, SimError> {
        Ok(Settings {
            simulation: self.simulation.resolve()?,
            person: self.person.resolve()?,
            room: self.room.resolve()?,
        })
    }
}

impl SimulationParameters {
    fn resolve(&self) -> Result<SimulationSettings, SimError> {
        let numerical_method = self.numerical_method.parse().map_err(|_| {
            SimError::config(format!(
                "unknown numerical method `{}`",
                self.numerical_method
            ))
        })?;
        Ok(SimulationSettings {
            dt: positive(self.dt.get::<second>(), "simulation.dt")?,
            numerical_method,
            terminate_primary_infected: self.terminate_primary_infected,
            detection_floor: non_negative(
                self.detection_floor.value,
                "simulation.detection_floor",
            )?,
        })
    }
}

impl PersonParameters {
    fn resolve(&self) -> Result<PersonSettings, SimError> {
        let physiology = &self.physiology;
        let transfer = &self.transfer;

        let mut expulsions = Vec::new();
        let mut wash_efficiency = None;
        let mut dose_response = None;
        let mut actions = ActionTable::new();
        for (name, action_parameters) in &self.actions {
            let context = format!("person.actions.{name}");
            let action: PersonAction = parse_action(name, "person")?;
            let params = &action_parameters.params;
            match action {
                PersonAction::Cough | PersonAction::Sneeze | PersonAction::Talk => {
                    let kind = action.expulsion().ok_or_else(|| {
                        SimError::config(format!("{name} does not expel droplets"))
                    })?;
                    let model: NamedModel = required(params, "droplet_model", &context)?;
                    let factor: f64 = required(params, "viral_load_factor", &context)?;
                    let stain_area: Area = required_quantity(params, "stain_area", &context)?;
                    expulsions.push((
                        kind,
                        ExpulsionSettings {
                            viral_load_factor: non_negative(
                                factor,
                                &format!("{context}.viral_load_factor"),
                            )?,
                            stain_area: positive(
                                stain_area.get::<square_meter>(),
                                &format!("{context}.stain_area"),
                            )?,
                            volumes: ExhalationVolumes::from_config(kind, &model)?,
                        },
                    ));
                }
                PersonAction::WashHands => {
                    let efficiency: f64 = required(params, "efficiency", &context)?;
                    wash_efficiency = Some(fraction(efficiency, &format!("{context}.efficiency"))?);
                }
                PersonAction::ImmuneSystem => {
                    let model: NamedModel = required(params, "dose_response", &context)?;
                    dose_response = Some(DoseResponse::from_config(&model)?);
                }
                PersonAction::TouchFomite | PersonAction::TouchFace | PersonAction::TouchSurface => {}
            }
            actions.push(
                action,
                action_parameters
                    .frequency
                    .resolve(&format!("{context}.frequency"))?,
            );
        }

        Ok(PersonSettings {
            breathing_rate: non_negative(
                physiology.breathing_rate.get::<cubic_meter_per_second>(),
                "person.physiology.breathing_rate",
            )?,
            breathing_efficiency: fraction(
                physiology.breathing_efficiency,
                "person.physiology.breathing_efficiency",
            )?,
            min_viral_load: positive(
                physiology.min_viral_load.value,
                "person.physiology.min_viral_load",
            )?,
            max_viral_load: positive(
                physiology.max_viral_load.value,
                "person.physiology.max_viral_load",
            )?,
            sickness_period: non_negative(
                physiology.sickness_period.get::<second>(),
                "person.physiology.sickness_period",
            )?,
            incubation: IncubationModel::from_config(&physiology.incubation)?,
            hand_surface_area: positive(
                physiology.hand.surface_area.get::<square_meter>(),
                "person.physiology.hand.surface_area",
            )?,
            hand_decay_rate: non_negative(
                physiology.hand.decay_rate.get::<hertz>(),
                "person.physiology.hand.decay_rate",
            )?,
            transfer: TransferFactors {
                surface_to_hand: fraction(transfer.surface_to_hand, "person.transfer.surface_to_hand")?,
                hand_to_surface: fraction(transfer.hand_to_surface, "person.transfer.hand_to_surface")?,
                hand_to_face: fraction(transfer.hand_to_face, "person.transfer.hand_to_face")?,
                hand_to_mouth: fraction(transfer.hand_to_mouth, "person.transfer.hand_to_mouth")?,
                autoinoculation_volume: non_negative(
                    transfer.autoinoculation_volume.get::<cubic_meter>(),
                    "person.transfer.autoinoculation_volume",
                )?,
            },
            expulsions,
            wash_efficiency,
            dose_response,
            actions,
        })
    }
}

impl RoomParameters {
    fn resolve(&self) -> Result<RoomSettings, SimError> {
        let mut clean_efficiency = None;
        let mut actions = ActionTable::new();
        for (name, action_parameters) in &self.actions {
            let context = format!("room.actions.{name}");
            let action: RoomAction = parse_action(name, "room")?;
            if action == RoomAction::CleanFomite {
                let efficiency: f64 =
                    required(&action_parameters.params, "efficiency", &context)?;
                clean_efficiency = Some(fraction(efficiency, &format!("{context}.efficiency"))?);
            }
            // A per-state table would be looked up with no state and never fire.
            if matches!(action_parameters.frequency, FrequencyParameters::PerState(_)) {
                return Err(SimError::config(format!(
                    "{context}.frequency: a room has no infection state, use a single rate"
                )));
            }
            actions.push(
                action,
                action_parameters
                    .frequency
                    .resolve(&format!("{context}.frequency"))?,
            );
        }

        let air_decay = non_negative(self.air.decay_rate.get::<hertz>(), "room.air.decay_rate")?;
        let air_exchange = non_negative(
            self.air.exchange_rate.get::<hertz>(),
            "room.air.exchange_rate",
        )?;
        Ok(RoomSettings {
            floor_area: positive(
                self.physical.surface_area.get::<square_meter>(),
                "room.physical.surface_area",
            )?,
            height: positive(self.physical.height.get::<meter>(), "room.physical.height")?,
            furniture_factor: positive(
                self.physical.furniture_factor,
                "room.physical.furniture_factor",
            )?,
            air_decay_rate: air_decay + air_exchange,
            surface_decay_rate: non_negative(
                self.surface.decay_rate.get::<hertz>(),
                "room.surface.decay_rate",
            )?,
            fomite_area: positive(
                self.fomite.surface_area.get::<square_meter>(),
                "room.fomite.surface_area",
            )?,
            fomite_decay_rate: non_negative(
                self.fomite.decay_rate.get::<hertz>(),
                "room.fomite.decay_rate",
            )?,
            clean_efficiency,
            actions,
        })
    }
}

impl FrequencyParameters {
    fn resolve(&self, context: &str) -> Result<scheduling::Frequency, SimError> {
        match self {
            FrequencyParameters::Constant(rate) => Ok(scheduling::Frequency::Constant(
                non_negative(rate.get::<hertz>(), context)?,
            )),
            FrequencyParameters::PerState(table) => {
                let mut rates = Vec::with_capacity(table.len());
                for (state, rate) in table {
                    let state: InfectionState = state.parse().map_err(|_| {
                        SimError::config(format!("unknown infection state `{state}` in {context}"))
                    })?;
                    rates.push((
                        state,
                        non_negative(rate.get::<hertz>(), &format!("{context}.{state}"))?,
                    ));
                }
                Ok(scheduling::Frequency::PerState(rates))
            }
        }
    }
}

fn parse_action<A: FromStr>(name: &str, owner: &str) -> Result<A, SimError> {
    name.parse()
        .map_err(|_| SimError::config(format!("unknown {owner} action `{name}`")))
}

fn finite(value: f64, context: &str) -> Result<f64, SimError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::config(format!("{context} must be finite")))
    }
}

fn positive(value: f64, context: &str) -> Result<f64, SimError> {
    if finite(value, context)? > 0.0 {
        Ok(value)
    } else {
        Err(SimError::config(format!(
            "{context} must be positive, got {value}"
        )))
    }
}

fn non_negative(value: f64, context: &str) -> Result<f64, SimError> {
    if finite(value, context)? >= 0.0 {
        Ok(value)
    } else {
        Err(SimError::config(format!(
            "{context} must not be negative, got {value}"
        )))
    }
}

fn fraction(value: f64, context: &str) -> Result<f64, SimError> {
    if (0.0..=1.0).contains(&finite(value, context)?) {
        Ok(value)
    } else {
        Err(SimError::config(format!(
            "{context} must lie in [0, 1], got {value}"
        )))
    }
}
