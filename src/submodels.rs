//! Named parametric sub-models selected from the configuration.
//!
//! A sub-model is configured as `{ "name": ..., "params": { ... } }` (or just its name when it
//! takes no parameters) and resolved into a closed enum when the configuration is loaded, so an
//! unknown name or a missing parameter is reported before the simulation starts.

use std::f64::consts::PI;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::define_rng;
use crate::error::SimError;
use crate::numeric::gamma_cdf;
use crate::random::RngStore;
use crate::units::{ConfigQuantity, Time, Volume, MILLILITER};
use uom::si::time::{day, second};
use uom::si::volume::cubic_meter;

define_rng!(IncubationRng);

/// A `{name, params}` pair as written in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedModel {
    pub name: String,
    pub params: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNamedModel {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        params: Map<String, Value>,
    },
}

impl<'de> Deserialize<'de> for NamedModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawNamedModel::deserialize(deserializer)? {
            RawNamedModel::Name(name) => NamedModel {
                name,
                params: Map::new(),
            },
            RawNamedModel::Full { name, params } => NamedModel { name, params },
        })
    }
}

impl NamedModel {
    #[must_use]
    pub fn new(name: &str) -> Self {
        NamedModel {
            name: name.to_string(),
            params: Map::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    fn quantity<Q: ConfigQuantity>(&self, key: &str) -> Result<Q, SimError> {
        required_quantity(&self.params, key, &self.name)
    }

    fn number(&self, key: &str) -> Result<f64, SimError> {
        required(&self.params, key, &self.name)
    }
}

/// Reads the required entry `key` of `params`. `context` names the enclosing object in errors.
pub(crate) fn required<T: DeserializeOwned>(
    params: &Map<String, Value>,
    key: &str,
    context: &str,
) -> Result<T, SimError> {
    let value = params
        .get(key)
        .ok_or_else(|| SimError::config(format!("missing parameter `{key}` in {context}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| SimError::config(format!("invalid parameter `{key}` in {context}: {e}")))
}

/// Reads the required entry `key` of `params` as a quantity string such as `"10 cm^2"`.
pub(crate) fn required_quantity<Q: ConfigQuantity>(
    params: &Map<String, Value>,
    key: &str,
    context: &str,
) -> Result<Q, SimError> {
    let text: String = required(params, key, context)?;
    Q::parse_config(&text)
}

/// Distribution of the incubation period, drawn once per person at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IncubationModel {
    /// `exp(Normal(ln(mean_days), std))` days.
    LogNormal { mean_days: f64, std: f64 },
    /// A fixed period in seconds.
    Constant { period: f64 },
}

impl IncubationModel {
    /// # Errors
    ///
    /// Fails on an unknown model name, a missing parameter or an invalid value.
    pub fn from_config(model: &NamedModel) -> Result<Self, SimError> {
        match model.name.as_str() {
            "lognormal" => {
                let mean_days = model.quantity::<Time>("mean")?.get::<day>();
                let std = model.number("std")?;
                if !(mean_days > 0.0 && std.is_finite() && std >= 0.0) {
                    return Err(SimError::config(format!(
                        "lognormal incubation needs a positive mean and non-negative std, got {mean_days} d and {std}"
                    )));
                }
                Ok(IncubationModel::LogNormal { mean_days, std })
            }
            "constant" | "const" => {
                let period = model.quantity::<Time>("period")?.get::<second>();
                if !(period.is_finite() && period >= 0.0) {
                    return Err(SimError::config(format!(
                        "constant incubation period must be non-negative, got {period} s"
                    )));
                }
                Ok(IncubationModel::Constant { period })
            }
            other => Err(SimError::config(format!(
                "unknown incubation model `{other}`"
            ))),
        }
    }

    /// Draws an incubation period in seconds.
    ///
    /// # Errors
    ///
    /// Fails if the distribution cannot be built from the stored parameters.
    pub fn sample(&self, rng: &RngStore) -> Result<f64, SimError> {
        match *self {
            IncubationModel::LogNormal { mean_days, std } => {
                let distribution = rand_distr::LogNormal::new(mean_days.ln(), std)
                    .map_err(|e| SimError::config(format!("lognormal incubation: {e}")))?;
                let days: f64 = rng.sample_distr(IncubationRng, distribution);
                Ok(Time::new::<day>(days).get::<second>())
            }
            IncubationModel::Constant { period } => Ok(period),
        }
    }
}

/// Maps a dimensionless exposure to an infection probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DoseResponse {
    /// `1 - exp(-exposure / k)`
    Exponential { k: f64 },
}

impl DoseResponse {
    /// # Errors
    ///
    /// Fails on an unknown model name or a missing or non-positive `k`.
    pub fn from_config(model: &NamedModel) -> Result<Self, SimError> {
        match model.name.as_str() {
            "exponential" | "exp" => {
                let k = model.number("k")?;
                if !(k.is_finite() && k > 0.0) {
                    return Err(SimError::config(format!(
                        "dose response k must be positive, got {k}"
                    )));
                }
                Ok(DoseResponse::Exponential { k })
            }
            other => Err(SimError::config(format!(
                "unknown dose response `{other}`"
            ))),
        }
    }

    #[must_use]
    pub fn probability(&self, exposure: f64) -> f64 {
        match *self {
            DoseResponse::Exponential { k } => 1.0 - (-exposure / k).exp(),
        }
    }
}

/// The three actions that expel droplets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum Expulsion {
    Cough,
    Sneeze,
    Talk,
}

/// Droplet volumes of one expulsion, in cubic metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExhalationVolumes {
    /// Droplets that stay airborne.
    pub evaporating: f64,
    /// Droplets that settle on surfaces.
    pub non_evaporating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
enum DropletModel {
    Nicas,
    NicasChen,
    Duguid,
    Chen,
    #[strum(serialize = "explicit")]
    Explicit,
}

impl ExhalationVolumes {
    /// Resolves the droplet model configured for `action`.
    ///
    /// # Errors
    ///
    /// Fails if the model name is unknown or not defined for `action`, or if an explicit model
    /// misses a volume.
    pub fn from_config(action: Expulsion, model: &NamedModel) -> Result<Self, SimError> {
        let droplet_model: DropletModel = model.name.parse().map_err(|_| {
            SimError::config(format!("unknown droplet model `{}` for {action}", model.name))
        })?;

        let (evaporating, non_evaporating) = match (action, droplet_model) {
            (_, DropletModel::Explicit) => (
                model.quantity::<Volume>("evaporating")?.get::<cubic_meter>(),
                model.quantity::<Volume>("non_evaporating")?.get::<cubic_meter>(),
            ),
            (Expulsion::Cough, DropletModel::Nicas) => split_one_percent(0.044 * MILLILITER),
            (Expulsion::Cough, DropletModel::NicasChen) => {
                split_one_percent((0.044 + 0.015) / 2.0 * MILLILITER)
            }
            (Expulsion::Cough, DropletModel::Chen) => chen_cough_volumes(),
            (Expulsion::Cough, DropletModel::Duguid) => {
                (5.508_527e-4 * MILLILITER, 0.059_860 * MILLILITER)
            }
            (Expulsion::Sneeze, DropletModel::Duguid) => {
                (3.862_652e-2 * MILLILITER, 4.356_433 * MILLILITER)
            }
            (Expulsion::Sneeze, DropletModel::Chen) => (chen_sneeze_volume(), 0.0),
            (Expulsion::Talk, DropletModel::Duguid) => {
                (2.998_518e-5 * MILLILITER, 0.002_579 * MILLILITER)
            }
            (action, _) => {
                return Err(SimError::config(format!(
                    "droplet model `{}` is not defined for {action}",
                    model.name
                )))
            }
        };

        if evaporating < 0.0 || non_evaporating < 0.0 {
            return Err(SimError::config(format!(
                "droplet volumes for {action} must be non-negative"
            )));
        }
        Ok(ExhalationVolumes {
            evaporating,
            non_evaporating,
        })
    }
}

/// 1% of the volume stays airborne.
fn split_one_percent(total: f64) -> (f64, f64) {
    (0.01 * total, 0.99 * total)
}

/// Sum of droplet volumes over diameters of 1 to 59 microns for the fitted sneeze size
/// distribution, in cubic metres.
fn chen_sneeze_volume() -> f64 {
    (1..60)
        .map(|diameter| {
            let d = f64::from(diameter);
            let count = 2123.0 + 367_734.0 * (-0.5 * ((d / 7.11).ln() / 0.65).powi(2)).exp();
            4.0 / 3.0 * PI * (d * 1e-6).powi(3) * count
        })
        .sum()
}

/// Volume in cubic metres of `count` droplets whose size in microns follows `cdf`, summed over
/// the bins between consecutive `edges` at the bin midpoints.
fn binned_volume(edges: &[f64], cdf: impl Fn(f64) -> f64, count: f64) -> f64 {
    edges
        .windows(2)
        .map(|bin| {
            let mid = 0.5 * (bin[0] + bin[1]);
            let fraction = cdf(bin[1]) - cdf(bin[0]);
            4.0 / 3.0 * PI * (mid * 1e-6).powi(3) * fraction * count
        })
        .sum()
}

fn micron_edges(start: u32, end: u32) -> Vec<f64> {
    (start..end).map(f64::from).collect()
}

/// Trimodal cough size distribution fitted to Chen's measurements. Returns the airborne and
/// settling volumes in cubic metres.
///
/// Small droplets (gamma, below 20 microns) evaporate, medium ones (beta from 53 microns) stay
/// airborne below 100 microns, and large ones (uniform from 225 to 800 microns) settle.
fn chen_cough_volumes() -> (f64, f64) {
    let small_edges: Vec<f64> = (0..200).map(|i| f64::from(i) * 0.1).collect();
    let small = binned_volume(&small_edges, |d| gamma_cdf(3.75, d), 230.0);

    let medium_cdf = |d: f64| ((d - 53.0) / 200.0).clamp(0.0, 1.0).powf(0.2);
    let medium_airborne = binned_volume(&micron_edges(10, 100), medium_cdf, 210.0);
    let medium_settling = binned_volume(&micron_edges(100, 225), medium_cdf, 210.0);

    let large_cdf = |d: f64| ((d - 225.0) / 575.0).clamp(0.0, 1.0);
    let large = binned_volume(&micron_edges(225, 800), large_cdf, 20.0);

    (small + medium_airborne, medium_settling + large)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use crate::units::DAY;
    use serde_json::json;

    #[test]
    fn named_model_from_name_or_object() {
        let by_name: NamedModel = serde_json::from_value(json!("Duguid")).unwrap();
        assert_eq!(by_name, NamedModel::new("Duguid"));

        let full: NamedModel =
            serde_json::from_value(json!({"name": "exponential", "params": {"k": 410}})).unwrap();
        assert_eq!(full.name, "exponential");
        assert_eq!(full.params["k"], json!(410));
    }

    #[test]
    fn constant_incubation() {
        let model = NamedModel::new("constant").with_param("period", "5 d");
        let incubation = IncubationModel::from_config(&model).unwrap();
        assert_eq!(
            incubation.sample(&RngStore::new(0)).unwrap(),
            5.0 * DAY
        );
    }

    #[test]
    fn lognormal_incubation_with_zero_std_is_the_mean() {
        let model = NamedModel::new("lognormal")
            .with_param("mean", "5 d")
            .with_param("std", 0.0);
        let incubation = IncubationModel::from_config(&model).unwrap();
        let period = incubation.sample(&RngStore::new(1)).unwrap();
        assert_almost_eq!(period / DAY, 5.0, 1e-9);
    }

    #[test]
    fn lognormal_incubation_is_reproducible() {
        let model = NamedModel::new("lognormal")
            .with_param("mean", "5 d")
            .with_param("std", 0.5);
        let incubation = IncubationModel::from_config(&model).unwrap();
        let first = incubation.sample(&RngStore::new(8)).unwrap();
        let second_draw = incubation.sample(&RngStore::new(8)).unwrap();
        assert_eq!(first.to_bits(), second_draw.to_bits());
        assert!(first > 0.0);
    }

    #[test]
    fn incubation_errors() {
        let missing = NamedModel::new("lognormal").with_param("mean", "5 d");
        assert!(IncubationModel::from_config(&missing)
            .unwrap_err()
            .is_configuration_error());

        let wrong_unit = NamedModel::new("constant").with_param("period", "5 m");
        assert!(matches!(
            IncubationModel::from_config(&wrong_unit),
            Err(SimError::UnitParse { expected: "a time", .. })
        ));

        let bare_number = NamedModel::new("constant").with_param("period", 5.0);
        assert!(IncubationModel::from_config(&bare_number)
            .unwrap_err()
            .is_configuration_error());

        let unknown = NamedModel::new("gamma");
        assert!(IncubationModel::from_config(&unknown).is_err());
    }

    #[test]
    fn exponential_dose_response() {
        let model = NamedModel::new("exponential").with_param("k", 410.0);
        let response = DoseResponse::from_config(&model).unwrap();
        assert_eq!(response.probability(0.0), 0.0);
        assert_almost_eq!(response.probability(410.0), 1.0 - (-1.0f64).exp(), 1e-12);
        assert!(DoseResponse::from_config(&NamedModel::new("beta")).is_err());
        assert!(
            DoseResponse::from_config(&NamedModel::new("exp").with_param("k", 0.0)).is_err()
        );
    }

    #[test]
    fn droplet_model_constants() {
        let nicas =
            ExhalationVolumes::from_config(Expulsion::Cough, &NamedModel::new("Nicas")).unwrap();
        assert_almost_eq!(nicas.evaporating, 0.044e-2 * MILLILITER, 1e-18);
        assert_almost_eq!(nicas.non_evaporating, 0.044 * 0.99 * MILLILITER, 1e-18);

        let talk =
            ExhalationVolumes::from_config(Expulsion::Talk, &NamedModel::new("Duguid")).unwrap();
        assert_almost_eq!(talk.non_evaporating, 0.002_579e-6, 1e-18);

        let chen =
            ExhalationVolumes::from_config(Expulsion::Sneeze, &NamedModel::new("Chen")).unwrap();
        assert!(chen.evaporating > 0.0);
        assert_eq!(chen.non_evaporating, 0.0);
    }

    #[test]
    fn chen_cough_splits_small_and_large_droplets() {
        let chen =
            ExhalationVolumes::from_config(Expulsion::Cough, &NamedModel::new("Chen")).unwrap();
        assert!(chen.non_evaporating > 1e-8 && chen.non_evaporating < 2e-8);
        assert!(chen.evaporating > 1e-11 && chen.evaporating < 1e-9);
        assert!(chen.evaporating < chen.non_evaporating);

        let again =
            ExhalationVolumes::from_config(Expulsion::Cough, &NamedModel::new("Chen")).unwrap();
        assert_eq!(chen, again);
    }

    #[test]
    fn binned_volume_of_a_single_bin() {
        let volume = binned_volume(&[1.0, 3.0], |d| d / 4.0, 10.0);
        assert_almost_eq!(volume, 4.0 / 3.0 * PI * 8e-18 * 0.5 * 10.0, 1e-30);
    }

    #[test]
    fn explicit_droplet_model() {
        let model = NamedModel::new("explicit")
            .with_param("evaporating", "0.001 ml")
            .with_param("non_evaporating", "0.05 ml");
        let volumes = ExhalationVolumes::from_config(Expulsion::Talk, &model).unwrap();
        assert_almost_eq!(volumes.evaporating, 1e-9, 1e-20);
        assert_almost_eq!(volumes.non_evaporating, 5e-8, 1e-20);
    }

    #[test]
    fn droplet_model_must_match_action() {
        let err = ExhalationVolumes::from_config(Expulsion::Talk, &NamedModel::new("Nicas"))
            .unwrap_err();
        assert!(err.to_string().contains("not defined for talk"));
        assert!(
            ExhalationVolumes::from_config(Expulsion::Cough, &NamedModel::new("Wells")).is_err()
        );
    }
}
