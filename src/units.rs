//! Physical quantities read from the configuration.
//!
//! Configured values are `uom` quantities, so a period can only be given in a time unit and a
//! decay rate only as a frequency. They are written as strings: `"<number> <unit>"` for plain
//! quantities (`"30 min"`, `"100 cm^2"`) and `"<number>/<unit>"` for rates and concentrations
//! (`"4/h"`, `"1e6/ml"`). A flow is a volume over a time unit (`"0.5 m^3/h"`). Unit symbols are
//! the ones `uom` knows; ASCII powers such as `m^2` and the `ml`/`l` spellings are accepted too.
//!
//! The simulation core works on plain `f64` values in SI units once the configuration has been
//! checked, so the constants below are the only conversions it needs.

use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serializer};
use uom::fmt::DisplayStyle;
use uom::si::area::square_meter;
use uom::si::frequency::hertz;
use uom::si::length::meter;
use uom::si::time::second;
use uom::si::volume::cubic_meter;
use uom::si::volume_rate::cubic_meter_per_second;
use uom::si::{ISQ, SI};
use uom::typenum::{N3, Z0};

use crate::error::SimError;

pub use uom::si::f64::{Area, Frequency, Length, Time, Volume, VolumeRate};

/// A count per unit volume, used for viral loads and air concentrations.
pub type NumberDensity = uom::si::Quantity<ISQ<N3, Z0, Z0, Z0, Z0, Z0, Z0>, SI<f64>, f64>;

pub const HOUR: f64 = 3600.0;
pub const DAY: f64 = 86_400.0;
pub const CENTIMETER: f64 = 1e-2;
pub const MILLILITER: f64 = 1e-6;

/// A quantity with a textual configuration form.
pub trait ConfigQuantity: Sized {
    /// What the quantity measures, for error messages.
    const KIND: &'static str;

    /// # Errors
    ///
    /// Returns [`SimError::UnitParse`] if `text` is not a value in a unit of this kind.
    fn parse_config(text: &str) -> Result<Self, SimError>;

    /// A form that `parse_config` reads back to the same value.
    fn to_config(&self) -> String;
}

fn unit_error(text: &str, expected: &'static str) -> SimError {
    SimError::UnitParse {
        text: text.trim().to_string(),
        expected,
    }
}

/// Rewrites ASCII spellings into the symbols `uom` parses.
fn normalize_unit(unit: &str) -> String {
    let unit = unit.trim().replace("**", "^").replace("^2", "²").replace("^3", "³");
    match unit.as_str() {
        "ml" => "mL".to_string(),
        "l" => "L".to_string(),
        "sec" => "s".to_string(),
        "hr" => "h".to_string(),
        "day" | "days" => "d".to_string(),
        _ => unit,
    }
}

fn parse_number(number: &str, text: &str, expected: &'static str) -> Result<f64, SimError> {
    number
        .trim()
        .parse::<f64>()
        .map_err(|_| unit_error(text, expected))
}

/// Parses `"<number> <unit>"` with `uom`; `text` is the original string for error messages.
fn parse_with_unit<Q>(value: &str, text: &str, expected: &'static str) -> Result<Q, SimError>
where
    Q: FromStr,
{
    let (number, unit) = value
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| unit_error(text, expected))?;
    format!("{} {}", number.trim(), normalize_unit(unit))
        .parse::<Q>()
        .map_err(|_| unit_error(text, expected))
}

/// One unit of the denominator of `"<number>/<unit>"`.
fn per_unit<Q: FromStr>(unit: &str, text: &str, expected: &'static str) -> Result<Q, SimError> {
    if unit.trim().is_empty() {
        return Err(unit_error(text, expected));
    }
    parse_with_unit(&format!("1 {unit}"), text, expected)
}

impl ConfigQuantity for Time {
    const KIND: &'static str = "a time";

    fn parse_config(text: &str) -> Result<Self, SimError> {
        parse_with_unit(text, text, Self::KIND)
    }

    fn to_config(&self) -> String {
        format!(
            "{:?}",
            self.into_format_args(second, DisplayStyle::Abbreviation)
        )
    }
}

impl ConfigQuantity for Length {
    const KIND: &'static str = "a length";

    fn parse_config(text: &str) -> Result<Self, SimError> {
        parse_with_unit(text, text, Self::KIND)
    }

    fn to_config(&self) -> String {
        format!(
            "{:?}",
            self.into_format_args(meter, DisplayStyle::Abbreviation)
        )
    }
}

impl ConfigQuantity for Area {
    const KIND: &'static str = "an area";

    fn parse_config(text: &str) -> Result<Self, SimError> {
        parse_with_unit(text, text, Self::KIND)
    }

    fn to_config(&self) -> String {
        format!(
            "{:?}",
            self.into_format_args(square_meter, DisplayStyle::Abbreviation)
        )
    }
}

impl ConfigQuantity for Volume {
    const KIND: &'static str = "a volume";

    fn parse_config(text: &str) -> Result<Self, SimError> {
        parse_with_unit(text, text, Self::KIND)
    }

    fn to_config(&self) -> String {
        format!(
            "{:?}",
            self.into_format_args(cubic_meter, DisplayStyle::Abbreviation)
        )
    }
}

impl ConfigQuantity for Frequency {
    const KIND: &'static str = "a rate";

    /// `"<count>/<time unit>"`, or any frequency unit `uom` knows (`"0.5 Hz"`).
    fn parse_config(text: &str) -> Result<Self, SimError> {
        match text.split_once('/') {
            Some((count, period)) => {
                let count = parse_number(count, text, Self::KIND)?;
                let period: Time = per_unit(period, text, Self::KIND)?;
                Ok(Frequency::new::<hertz>(count / period.get::<second>()))
            }
            None => parse_with_unit(text, text, Self::KIND),
        }
    }

    fn to_config(&self) -> String {
        format!("{:?}/s", self.get::<hertz>())
    }
}

impl ConfigQuantity for VolumeRate {
    const KIND: &'static str = "a flow";

    /// `"<volume>/<time unit>"`.
    fn parse_config(text: &str) -> Result<Self, SimError> {
        let (volume, period) = text
            .split_once('/')
            .ok_or_else(|| unit_error(text, Self::KIND))?;
        let volume: Volume = parse_with_unit(volume, text, Self::KIND)?;
        let period: Time = per_unit(period, text, Self::KIND)?;
        Ok(VolumeRate::new::<cubic_meter_per_second>(
            volume.get::<cubic_meter>() / period.get::<second>(),
        ))
    }

    fn to_config(&self) -> String {
        format!("{:?} m^3/s", self.get::<cubic_meter_per_second>())
    }
}

impl ConfigQuantity for NumberDensity {
    const KIND: &'static str = "a concentration";

    /// `"<count>/<volume unit>"`.
    fn parse_config(text: &str) -> Result<Self, SimError> {
        let (count, volume) = text
            .split_once('/')
            .ok_or_else(|| unit_error(text, Self::KIND))?;
        let count = parse_number(count, text, Self::KIND)?;
        let volume: Volume = per_unit(volume, text, Self::KIND)?;
        Ok(number_density(count / volume.get::<cubic_meter>()))
    }

    fn to_config(&self) -> String {
        format!("{:?}/m^3", self.value)
    }
}

/// A concentration of `per_cubic_meter` counts per cubic metre.
#[must_use]
pub fn number_density(per_cubic_meter: f64) -> NumberDensity {
    NumberDensity {
        dimension: PhantomData,
        units: PhantomData,
        value: per_cubic_meter,
    }
}

/// Serde adapter for `#[serde(with = "quantity_text")]` fields.
pub mod quantity_text {
    use super::{ConfigQuantity, Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<Q, S>(quantity: &Q, serializer: S) -> Result<S::Ok, S::Error>
    where
        Q: ConfigQuantity,
        S: Serializer,
    {
        serializer.serialize_str(&quantity.to_config())
    }

    pub fn deserialize<'de, Q, D>(deserializer: D) -> Result<Q, D::Error>
    where
        Q: ConfigQuantity,
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Q::parse_config(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use uom::si::time::{day, hour};

    #[test]
    fn parses_plain_quantities() {
        let dt = Time::parse_config("30 min").unwrap();
        assert_almost_eq!(dt.get::<second>(), 1800.0, 1e-12);

        let area = Area::parse_config("5 cm^2").unwrap();
        assert_almost_eq!(area.get::<square_meter>(), 5e-4, 1e-16);

        let height = Length::parse_config("3 m").unwrap();
        assert_almost_eq!(height.get::<meter>(), 3.0, 1e-12);

        let volume = Volume::parse_config("0.01 ml").unwrap();
        assert_almost_eq!(volume.get::<cubic_meter>(), 1e-8, 1e-20);

        let period = Time::parse_config("7 days").unwrap();
        assert_almost_eq!(period.get::<hour>(), 168.0, 1e-9);
    }

    #[test]
    fn parses_rates_and_concentrations() {
        let rate = Frequency::parse_config("4/h").unwrap();
        assert_almost_eq!(rate.get::<hertz>(), 4.0 / HOUR, 1e-15);

        let zero = Frequency::parse_config("0/h").unwrap();
        assert_eq!(zero.get::<hertz>(), 0.0);

        let flow = VolumeRate::parse_config("0.5 m^3/h").unwrap();
        assert_almost_eq!(flow.get::<cubic_meter_per_second>(), 0.5 / HOUR, 1e-16);

        let load = NumberDensity::parse_config("1e6/ml").unwrap();
        assert_almost_eq!(load.value, 1e12, 1e-3);
    }

    #[test]
    fn rejects_other_kinds_and_garbage() {
        assert!(matches!(
            Time::parse_config("5 parsecs"),
            Err(SimError::UnitParse { expected: "a time", .. })
        ));
        assert!(Frequency::parse_config("0.5 h").is_err());
        assert!(Time::parse_config("5 m").is_err());
        assert!(Time::parse_config("minutes").is_err());
        assert!(Frequency::parse_config("3/").is_err());
        assert!(NumberDensity::parse_config("1e6 ml").is_err());
        assert!(Time::parse_config("5 m").unwrap_err().is_configuration_error());
    }

    #[test]
    fn configuration_form_parses_back() {
        let period = Time::parse_config("5 d").unwrap();
        assert_eq!(Time::parse_config(&period.to_config()).unwrap(), period);
        assert_almost_eq!(period.get::<day>(), 5.0, 1e-12);

        let area = Area::parse_config("100 cm^2").unwrap();
        assert_eq!(Area::parse_config(&area.to_config()).unwrap(), area);

        let flow = VolumeRate::parse_config("0.5 m^3/h").unwrap();
        assert_eq!(VolumeRate::parse_config(&flow.to_config()).unwrap(), flow);

        let rate = Frequency::parse_config("6/h").unwrap();
        assert_eq!(Frequency::parse_config(&rate.to_config()).unwrap(), rate);

        let load = NumberDensity::parse_config("1/ml").unwrap();
        assert_eq!(NumberDensity::parse_config(&load.to_config()).unwrap(), load);
    }
}
