use heapless::String;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::FormatError;
use crate::format::{bounded_str, float_or_nan, STATUS_CAPACITY, VALUE_CAPACITY};

/// Day-to-date energy as last read successfully from the inverter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnergyReading {
    pub value_watt_hours: u32,
    pub sample_epoch: u64,
}

/// The aggregated inverter status exposed over HTTP and the broker.
///
/// Measurements are `None` when the read failed. Serializes to a flat JSON
/// object in which missing numbers are the string `"NaN"`, floats are numbers
/// with two decimals and energies and timestamps are integers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    #[serde(rename = "last_update")]
    pub sample_epoch: u64,
    #[serde(serialize_with = "integer_or_nan")]
    pub energy_today: Option<u32>,
    #[serde(rename = "energy_total", serialize_with = "integer_or_nan")]
    pub energy_lifetime: Option<u32>,
    #[serde(rename = "last_pvoutput_read")]
    pub last_poller_success: u64,
    #[serde(rename = "last_pvoutput_sent")]
    pub last_report_sent: u64,
    #[serde(rename = "last_mqtt_stat_sent")]
    pub last_stat_sent: u64,
    #[serde(rename = "p_in", serialize_with = "two_decimals_or_nan")]
    pub input_power: Option<f32>,
    #[serde(rename = "p_in_1", serialize_with = "two_decimals_or_nan")]
    pub input_power_1: Option<f32>,
    #[serde(rename = "p_in_2", serialize_with = "two_decimals_or_nan")]
    pub input_power_2: Option<f32>,
    #[serde(serialize_with = "two_decimals_or_nan")]
    pub grid_voltage: Option<f32>,
    #[serde(serialize_with = "two_decimals_or_nan")]
    pub grid_frequency: Option<f32>,
    #[serde(rename = "temp_inverter", serialize_with = "two_decimals_or_nan")]
    pub inverter_temperature: Option<f32>,
    #[serde(rename = "temp_booster", serialize_with = "two_decimals_or_nan")]
    pub booster_temperature: Option<f32>,
}

impl StatusSnapshot {
    /// Fill every measurement missing from `self` with the value `previous`
    /// had for it. Timestamps are always taken from `self`, and the total
    /// input power is recomputed from the merged string powers.
    pub fn merged_with(self, previous: &StatusSnapshot) -> StatusSnapshot {
        let input_power_1 = self.input_power_1.or(previous.input_power_1);
        let input_power_2 = self.input_power_2.or(previous.input_power_2);
        StatusSnapshot {
            energy_today: self.energy_today.or(previous.energy_today),
            energy_lifetime: self.energy_lifetime.or(previous.energy_lifetime),
            input_power: total_input_power(input_power_1, input_power_2),
            input_power_1,
            input_power_2,
            grid_voltage: self.grid_voltage.or(previous.grid_voltage),
            grid_frequency: self.grid_frequency.or(previous.grid_frequency),
            inverter_temperature: self.inverter_temperature.or(previous.inverter_temperature),
            booster_temperature: self.booster_temperature.or(previous.booster_temperature),
            ..self
        }
    }

    pub fn to_json_payload(&self) -> Result<String<STATUS_CAPACITY>, FormatError> {
        let json =
            serde_json::to_string(self).map_err(|e| FormatError::Serialize(e.to_string()))?;
        bounded_str("status", &json)
    }

    /// The scalar `POWER` message, present only when the total is known.
    pub fn power_payload(&self) -> Result<Option<String<VALUE_CAPACITY>>, FormatError> {
        self.input_power
            .map(|p| float_or_nan(Some(p)))
            .transpose()
    }
}

/// Sum of both string powers. Never a partial sum.
pub fn total_input_power(input_power_1: Option<f32>, input_power_2: Option<f32>) -> Option<f32> {
    Some(input_power_1? + input_power_2?)
}

fn two_decimals_or_nan<S: Serializer>(value: &Option<f32>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) if v.is_finite() => {
            let number = RawValue::from_string(format!("{v:.2}")).map_err(S::Error::custom)?;
            number.serialize(s)
        }
        _ => s.serialize_str("NaN"),
    }
}

fn integer_or_nan<S: Serializer>(value: &Option<u32>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => s.serialize_u32(*v),
        None => s.serialize_str("NaN"),
    }
}
