use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;
use serde_derive::Deserialize;

use crate::inverter::{Inverter, Transport};
use crate::protocol::{DspChannel, EnergyKind};
use crate::snapshot::{total_input_power, EnergyReading, StatusSnapshot};

/// How a stats cycle treats measurements it failed to read.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotPolicy {
    /// The new snapshot only holds what this cycle read.
    #[default]
    Replace,
    /// Missing measurements keep their last good value.
    Merge,
}

/// Shared read access to the current snapshot. Writers swap the whole value.
#[derive(Clone, Default)]
pub struct SnapshotHandle(Arc<RwLock<Option<StatusSnapshot>>>);

impl SnapshotHandle {
    /// `None` until the first stats cycle completed.
    pub fn current(&self) -> Option<StatusSnapshot> {
        self.0.read().clone()
    }

    fn replace(&self, snapshot: StatusSnapshot) {
        *self.0.write() = Some(snapshot);
    }
}

/// Publish-side timestamps folded into every snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishMarks {
    pub last_report_sent: u64,
    pub last_stat_sent: u64,
}

pub struct StatusAggregator {
    handle: SnapshotHandle,
    policy: SnapshotPolicy,
    energy: Option<EnergyReading>,
}

impl StatusAggregator {
    pub fn new(policy: SnapshotPolicy) -> Self {
        info!("Snapshot policy: {policy:?}");
        Self {
            handle: SnapshotHandle::default(),
            policy,
            energy: None,
        }
    }

    pub fn handle(&self) -> SnapshotHandle {
        self.handle.clone()
    }

    /// The last successful daily energy read.
    pub fn last_energy(&self) -> Option<EnergyReading> {
        self.energy
    }

    /// Read today's energy. On failure the previous reading stays in place
    /// and `None` is returned.
    pub fn refresh_energy<T: Transport>(
        &mut self,
        inverter: &mut Inverter<T>,
        now: u64,
    ) -> Option<EnergyReading> {
        let value = inverter.read_cumulative_energy(EnergyKind::Daily).ok()?;
        let reading = EnergyReading {
            value_watt_hours: value,
            sample_epoch: now,
        };
        self.energy = Some(reading);
        Some(reading)
    }

    /// Run one stats cycle and publish its snapshot. Returns `None` and
    /// leaves the current snapshot untouched when the inverter is offline.
    pub fn update_stats<T: Transport>(
        &mut self,
        inverter: &mut Inverter<T>,
        now: u64,
        marks: PublishMarks,
    ) -> Option<StatusSnapshot> {
        if !inverter.is_online() {
            info!("Can not update inverter stats - inverter offline");
            return None;
        }

        let energy_today = inverter.read_cumulative_energy(EnergyKind::Daily).ok();
        let energy_lifetime = inverter.read_cumulative_energy(EnergyKind::Lifetime).ok();
        let input_power_1 = inverter.read_analog(DspChannel::InputPower1);
        let input_power_2 = inverter.read_analog(DspChannel::InputPower2);
        let grid_voltage = inverter.read_analog(DspChannel::GridVoltage);
        let grid_frequency = inverter.read_analog(DspChannel::GridFrequency);
        let inverter_temperature = inverter.read_analog(DspChannel::InverterTemperature);
        let booster_temperature = inverter.read_analog(DspChannel::BoosterTemperature);

        let input_power = total_input_power(input_power_1, input_power_2);

        let mut snapshot = StatusSnapshot {
            sample_epoch: now,
            energy_today,
            energy_lifetime,
            last_poller_success: self.energy.map_or(0, |e| e.sample_epoch),
            last_report_sent: marks.last_report_sent,
            last_stat_sent: marks.last_stat_sent,
            input_power,
            input_power_1,
            input_power_2,
            grid_voltage,
            grid_frequency,
            inverter_temperature,
            booster_temperature,
        };
        if self.policy == SnapshotPolicy::Merge {
            if let Some(previous) = self.handle.current() {
                snapshot = snapshot.merged_with(&previous);
            }
        }

        debug!("Status updated: {snapshot:?}");
        self.handle.replace(snapshot.clone());
        Some(snapshot)
    }
}
