//! The control loop.
//!
//! [`Bridge`] owns every piece of mutable state: both schedule windows, the
//! aggregator and its snapshot, the pending report, the publish timestamps and
//! the link supervisors. One call to [`Bridge::tick`] is one loop iteration;
//! waits of any kind keep pumping the collaborator handlers.

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use serde_derive::Deserialize;

use crate::aggregator::{PublishMarks, SnapshotHandle, SnapshotPolicy, StatusAggregator};
use crate::broker::{BrokerSink, MessageKind, PublishPolicy};
use crate::clock::{to_local, Clock};
use crate::connectivity::{drive_until_connected, ConnectionState, Link, Supervisor, TICK};
use crate::format::{bounded, DIAGNOSTIC_CAPACITY};
use crate::indicator::{pattern, Indicator};
use crate::inverter::{Inverter, Transport};
use crate::mqtt_wrapper::MqttWrapper;
use crate::pvoutput::{PendingReport, ReportSink};
use crate::scheduler::ScheduleWindow;

pub const NETWORK_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const REPORT_RETRY_DELAY: Duration = Duration::from_secs(1);
const TIME_SYNC_RETRY_DELAY: Duration = Duration::from_millis(500);
const START_COUNTDOWN: u32 = 3;
const SETTLE_DELAY: Duration = Duration::from_secs(2);

fn default_report_period() -> u64 {
    300
}

fn default_stats_period() -> u64 {
    30
}

#[derive(Clone, Debug, Deserialize)]
pub struct BridgeConfig {
    /// Seconds between energy reports to the cloud endpoint.
    #[serde(default = "default_report_period")]
    pub report_period: u64,
    /// Seconds between status snapshots.
    #[serde(default = "default_stats_period")]
    pub stats_period: u64,
    /// Seconds added to epoch time to get local wall-clock time.
    #[serde(default)]
    pub local_time_offset: i64,
    #[serde(default)]
    pub snapshot_policy: SnapshotPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            report_period: default_report_period(),
            stats_period: default_stats_period(),
            local_time_offset: 0,
            snapshot_policy: SnapshotPolicy::default(),
        }
    }
}

impl BridgeConfig {
    pub fn is_valid(&self) -> bool {
        self.report_period > 0 && self.stats_period > 0
    }
}

pub struct Bridge<T: Transport, MQTT: MqttWrapper> {
    clock: Box<dyn Clock>,
    inverter: Inverter<T>,
    network: Box<dyn Link>,
    network_supervisor: Supervisor,
    broker: BrokerSink<MQTT>,
    reports: ReportSink,
    indicator: Box<dyn Indicator>,
    aggregator: StatusAggregator,
    report_window: ScheduleWindow,
    stats_window: ScheduleWindow,
    pending: PendingReport,
    marks: PublishMarks,
    local_time_offset: i64,
}

impl<T: Transport, MQTT: MqttWrapper> Bridge<T, MQTT> {
    pub fn new(
        config: &BridgeConfig,
        clock: Box<dyn Clock>,
        inverter: Inverter<T>,
        network: Box<dyn Link>,
        broker: BrokerSink<MQTT>,
        reports: ReportSink,
        indicator: Box<dyn Indicator>,
    ) -> Self {
        let now = clock.epoch();
        Self {
            report_window: ScheduleWindow::new(config.report_period, now),
            stats_window: ScheduleWindow::new(config.stats_period, now),
            clock,
            inverter,
            network,
            network_supervisor: Supervisor::new("network", NETWORK_RETRY_DELAY),
            broker,
            reports,
            indicator,
            aggregator: StatusAggregator::new(config.snapshot_policy),
            pending: PendingReport::default(),
            marks: PublishMarks::default(),
            local_time_offset: config.local_time_offset,
        }
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.aggregator.handle()
    }

    pub fn pending(&self) -> PendingReport {
        self.pending
    }

    pub fn marks(&self) -> PublishMarks {
        self.marks
    }

    pub fn report_window(&self) -> ScheduleWindow {
        self.report_window
    }

    pub fn stats_window(&self) -> ScheduleWindow {
        self.stats_window
    }

    pub fn network_state(&self) -> ConnectionState {
        self.network_supervisor.state()
    }

    /// Run every collaborator handler once.
    fn pump(&mut self) {
        self.broker.pump();
        self.indicator.tick();
    }

    /// Wait for `duration` while keeping the handlers going.
    fn delay(&mut self, duration: Duration) {
        let start = self.clock.millis();
        while self.clock.millis() - start < duration.as_millis() as u64 {
            self.pump();
            self.clock.sleep(TICK);
        }
    }

    /// Bring up network, time and broker, blocking until each of them is
    /// available, then align both schedule windows to the synced clock.
    pub fn bootstrap(&mut self) {
        self.indicator.on();
        for i in (1..=START_COUNTDOWN).rev() {
            info!("Starting in {i}");
            self.delay(Duration::from_secs(1));
        }

        info!("Network connecting");
        self.indicator.flash(pattern::CONTINUOUS);
        {
            let clock = &*self.clock;
            let broker = &mut self.broker;
            let indicator = &mut self.indicator;
            drive_until_connected(
                &mut self.network_supervisor,
                &mut *self.network,
                clock,
                &mut |_| {
                    broker.pump();
                    indicator.tick();
                },
            );
        }
        self.indicator.on();
        info!("Network connected");

        info!("Waiting for time sync");
        while !self.clock.sync() {
            self.delay(TIME_SYNC_RETRY_DELAY);
        }
        info!("Time synced: {}", self.clock.epoch());

        self.connect_broker();

        self.delay(SETTLE_DELAY);
        self.indicator.off();

        let now = self.clock.epoch();
        self.report_window.initialize(now);
        self.stats_window.initialize(now);
        info!(
            "First report at {}, first stats at {}",
            self.report_window.next_deadline(),
            self.stats_window.next_deadline()
        );
    }

    fn connect_broker(&mut self) {
        let clock = &*self.clock;
        let indicator = &mut self.indicator;
        self.broker.connect_blocking(clock, &mut || indicator.tick());
    }

    /// Log a diagnostic and mirror it to the broker, reconnecting first if
    /// needed.
    pub fn diagnostic(&mut self, args: fmt::Arguments<'_>) {
        info!("{args}");
        match bounded::<DIAGNOSTIC_CAPACITY>("diagnostic", args) {
            Ok(message) => {
                let clock = &*self.clock;
                let indicator = &mut self.indicator;
                self.broker.publish(
                    MessageKind::Log,
                    &message,
                    PublishPolicy::BlockUntilConnected,
                    clock,
                    &mut || indicator.tick(),
                );
            }
            Err(e) => warn!("diagnostic not mirrored: {e}"),
        }
    }

    /// One loop iteration: handlers, report window, stats window, then a
    /// pending report.
    pub fn tick(&mut self) {
        self.pump();

        let now = self.clock.epoch();
        if self.report_window.is_due(now) {
            self.energy_cycle(now);
            self.report_window.advance();
            info!(
                "Cumulative Energy updated. Next update scheduled at {}",
                self.report_window.next_deadline()
            );
        }

        let now = self.clock.epoch();
        if self.stats_window.is_due(now) {
            self.stats_cycle(now);
            self.stats_window.advance();
        }

        if self.pending.is_pending() {
            self.send_pending_report();
        }
    }

    pub fn run(&mut self) -> ! {
        self.bootstrap();
        loop {
            self.tick();
            self.clock.sleep(TICK);
        }
    }

    fn sync_inverter_clock(&mut self) {
        let was = self.inverter.read_clock().unwrap_or(0);
        let local = to_local(self.clock.epoch(), self.local_time_offset);
        info!("Setting inverter time: was {was} setting to: {local}");
        // failures are logged by the inverter
        let _ = self.inverter.write_clock(local);
    }

    fn energy_cycle(&mut self, now: u64) {
        self.sync_inverter_clock();
        match self.aggregator.refresh_energy(&mut self.inverter, now) {
            Some(reading) => {
                self.pending.set(reading);
                self.indicator.flash(pattern::READ_OK);
                self.diagnostic(format_args!(
                    "updated Today's energy: {} ({}) = {}",
                    reading.sample_epoch,
                    to_local(reading.sample_epoch, self.local_time_offset),
                    reading.value_watt_hours
                ));
            }
            None => self.indicator.flash(pattern::ENERGY_READ_FAILED),
        }
    }

    fn stats_cycle(&mut self, now: u64) {
        let Some(snapshot) = self
            .aggregator
            .update_stats(&mut self.inverter, now, self.marks)
        else {
            return;
        };
        self.indicator.flash(pattern::READ_OK);

        let clock = &*self.clock;
        let indicator = &mut self.indicator;
        let mut pump = || indicator.tick();

        match snapshot.power_payload() {
            Ok(Some(power)) => {
                self.broker.publish(
                    MessageKind::Power,
                    &power,
                    PublishPolicy::BestEffort,
                    clock,
                    &mut pump,
                );
            }
            Ok(None) => {}
            Err(e) => warn!("power message dropped: {e}"),
        }

        match snapshot.to_json_payload() {
            Ok(json) => {
                if self.broker.publish(
                    MessageKind::Status,
                    &json,
                    PublishPolicy::BestEffort,
                    clock,
                    &mut pump,
                ) {
                    self.marks.last_stat_sent = clock.epoch();
                }
            }
            Err(e) => warn!("status message dropped: {e}"),
        }
    }

    fn send_pending_report(&mut self) {
        let Some(reading) = self.pending.get() else {
            return;
        };
        if !self.network_supervisor.check(&mut *self.network) {
            debug!("network down, report deferred");
            return;
        }

        match self.reports.submit(&reading) {
            Ok(body) => {
                self.pending.clear();
                self.marks.last_report_sent = self.clock.epoch();
                self.indicator.flash(pattern::REPORT_SENT);
                self.diagnostic(format_args!("PV Output update ({body}) returned 200"));
            }
            Err(e) => {
                self.indicator.flash(pattern::REPORT_FAILED);
                self.diagnostic(format_args!(
                    "PV Output update of {} Wh at {} failed: {e}",
                    reading.value_watt_hours, reading.sample_epoch
                ));
                self.delay(REPORT_RETRY_DELAY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishError;
    use crate::protocol::{encode_reply, Command, REPLY_LEN, REQUEST_LEN};
    use crate::pvoutput::PvOutputConfig;
    use crate::testing::{FakeClock, FakeLink, FakePoster, MqttTester, ScriptedTransport};
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingIndicator(Rc<RefCell<Vec<u8>>>);

    impl Indicator for RecordingIndicator {
        fn on(&mut self) {}
        fn off(&mut self) {}
        fn flash(&mut self, count: u8) {
            self.0.borrow_mut().push(count);
        }
    }

    fn healthy(request: &[u8; REQUEST_LEN]) -> io::Result<[u8; REPLY_LEN]> {
        let payload = match request[1] {
            c if c == Command::CumulatedEnergy as u8 => 4200u32.to_be_bytes(),
            c if c == Command::Dsp as u8 => 100.0f32.to_be_bytes(),
            _ => [0; 4],
        };
        Ok(encode_reply(0, 6, payload))
    }

    struct Rig {
        bridge: Bridge<ScriptedTransport, MqttTester>,
        clock: FakeClock,
        broker: MqttTester,
        poster: FakePoster,
        flashes: RecordingIndicator,
    }

    fn rig(broker_up: bool, responses: Vec<Result<u16, PublishError>>) -> Rig {
        let clock = FakeClock::at(1000);
        let broker = MqttTester::with_broker(broker_up);
        let poster = FakePoster::new(responses);
        let flashes = RecordingIndicator::default();
        let pvoutput = PvOutputConfig {
            api_key: "key".into(),
            system_id: "1234".into(),
            url: None,
        };
        let bridge = Bridge::new(
            &BridgeConfig::default(),
            Box::new(clock.clone()),
            Inverter::new(ScriptedTransport::responding(healthy), 2),
            Box::new(FakeLink::reachable()),
            BrokerSink::with_client(broker.clone(), "aurora").unwrap(),
            ReportSink::new(&pvoutput, Box::new(poster.clone()), 0),
            Box::new(flashes.clone()),
        );
        Rig {
            bridge,
            clock,
            broker,
            poster,
            flashes,
        }
    }

    fn advance_to(clock: &FakeClock, epoch: u64) {
        while clock.epoch() < epoch {
            clock.advance(TICK);
        }
    }

    #[test]
    fn bootstrap_aligns_windows_and_announces() {
        let mut rig = rig(true, vec![]);
        rig.bridge.bootstrap();
        assert_eq!(rig.clock.epoch(), 1005);
        assert_eq!(rig.bridge.report_window().next_deadline(), 1200);
        assert_eq!(rig.bridge.stats_window().next_deadline(), 1020);
        assert_eq!(rig.bridge.network_state(), ConnectionState::Connected);
        assert_eq!(
            rig.broker.published(),
            vec![("tele/aurora/LWT".to_string(), "Online".to_string(), true)]
        );
    }

    #[test]
    fn stats_cycle_publishes_power_then_status() {
        let mut rig = rig(true, vec![]);
        rig.bridge.bootstrap();
        advance_to(&rig.clock, 1020);
        rig.bridge.tick();

        let published = rig.broker.published();
        assert_eq!(published.len(), 3);
        assert_eq!(
            published[1],
            ("tele/aurora/POWER".to_string(), "200.00".to_string(), false)
        );
        assert_eq!(published[2].0, "tele/aurora/STAT");
        assert!(published[2].1.contains("\"p_in\":200.00"));
        assert_eq!(rig.bridge.marks().last_stat_sent, 1020);
        assert_eq!(rig.bridge.stats_window().next_deadline(), 1050);
    }

    #[test]
    fn broker_down_still_updates_snapshot() {
        let mut rig = rig(false, vec![]);
        advance_to(&rig.clock, 1020);
        rig.bridge.tick();

        assert!(rig.broker.published().is_empty());
        assert_eq!(rig.broker.attempts(), 0);
        let snapshot = rig.bridge.snapshot_handle().current().unwrap();
        assert_eq!(snapshot.sample_epoch, 1020);
        assert_eq!(snapshot.energy_today, Some(4200));
        assert_eq!(rig.bridge.marks().last_stat_sent, 0);
    }

    #[test]
    fn report_window_runs_before_stats_window() {
        let mut rig = rig(true, vec![Ok(200)]);
        rig.bridge.bootstrap();
        advance_to(&rig.clock, 1200);
        rig.bridge.tick();

        let topics: Vec<String> = rig.broker.published().into_iter().map(|m| m.0).collect();
        let energy_log = topics.iter().position(|t| t == "tele/aurora/LOG").unwrap();
        let power = topics.iter().position(|t| t == "tele/aurora/POWER").unwrap();
        assert!(energy_log < power);
        assert_eq!(rig.bridge.report_window().next_deadline(), 1500);
    }

    #[test]
    fn failed_report_stays_pending_and_retries_same_body() {
        let mut rig = rig(true, vec![Ok(500), Ok(200)]);
        rig.bridge.bootstrap();
        advance_to(&rig.clock, 1200);
        rig.bridge.tick();

        assert!(rig.bridge.pending().is_pending());
        assert_eq!(rig.bridge.marks().last_report_sent, 0);
        assert_eq!(rig.poster.requests().len(), 1);

        rig.bridge.tick();
        assert!(!rig.bridge.pending().is_pending());
        assert_eq!(rig.bridge.marks().last_report_sent, rig.clock.epoch());

        let requests = rig.poster.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body, "d=19700101&t=00:20&v1=4200&c1=0");
        assert_eq!(requests[0].body, requests[1].body);
        let flashes = rig.flashes.0.borrow();
        let failed = flashes.iter().position(|f| *f == pattern::REPORT_FAILED);
        let sent = flashes.iter().position(|f| *f == pattern::REPORT_SENT);
        assert!(failed.unwrap() < sent.unwrap());
    }

    #[test]
    fn diagnostic_reconnects_broker_first() {
        let mut rig = rig(true, vec![]);
        rig.bridge.diagnostic(format_args!("hello {}", 1));
        assert_eq!(
            rig.broker.published(),
            vec![
                ("tele/aurora/LWT".to_string(), "Online".to_string(), true),
                ("tele/aurora/LOG".to_string(), "hello 1".to_string(), false),
            ]
        );
    }
}
