use log::{info, warn};
use serde_derive::Deserialize;

use crate::clock::{local_datetime, to_local};
use crate::error::{FormatError, PublishError};
use crate::format::{bounded, REPORT_CAPACITY};
use crate::snapshot::EnergyReading;

pub const DEFAULT_URL: &str = "https://pvoutput.org/service/r2/addstatus.jsp";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PvOutputConfig {
    pub api_key: String,
    pub system_id: String,
    pub url: Option<String>,
}

impl PvOutputConfig {
    pub fn is_valid(&self) -> bool {
        !self.api_key.is_empty() && !self.system_id.is_empty()
    }
}

/// HTTP client seam: POST a form-encoded body and return the status code.
pub trait FormPoster {
    fn post_form(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<u16, PublishError>;
}

/// Render `d=YYYYMMDD&t=HH:MM&v1=<Wh>&c1=0` in local time.
pub fn format_report(
    reading: &EnergyReading,
    local_time_offset: i64,
) -> Result<heapless::String<REPORT_CAPACITY>, FormatError> {
    let local = local_datetime(to_local(reading.sample_epoch, local_time_offset))?;
    bounded(
        "report",
        format_args!(
            "d={}&t={}&v1={}&c1=0",
            local.format("%Y%m%d"),
            local.format("%H:%M"),
            reading.value_watt_hours
        ),
    )
}

/// The cloud report endpoint. Only HTTP 200 counts as delivered.
pub struct ReportSink {
    poster: Box<dyn FormPoster>,
    url: String,
    api_key: String,
    system_id: String,
    local_time_offset: i64,
}

impl ReportSink {
    pub fn new(
        config: &PvOutputConfig,
        poster: Box<dyn FormPoster>,
        local_time_offset: i64,
    ) -> Self {
        Self {
            poster,
            url: config.url.clone().unwrap_or_else(|| DEFAULT_URL.into()),
            api_key: config.api_key.clone(),
            system_id: config.system_id.clone(),
            local_time_offset,
        }
    }

    /// Submit one reading. Returns the posted body on success so callers can
    /// log what was delivered.
    pub fn submit(
        &mut self,
        reading: &EnergyReading,
    ) -> Result<heapless::String<REPORT_CAPACITY>, PublishError> {
        let body = format_report(reading, self.local_time_offset)?;
        info!("Posting to {}: {}", self.url, body);
        let headers = [
            ("Content-Type", "application/x-www-form-urlencoded"),
            ("X-Pvoutput-Apikey", self.api_key.as_str()),
            ("X-Pvoutput-SystemId", self.system_id.as_str()),
        ];
        match self.poster.post_form(&self.url, &headers, &body)? {
            200 => Ok(body),
            status => {
                warn!("PV Output update ({body}) returned {status}");
                Err(PublishError::Status(status))
            }
        }
    }
}

/// The single report waiting for delivery, if any.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingReport {
    reading: Option<EnergyReading>,
}

impl PendingReport {
    /// Replace whatever was pending, sent or not.
    pub fn set(&mut self, reading: EnergyReading) {
        self.reading = Some(reading);
    }

    pub fn get(&self) -> Option<EnergyReading> {
        self.reading
    }

    pub fn is_pending(&self) -> bool {
        self.reading.is_some()
    }

    pub fn clear(&mut self) {
        self.reading = None;
    }
}
