//! Aurora inverter wire format.
//!
//! Requests are 10 bytes `[address, command, b2..b7, crc_lo, crc_hi]`, replies
//! are 8 bytes `[transmission_state, global_state, b2..b5, crc_lo, crc_hi]`.
//! Checksums are CRC-16/X-25 over everything but the trailing two bytes,
//! transmitted low byte first.

use crc16::{State, X_25};

use crate::error::DeviceError;

pub const REQUEST_LEN: usize = 10;
pub const REPLY_LEN: usize = 8;

/// Inverter clocks count seconds from 2000-01-01T00:00:00.
pub const INVERTER_EPOCH_OFFSET: u64 = 946_684_800;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    State = 50,
    Dsp = 59,
    ReadTime = 70,
    WriteTime = 71,
    CumulatedEnergy = 78,
}

/// Period selector for the cumulated energy counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnergyKind {
    Daily = 0,
    Weekly = 1,
    LastSevenDays = 2,
    Monthly = 3,
    Yearly = 4,
    Lifetime = 5,
    Partial = 6,
}

/// Analog measurements served by the inverter's DSP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DspChannel {
    GridVoltage = 1,
    GridCurrent = 2,
    GridPower = 3,
    GridFrequency = 4,
    InputPower1 = 8,
    InputPower2 = 9,
    InverterTemperature = 21,
    BoosterTemperature = 22,
    Input1Voltage = 23,
    Input1Current = 25,
    Input2Voltage = 26,
    Input2Current = 27,
}

pub fn checksum(bytes: &[u8]) -> u16 {
    State::<X_25>::calculate(bytes)
}

pub fn encode_request(address: u8, command: Command, args: [u8; 6]) -> [u8; REQUEST_LEN] {
    let mut frame = [0u8; REQUEST_LEN];
    frame[0] = address;
    frame[1] = command as u8;
    frame[2..8].copy_from_slice(&args);
    let crc = checksum(&frame[..8]);
    frame[8..].copy_from_slice(&crc.to_le_bytes());
    frame
}

/// A reply whose checksum and transmission state have been verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reply {
    pub transmission_state: u8,
    pub global_state: u8,
    pub payload: [u8; 4],
}

impl Reply {
    pub fn decode(frame: &[u8; REPLY_LEN]) -> Result<Self, DeviceError> {
        let expected = checksum(&frame[..6]);
        let actual = u16::from_le_bytes([frame[6], frame[7]]);
        if expected != actual {
            return Err(DeviceError::Checksum { expected, actual });
        }
        if frame[0] != 0 {
            return Err(DeviceError::Transaction {
                code: frame[0],
                transmission: transmission_state_text(frame[0]),
                global: global_state_text(frame[1]),
            });
        }
        Ok(Self {
            transmission_state: frame[0],
            global_state: frame[1],
            payload: [frame[2], frame[3], frame[4], frame[5]],
        })
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.payload)
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_be_bytes(self.payload)
    }
}

pub fn transmission_state_text(code: u8) -> &'static str {
    match code {
        0 => "Everything is OK",
        51 => "Command is not implemented",
        52 => "Variable does not exist",
        53 => "Variable value is out of range",
        54 => "EEprom not accessible",
        55 => "Not Toggled Service Mode",
        56 => "Can not send the command to internal micro",
        57 => "Command not Executed",
        58 => "The variable is not available, retry",
        _ => "Unknown",
    }
}

pub fn global_state_text(code: u8) -> &'static str {
    match code {
        0 => "Sending Parameters",
        1 => "Wait Sun / Grid",
        2 => "Checking Grid",
        3 => "Measuring Riso",
        4 => "DcDc Start",
        5 => "Inverter Start",
        6 => "Run",
        7 => "Recovery",
        8 => "Pause",
        9 => "Ground Fault",
        10 => "OTH Fault",
        11 => "Address Setting",
        12 => "Self Test",
        13 => "Self Test Fail",
        14 => "Sensor Test + Meas.Riso",
        15 => "Leak Fault",
        16 => "Waiting for manual reset",
        17 => "Internal Error E026",
        18 => "Internal Error E027",
        19 => "Internal Error E028",
        20 => "Internal Error E029",
        21 => "Internal Error E030",
        22 => "Sending Wind Table",
        23 => "Failed Sending table",
        24 => "UTH Fault",
        25 => "Remote OFF",
        26 => "Interlock Fail",
        27 => "Executing Autotest",
        30 => "Waiting Sun",
        31 => "Temperature Fault",
        32 => "Fan Staucked",
        33 => "Int. Com. Fault",
        34 => "Slave Insertion",
        35 => "DC Switch Open",
        36 => "TRAS Switch Open",
        37 => "MASTER Exclusion",
        38 => "Auto Exclusion",
        98 => "Erasing Internal EEprom",
        99 => "Erasing External EEprom",
        100 => "Counting EEprom",
        101 => "Freeze",
        _ => "Unknown",
    }
}

/// Build a reply frame with a valid checksum. Used by fakes standing in for
/// the inverter.
pub fn encode_reply(transmission_state: u8, global_state: u8, payload: [u8; 4]) -> [u8; REPLY_LEN] {
    let mut frame = [0u8; REPLY_LEN];
    frame[0] = transmission_state;
    frame[1] = global_state;
    frame[2..6].copy_from_slice(&payload);
    let crc = checksum(&frame[..6]);
    frame[6..].copy_from_slice(&crc.to_le_bytes());
    frame
}
