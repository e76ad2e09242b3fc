// externally visible interfaces
pub mod aggregator;
pub mod bridge;
pub mod broker;
pub mod clock;
pub mod connectivity;
pub mod error;
pub mod indicator;
pub mod inverter;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod protocol;
pub mod pvoutput;
pub mod scheduler;
pub mod snapshot;
pub mod status_server;

// internal interfaces
mod format;

#[cfg(test)]
mod testing;
