mod config;
mod gateway;
mod host_network;
mod logging;
mod pvoutput_http;
mod rumqttc_wrapper;

use std::net::TcpListener;
use std::thread;

use anyhow::{bail, Context};
use aurora_bridge::aggregator::SnapshotHandle;
use aurora_bridge::bridge::Bridge;
use aurora_bridge::broker::BrokerSink;
use aurora_bridge::clock::SystemClock;
use aurora_bridge::indicator::LogIndicator;
use aurora_bridge::inverter::Inverter;
use aurora_bridge::pvoutput::ReportSink;
use aurora_bridge::status_server;
use config::Config;
use gateway::TcpGateway;
use host_network::RouteProbe;
use log::{error, info};
use pvoutput_http::HttpPoster;
use rumqttc_wrapper::RumqttcWrapper;

/// Serve the snapshot on its own thread so the control loop never waits on
/// HTTP clients.
fn spawn_status_server(address: &str, snapshot: SnapshotHandle) -> anyhow::Result<()> {
    let listener =
        TcpListener::bind(address).with_context(|| format!("cannot listen on {address}"))?;
    listener.set_nonblocking(true)?;
    info!("HTTP server started on {address}");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("status-server".into())
        .spawn(move || {
            let result = runtime.block_on(async {
                let listener = tokio::net::TcpListener::from_std(listener)?;
                status_server::serve(listener, snapshot).await
            });
            if let Err(e) = result {
                error!("HTTP server stopped: {e}");
            }
        })?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    logging::init_logger();
    info!("Running revision: {}", env!("GIT_HASH"));
    if std::env::args().len() > 1 {
        error!("Arguments passed. Tool is configured by config.toml in its path");
    }

    let config = Config::load()?;
    if !config.is_valid() {
        bail!("incomplete configuration: need inverter_host, [mqtt] host and [pvoutput] keys");
    }

    info!("inverter host: {}", config.inverter_host);
    let inverter = Inverter::new(
        TcpGateway::new(&config.inverter_host),
        config.inverter_address,
    );

    info!("Publishing to MQTT broker {}", config.mqtt.host);
    let broker = BrokerSink::<RumqttcWrapper>::new(&config.mqtt).context("invalid MQTT topic")?;
    let reports = ReportSink::new(
        &config.pvoutput,
        Box::new(HttpPoster::new()?),
        config.bridge.local_time_offset,
    );

    let mut bridge = Bridge::new(
        &config.bridge,
        Box::new(SystemClock::new()),
        inverter,
        Box::new(RouteProbe::new(&config.network_probe)),
        broker,
        reports,
        Box::new(LogIndicator),
    );
    spawn_status_server(&config.http_listen, bridge.snapshot_handle())?;

    bridge.run()
}
