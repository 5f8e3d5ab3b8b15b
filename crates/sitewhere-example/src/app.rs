//! Host main loop.
//!
//! Everything that touches the client runs on this task: backend events,
//! work posted through the main thread queue, and the loopback platform's
//! replies. The reporting scheduler and audio capture only post work here.

use std::future;
use std::time::Duration;

use tracing::{debug, info, warn};

use sitewhere_client::{
    BackendEvent, ClientConfig, ClientResult, ConnectionState, DeliveryServiceBackend,
    LoopbackBackend, MainQueue, ReportingConfig, ReportingScheduler,
};
use sitewhere_core::MachineIdentity;

use crate::backend::HostBackend;
use crate::cli::Cli;
use crate::commands;
use crate::device::{Client, Device, DeviceProfile};
use crate::error::{AppError, AppResult};
use crate::simulator::PlatformSimulator;

/// Specification token used against the in-process platform when none is
/// configured.
const LOOPBACK_SPECIFICATION: &str = "loopback";

/// How long shutdown waits for the backend to confirm the disconnect.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Loads the config file named on the command line, or the default one.
pub fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    match &cli.config {
        Some(path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
}

/// Applies command-line overrides on top of the file configuration.
pub fn apply_overrides(config: &mut ClientConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.connection.broker_hostname = host.clone();
    }
    if let Some(port) = cli.port {
        config.connection.broker_port = port;
    }
    if let Some(hardware_id) = &cli.hardware_id {
        config.device.hardware_id = Some(hardware_id.clone());
    }
    if let Some(token) = &cli.specification_token {
        config.device.specification_token = token.clone();
    }
    if let Some(site) = &cli.site_token {
        config.device.site_token = Some(site.clone());
    }
    if let Some(secs) = cli.location_interval {
        config.reporting.location_interval_secs = secs;
    }
    if cli.loopback && config.device.specification_token.trim().is_empty() {
        config.device.specification_token = LOOPBACK_SPECIFICATION.to_string();
    }
}

/// Runs the device until Ctrl-C.
pub async fn run(cli: Cli, mut config: ClientConfig) -> AppResult<()> {
    apply_overrides(&mut config, &cli);
    if config.device.specification_token.trim().is_empty() {
        return Err(AppError::MissingSpecificationToken);
    }

    let connection = config.connection_config(&MachineIdentity::default())?;
    let (main, mut queue) = MainQueue::channel();

    let profile = DeviceProfile {
        hardware_id: connection.device_hardware_id.clone(),
        specification_token: config.device.specification_token.clone(),
        site_token: config.device.site_token.clone(),
        stream_duration: Duration::from_secs(cli.stream_secs),
    };

    let (backend, mut simulator) = if cli.loopback {
        let (backend, platform) = LoopbackBackend::pair();
        (
            HostBackend::Loopback(backend),
            Some(PlatformSimulator::new(platform)),
        )
    } else {
        (HostBackend::Delivery(DeliveryServiceBackend::new()), None)
    };

    let mut client: Client = Client::with_commands(
        backend,
        Device::new(profile, main.clone()),
        commands::registry()?,
    );
    client.connect(&connection);

    let scheduler = ReportingScheduler::new(
        ReportingConfig::new(config.reporting.location_interval()).without_initial_report(),
    );
    let (reporting, reporting_task) = scheduler.spawn({
        let main = main.clone();
        move || future::ready(main.run_on_main_thread(report_location))
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = client.next_event() => client.handle_event(event),
            Some(task) = queue.recv() => task(&mut client),
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "unable to listen for Ctrl-C");
                }
                info!("shutting down");
                break;
            }
        }
        if let Some(simulator) = simulator.as_mut() {
            simulator.respond();
        }
    }

    reporting.stop().await;
    if let Err(e) = reporting_task.await {
        warn!(error = %e, "reporting task failed");
    }
    disconnect(&mut client).await;

    if let Some(simulator) = &simulator {
        info!(chunks = simulator.chunks_received(), "loopback platform summary");
    }
    Ok(())
}

/// Disconnects and waits for the backend's confirmation, so the device
/// sees `on_disconnected` before the process exits.
async fn disconnect(client: &mut Client) {
    if client.state() == ConnectionState::Disconnected {
        return;
    }
    client.disconnect();

    let confirmed = tokio::time::timeout(DISCONNECT_GRACE, async {
        while let Some(event) = client.next_event().await {
            let last = client.connection().is_current(event.session)
                && matches!(
                    event.event,
                    BackendEvent::Disconnected | BackendEvent::BindFailed(_)
                );
            client.handle_event(event);
            if last {
                return true;
            }
        }
        false
    })
    .await;
    if !matches!(confirmed, Ok(true)) {
        warn!("backend did not confirm the disconnect");
    }
}

fn report_location(client: &mut Client) {
    if !client.handler().is_registered() {
        debug!("not registered, skipping location report");
        return;
    }
    if let Err(e) = client.with_handler(|device, transport| device.report_location(transport)) {
        warn!(error = %e, "location report failed");
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use sitewhere_client::ConnectionConfig;

    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let cli = Cli::parse_from([
            "sitewhere-example",
            "--host",
            "broker.local",
            "--port",
            "2883",
            "--hardware-id",
            "dev-7",
            "--site-token",
            "site-1",
            "--location-interval",
            "15",
        ]);
        let mut config = ClientConfig::default();
        config.device.specification_token = "spec-1".into();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.connection.broker_hostname, "broker.local");
        assert_eq!(config.connection.broker_port, 2883);
        assert_eq!(config.device.hardware_id.as_deref(), Some("dev-7"));
        assert_eq!(config.device.specification_token, "spec-1");
        assert_eq!(config.device.site_token.as_deref(), Some("site-1"));
        assert_eq!(config.reporting.location_interval(), Duration::from_secs(15));
    }

    #[test]
    fn loopback_fills_specification() {
        let cli = Cli::parse_from(["sitewhere-example", "--loopback"]);
        let mut config = ClientConfig::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.device.specification_token, LOOPBACK_SPECIFICATION);
    }

    fn loopback_client() -> (Client, PlatformSimulator) {
        let (backend, platform) = LoopbackBackend::pair();
        let (main, _queue) = MainQueue::channel();
        let profile = DeviceProfile {
            hardware_id: "dev-1".into(),
            specification_token: "spec-1".into(),
            site_token: None,
            stream_duration: Duration::ZERO,
        };
        let client = Client::with_commands(
            HostBackend::Loopback(backend),
            Device::new(profile, main),
            commands::registry().unwrap(),
        );
        (client, PlatformSimulator::new(platform))
    }

    #[tokio::test]
    async fn shutdown_waits_for_disconnect_confirmation() {
        let (mut client, mut simulator) = loopback_client();
        client.connect(&ConnectionConfig::new("localhost", 1883, "dev-1"));
        client.process_pending();
        simulator.respond();
        client.process_pending();
        assert!(client.handler().is_registered());

        disconnect(&mut client).await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        // on_disconnected ran
        assert!(!client.handler().is_registered());
    }

    #[tokio::test]
    async fn shutdown_when_disconnected_returns() {
        let (mut client, _simulator) = loopback_client();
        disconnect(&mut client).await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn missing_specification_rejected() {
        let cli = Cli::parse_from(["sitewhere-example", "--hardware-id", "dev-1"]);
        let err = run(cli, ClientConfig::default()).await.unwrap_err();
        assert!(matches!(err, AppError::MissingSpecificationToken));
    }
}
