//! `tapgate-sim`: the firmware stack on emulated hardware.
//!
//! Wires the controller to a virtual reader chip and mode button so
//! the whole device can be watched on a development machine: a demo
//! tag walks across the virtual antenna every few seconds, the mode
//! button gets tapped once to show the provisioning hand-off, and
//! everything is narrated through tracing until Ctrl-C.
//!
//! Usage: `tapgate-sim [config.json]`. A missing config file runs the
//! defaults; the allow list lives in the system temp directory so it
//! survives restarts of the simulator.

use std::time::Duration;

use anyhow::Context;
use tapgate_device::{
    AdminCommand, Clock, Controller, DeviceConfig, FeedbackLamp, FeedbackPattern, NoopBot,
    NoopFrontend, NoopProvisioner, StopHandle,
};
use tapgate_emulator::{VirtualButton, VirtualButtonHandle, VirtualChip, VirtualChipHandle};
use tapgate_reader::Pn532;
use tapgate_store::AccessStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// UID of the seeded demo card; every other tag in the script is
/// unknown, so the log shows both decisions.
const KNOWN_UID: [u8; 4] = [0x15, 0xD6, 0x14, 0x06];
const UNKNOWN_UID: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];

/// Lamp that narrates its patterns to the log instead of driving LEDs.
#[derive(Debug, Clone, Copy, Default)]
struct LogLamp;

impl FeedbackLamp for LogLamp {
    async fn signal(&mut self, pattern: FeedbackPattern) {
        info!(?pattern, "lamp");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "tapgate.json".to_string());
    let config = DeviceConfig::load(&config_path).context("loading configuration")?;

    let store_path = std::env::temp_dir().join("tapgate-sim-cards.json");
    info!(path = %store_path.display(), "allow list");
    let store = AccessStore::load(store_path);

    let (chip, chip_handle) = VirtualChip::new();
    let (button, button_handle) = VirtualButton::new();
    let clock = Clock::new();

    let mut controller = Controller::new(
        config,
        Pn532::new(chip),
        store,
        clock,
        NoopFrontend,
        NoopProvisioner,
        NoopBot,
        LogLamp,
        button,
    );
    controller
        .initialize()
        .await
        .context("reader bring-up failed")?;

    let outcome = controller.api().execute(AdminCommand::Add {
        uid_hex: "15 D6 14 06".to_string(),
        name: "Demo card".to_string(),
    });
    info!(msg = %outcome.msg, cards = outcome.cards.len(), "allow list seeded");

    spawn_ctrl_c(controller.stop_handle());
    spawn_tag_walker(chip_handle);
    spawn_button_demo(button_handle, clock);

    controller.run().await;
    Ok(())
}

/// Raise the stop flag on Ctrl-C.
fn spawn_ctrl_c(stop: StopHandle) {
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "ctrl-c handler failed");
        }
        info!("stopping");
        stop.stop();
    });
}

/// Walk the demo tags across the virtual antenna: three seconds of
/// empty field, two seconds with a tag resting on the reader.
fn spawn_tag_walker(chip: VirtualChipHandle) {
    tokio::spawn(async move {
        let tags: [&[u8]; 2] = [&KNOWN_UID, &UNKNOWN_UID];
        for uid in tags.iter().cycle() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            chip.present_tag(*uid);
            tokio::time::sleep(Duration::from_secs(2)).await;
            chip.remove_tag();
        }
    });
}

/// After twenty seconds, tap the mode button up to the provisioning
/// target so the hand-off shows up in the log once.
fn spawn_button_demo(button: VirtualButtonHandle, clock: Clock) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        info!("tapping the mode button");
        for _ in 0..7 {
            button.tap(clock.now_ms());
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    });
}
