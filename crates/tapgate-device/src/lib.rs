//! Device controller for the tapgate access-control firmware.
//!
//! Everything above the reader driver lives here: the cooperative
//! [`controller`] loop, button [`gesture`] detection split across
//! interrupt and tick contexts, the single-subscriber event
//! [`broadcast`]er, the admin [`commands`] funnel and the [`traits`]
//! behind which the web frontend, provisioning portal, chat bot, lamp
//! and button sit. Wire framing, the chip driver and the allow list
//! come from the `tapgate-protocol`, `tapgate-reader` and
//! `tapgate-store` crates.

pub mod broadcast;
pub mod clock;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod gesture;
pub mod traits;

pub use broadcast::{EventBroadcaster, RecordingSink, Snapshot, SnapshotSink};
pub use clock::Clock;
pub use commands::{AdminCommand, CommandOutcome};
pub use config::{DeviceConfig, GestureConfig};
pub use controller::{Controller, DeviceApi, StopHandle};
pub use error::{DeviceError, Result};
pub use gesture::{EdgeLatch, GestureDetector, GestureSignal};
pub use traits::{
    ButtonSource, ChatBot, FeedbackLamp, FeedbackPattern, NoopBot, NoopButton, NoopFrontend,
    NoopLamp, NoopProvisioner, Provisioner, WebFrontend,
};
