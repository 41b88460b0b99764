//! Collaborator traits for the surfaces around the controller.
//!
//! The controller owns the tick loop; everything it talks to — the web
//! frontend, the provisioning portal, the chat bot, the feedback lamp
//! and the mode button — sits behind one of these traits so hardware,
//! network stacks and test doubles slot in interchangeably.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024
//! RPITIT), eliminating the need for the `async_trait` macro.
//!
//! # Object Safety and Dynamic Dispatch
//!
//! **NOTE**: The async traits here are NOT object-safe because
//! `async fn` methods return `impl Future`, which cannot be used in
//! trait objects. The controller takes them as generic parameters.

#![allow(async_fn_in_trait)]

use std::convert::Infallible;
use std::sync::Arc;

use tapgate_core::AccessDecision;

use crate::controller::DeviceApi;
use crate::error::Result;
use crate::gesture::EdgeLatch;

/// Web management surface.
///
/// The controller polls for one pending request per tick and hands it
/// back together with a [`DeviceApi`] scoped to that tick. Around the
/// provisioning portal the listener is torn down and rebuilt so the
/// portal can own the network interface.
pub trait WebFrontend: Send + Sync {
    /// One accepted request, fed back into [`WebFrontend::dispatch`].
    type Conn;

    /// Poll for one pending request without blocking.
    ///
    /// Accept-level trouble is the frontend's own business to log and
    /// absorb; the controller only sees requests that made it in.
    fn try_accept(&mut self) -> Option<Self::Conn>;

    /// Serve one request against the device.
    ///
    /// # Errors
    ///
    /// Returns an error when the response cannot be delivered; the
    /// controller logs it and keeps ticking.
    async fn dispatch(&mut self, conn: Self::Conn, api: DeviceApi<'_>) -> Result<()>;

    /// Stop accepting requests and drop the listener.
    fn shutdown_listener(&mut self);

    /// Recreate the listener after it was shut down.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot be re-bound; the
    /// management surface stays down until the supervisor retries.
    async fn rebuild_listener(&mut self) -> Result<()>;
}

/// Network provisioning portal, entered on the mode-switch gesture.
pub trait Provisioner: Send + Sync {
    /// Run the portal until the operator finishes or it times out.
    ///
    /// This is the one intentionally blocking call in the system: the
    /// tick loop does not run while the portal is up.
    ///
    /// # Errors
    ///
    /// Returns an error when the portal cannot start or aborts; the
    /// device resumes normal operation either way.
    async fn run_portal(&mut self) -> Result<()>;

    /// Erase stored network credentials (hard-reset gesture).
    ///
    /// # Errors
    ///
    /// Returns an error when the credential store cannot be cleared.
    async fn clear_credentials(&mut self) -> Result<()>;
}

/// Chat-bot channel for operator notifications and remote commands.
pub trait ChatBot: Send + Sync {
    /// Poll for inbound messages once, best-effort.
    ///
    /// `handler` maps each message text to a reply; `None` means the
    /// text is not addressed to the device and gets no answer.
    ///
    /// # Errors
    ///
    /// Returns an error on transport trouble; the controller logs it
    /// and tries again next tick.
    async fn tick<H>(&mut self, handler: H) -> Result<()>
    where
        H: FnMut(&str) -> Option<String>;

    /// Push a tap notification to the operator channel.
    ///
    /// # Errors
    ///
    /// Returns an error on transport trouble; notifications are
    /// fire-and-forget and never block access decisions.
    async fn notify_tap(
        &mut self,
        uid_hex: &str,
        decision: AccessDecision,
        device_name: &str,
    ) -> Result<()>;

    /// Announce that the device came online.
    ///
    /// Returns whether the announcement got through; the controller
    /// keeps retrying on a timer until it does.
    async fn announce_online(&mut self, device_name: &str, firmware: &str) -> bool;
}

/// Visual feedback patterns for the three tap outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackPattern {
    /// Short blue flash: a tag was read, decision pending.
    Read,
    /// Slow green breathe: access granted.
    Granted,
    /// Fast red blink: access denied.
    Denied,
}

/// Status lamp next to the reader.
pub trait FeedbackLamp: Send + Sync {
    /// Play one pattern to completion.
    ///
    /// Lamp trouble is invisible by contract: implementations absorb
    /// their own failures rather than stall the tick.
    async fn signal(&mut self, pattern: FeedbackPattern);
}

/// Mode button delivering edge interrupts and a pressed level.
pub trait ButtonSource: Send + Sync {
    /// Start delivering press edges into `latch`.
    fn attach(&mut self, latch: Arc<EdgeLatch>);

    /// Stop delivering press edges (around the provisioning portal).
    fn detach(&mut self);

    /// Current button level, polled for hold tracking.
    fn is_pressed(&self) -> bool;
}

/// Frontend that never accepts a request, for headless deployments
/// and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFrontend;

impl WebFrontend for NoopFrontend {
    type Conn = Infallible;

    fn try_accept(&mut self) -> Option<Self::Conn> {
        None
    }

    async fn dispatch(&mut self, conn: Self::Conn, _api: DeviceApi<'_>) -> Result<()> {
        match conn {}
    }

    fn shutdown_listener(&mut self) {}

    async fn rebuild_listener(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Provisioner whose portal returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvisioner;

impl Provisioner for NoopProvisioner {
    async fn run_portal(&mut self) -> Result<()> {
        Ok(())
    }

    async fn clear_credentials(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Chat bot that drops everything and reports the announce as sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBot;

impl ChatBot for NoopBot {
    async fn tick<H>(&mut self, _handler: H) -> Result<()>
    where
        H: FnMut(&str) -> Option<String>,
    {
        Ok(())
    }

    async fn notify_tap(
        &mut self,
        _uid_hex: &str,
        _decision: AccessDecision,
        _device_name: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn announce_online(&mut self, _device_name: &str, _firmware: &str) -> bool {
        true
    }
}

/// Lamp that swallows every pattern.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLamp;

impl FeedbackLamp for NoopLamp {
    async fn signal(&mut self, _pattern: FeedbackPattern) {}
}

/// Button that is never pressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopButton;

impl ButtonSource for NoopButton {
    fn attach(&mut self, _latch: Arc<EdgeLatch>) {}

    fn detach(&mut self) {}

    fn is_pressed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_frontend_never_accepts() {
        let mut frontend = NoopFrontend;
        assert!(frontend.try_accept().is_none());
        frontend.shutdown_listener();
        assert!(frontend.rebuild_listener().await.is_ok());
    }

    #[tokio::test]
    async fn test_noop_bot_reports_announce_sent() {
        let mut bot = NoopBot;
        assert!(bot.announce_online("tapgate", "PN532 1.6").await);
        assert!(bot.tick(|_| None).await.is_ok());
        assert!(
            bot.notify_tap("04 AB", AccessDecision::Denied, "tapgate")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_noop_button_reads_released() {
        let button = NoopButton;
        assert!(!button.is_pressed());
    }
}
