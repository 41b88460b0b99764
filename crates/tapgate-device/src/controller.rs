//! Cooperative controller loop.
//!
//! One task owns the whole device and services every input source in a
//! strict per-tick order:
//!
//! 1. Gestures: evaluate the hold level and any pending tap edges; a
//!    raised signal hands control to the provisioning portal.
//! 2. Web frontend: accept and dispatch at most one pending request.
//! 3. Chat bot: the online announce, then one best-effort poll.
//! 4. Queued admin-command snapshots are published.
//! 5. Reader: one bounded poll for a tag, coalescing, the access
//!    decision, lamp feedback, broadcast and notification.
//! 6. A fixed sleep to bound the loop rate.
//!
//! Every blocking call inside a tick carries a bounded timeout, so no
//! single source can stall the others; the provisioning portal is the
//! one deliberate exception, entered only on an operator gesture with
//! edge capture detached first. [`Controller::run`] wraps the tick in
//! a supervisor that logs failures, backs off briefly and keeps going
//! until the [`StopHandle`] is raised.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tapgate_core::constants::COALESCE_REST_MS;
use tapgate_core::{AccessDecision, Card, EventSource, Uid};
use tapgate_reader::{Pn532, ReaderBus};
use tapgate_store::AccessStore;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

use crate::broadcast::{EventBroadcaster, Snapshot, SnapshotSink};
use crate::clock::Clock;
use crate::commands::{self, AdminCommand, CommandOutcome};
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::gesture::{GestureDetector, GestureSignal};
use crate::traits::{ButtonSource, ChatBot, FeedbackLamp, FeedbackPattern, Provisioner, WebFrontend};

/// Cloneable stop flag for the controller loop.
///
/// Raised from any task (a signal handler, a test); the loop notices
/// at the next tick boundary and shuts down cleanly.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Ask the controller loop to exit after the current tick.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Latest-tap slot, sequence counter and announce bookkeeping.
///
/// This is the single current-state record behind every snapshot;
/// there is no event history on the device.
#[derive(Debug, Default)]
struct DeviceState {
    seq: u64,
    firmware: String,
    last_uid: Option<Uid>,
    last_tap_ms: Option<u64>,
    last_access: String,
    last_name: String,
    announced: bool,
    last_announce_ms: Option<u64>,
}

impl DeviceState {
    fn snapshot(
        &self,
        cards: Vec<Card>,
        src: EventSource,
        ok: Option<bool>,
        msg: Option<String>,
    ) -> Snapshot {
        Snapshot {
            id: self.seq,
            fw: self.firmware.clone(),
            uid: self
                .last_uid
                .as_ref()
                .map(Uid::to_hex)
                .unwrap_or_default(),
            access: self.last_access.clone(),
            name: self.last_name.clone(),
            cards,
            src,
            ok,
            msg,
            at: Utc::now(),
        }
    }
}

/// Admin-command outcome waiting to go out as a `cmd` snapshot.
#[derive(Debug, Clone)]
struct PendingUpdate {
    ok: bool,
    msg: String,
}

/// Per-tick window onto the device, handed to frontends and tests.
///
/// Scoped to one dispatch: commands mutate the store immediately, and
/// every mutating command queues a `cmd` snapshot that the controller
/// publishes at the end of the collaborator step of the same tick.
pub struct DeviceApi<'a> {
    store: &'a mut AccessStore,
    broadcaster: &'a mut EventBroadcaster,
    state: &'a DeviceState,
    pending: &'a mut Vec<PendingUpdate>,
    device_name: &'a str,
}

impl DeviceApi<'_> {
    /// Execute one admin command against the allow list.
    pub fn execute(&mut self, command: AdminCommand) -> CommandOutcome {
        run_admin(
            self.store,
            self.state.last_uid.as_ref(),
            self.pending,
            command,
        )
    }

    /// Attach `sink` as the live subscriber, replacing any current one,
    /// and replay the current state to it as an `init` snapshot.
    ///
    /// The replay re-emits the current sequence id without advancing
    /// it; the first real event the subscriber sees will carry the next
    /// id.
    pub fn subscribe(&mut self, sink: Box<dyn SnapshotSink + Send>) {
        self.broadcaster.replace(sink);
        let snapshot = self
            .state
            .snapshot(self.store.cards(), EventSource::Init, None, None);
        self.broadcaster.publish(&snapshot);
    }

    /// Current state as a one-shot snapshot (for plain status requests).
    pub fn snapshot(&self) -> Snapshot {
        self.state
            .snapshot(self.store.cards(), EventSource::Init, None, None)
    }

    /// The allow list, sorted by hex UID.
    pub fn cards(&self) -> Vec<Card> {
        self.store.cards()
    }

    /// Configured device name.
    pub fn device_name(&self) -> &str {
        self.device_name
    }
}

/// The cooperative scheduler tying reader, store, gestures, broadcast
/// and the external collaborators together.
///
/// Generic over the bus and every collaborator seam so deployments mix
/// real hardware, network stacks, emulator parts and test doubles
/// freely. The controller owns all of them; nothing here is shared or
/// locked — the button edge latch is the single cross-context cell.
pub struct Controller<B, F, P, C, L, S> {
    config: DeviceConfig,
    driver: Pn532<B>,
    store: AccessStore,
    clock: Clock,
    frontend: F,
    provisioner: P,
    bot: C,
    lamp: L,
    button: S,
    detector: GestureDetector,
    broadcaster: EventBroadcaster,
    state: DeviceState,
    pending: Vec<PendingUpdate>,
    stop: StopHandle,
}

impl<B, F, P, C, L, S> Controller<B, F, P, C, L, S>
where
    B: ReaderBus,
    F: WebFrontend,
    P: Provisioner,
    C: ChatBot,
    L: FeedbackLamp,
    S: ButtonSource,
{
    /// Assemble a controller from its parts. Call
    /// [`Controller::initialize`] before the first tick.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DeviceConfig,
        driver: Pn532<B>,
        store: AccessStore,
        clock: Clock,
        frontend: F,
        provisioner: P,
        bot: C,
        lamp: L,
        button: S,
    ) -> Self {
        let detector = GestureDetector::new(config.gesture.clone());
        Self {
            config,
            driver,
            store,
            clock,
            frontend,
            provisioner,
            bot,
            lamp,
            button,
            detector,
            broadcaster: EventBroadcaster::new(),
            state: DeviceState::default(),
            pending: Vec::new(),
            stop: StopHandle::default(),
        }
    }

    /// Handle used to stop the loop from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Per-tick device API, also usable directly for wiring and tests.
    pub fn api(&mut self) -> DeviceApi<'_> {
        DeviceApi {
            store: &mut self.store,
            broadcaster: &mut self.broadcaster,
            state: &self.state,
            pending: &mut self.pending,
            device_name: self.config.device_name.as_str(),
        }
    }

    /// The allow list backing this controller.
    pub fn store(&self) -> &AccessStore {
        &self.store
    }

    /// Current event sequence id.
    pub fn sequence(&self) -> u64 {
        self.state.seq
    }

    /// Firmware string reported in snapshots, empty before
    /// [`Controller::initialize`].
    pub fn firmware(&self) -> &str {
        &self.state.firmware
    }

    /// Bring the reader up and arm the button.
    ///
    /// Queries the firmware identification (which doubles as the bus
    /// smoke test), configures the SAM for card reading and attaches
    /// the edge latch to the button source.
    ///
    /// # Errors
    ///
    /// Returns the reader error when the chip does not answer; the
    /// device cannot run without the reader.
    pub async fn initialize(&mut self) -> Result<()> {
        let version = self.driver.firmware_version().await?;
        self.state.firmware = format!("PN532 {version}");
        self.driver.configure().await?;
        self.button.attach(self.detector.latch());
        info!(
            firmware = %self.state.firmware,
            cards = self.store.len(),
            "device ready"
        );
        Ok(())
    }

    /// Run the supervised tick loop until the stop flag is raised.
    ///
    /// A failed tick is logged and followed by a short backoff; the
    /// loop itself never gives up. On exit the listener, subscriber
    /// and button are released.
    pub async fn run(&mut self) {
        info!(device = %self.config.device_name, "controller running");
        while !self.stop.is_stopped() {
            if let Err(error) = self.tick().await {
                error!(%error, "tick failed");
                sleep(Duration::from_millis(self.config.error_backoff_ms)).await;
            }
        }
        self.frontend.shutdown_listener();
        self.broadcaster.close();
        self.button.detach();
        info!("controller stopped");
    }

    /// One scheduler iteration. See the module docs for the step order.
    ///
    /// # Errors
    ///
    /// Returns frontend dispatch and listener rebuild failures; the
    /// reader, lamp and bot absorb their own trouble.
    pub async fn tick(&mut self) -> Result<()> {
        let now_ms = self.clock.now_ms();

        self.gesture_step(now_ms).await?;
        self.frontend_step().await?;
        self.announce_step(now_ms).await;
        self.chat_step().await;
        self.publish_pending();
        self.reader_step(now_ms).await;

        sleep(Duration::from_millis(self.config.loop_sleep_ms)).await;
        Ok(())
    }

    /// Poll the gesture detector and run the provisioning hand-off if
    /// it raised a signal.
    async fn gesture_step(&mut self, now_ms: u64) -> Result<()> {
        let pressed = self.button.is_pressed();
        match self.detector.poll(now_ms, pressed) {
            Some(signal) => self.enter_provisioning(signal).await,
            None => Ok(()),
        }
    }

    /// Hand the device to the provisioning portal and restore normal
    /// operation afterwards.
    ///
    /// Edge capture is detached and the listener and subscriber are
    /// closed before the portal runs, so nothing re-enters the
    /// controller while it blocks. The button is re-armed and the
    /// signal acknowledged even when the portal or the listener
    /// rebuild fail — gestures must keep working so the operator can
    /// try again.
    async fn enter_provisioning(&mut self, signal: GestureSignal) -> Result<()> {
        info!(?signal, "provisioning hand-off");
        self.button.detach();
        self.frontend.shutdown_listener();
        self.broadcaster.close();

        if signal == GestureSignal::HardReset {
            if let Err(error) = self.provisioner.clear_credentials().await {
                warn!(%error, "credential clear failed");
            }
        }
        if let Err(error) = self.provisioner.run_portal().await {
            error!(%error, "provisioning portal failed");
        }

        let rebuilt = self.frontend.rebuild_listener().await;
        self.button.attach(self.detector.latch());
        self.detector.acknowledge();
        info!("provisioning hand-off complete");
        rebuilt
    }

    /// Accept and dispatch at most one pending web request.
    async fn frontend_step(&mut self) -> Result<()> {
        let Self {
            frontend,
            store,
            broadcaster,
            state,
            pending,
            config,
            ..
        } = self;
        let Some(conn) = frontend.try_accept() else {
            return Ok(());
        };
        let api = DeviceApi {
            store,
            broadcaster,
            state,
            pending,
            device_name: config.device_name.as_str(),
        };
        frontend.dispatch(conn, api).await
    }

    /// Send the one-shot online announcement, retrying on a timer
    /// until the bot reports it delivered.
    async fn announce_step(&mut self, now_ms: u64) {
        if self.state.announced {
            return;
        }
        if let Some(at) = self.state.last_announce_ms {
            if now_ms.saturating_sub(at) < self.config.announce_retry_ms {
                return;
            }
        }
        self.state.last_announce_ms = Some(now_ms);
        if self
            .bot
            .announce_online(&self.config.device_name, &self.state.firmware)
            .await
        {
            self.state.announced = true;
            info!("online announce delivered");
        } else {
            debug!("online announce not delivered yet");
        }
    }

    /// One best-effort chat poll; replies come from [`chat_command`].
    async fn chat_step(&mut self) {
        let Self {
            bot,
            store,
            state,
            pending,
            config,
            ..
        } = self;
        let device_name = config.device_name.as_str();
        let result = bot
            .tick(|text| chat_command(text, store, state, pending, device_name))
            .await;
        if let Err(error) = result {
            debug!(%error, "chat poll failed");
        }
    }

    /// Publish queued admin-command outcomes, one snapshot each.
    fn publish_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        for update in std::mem::take(&mut self.pending) {
            self.state.seq += 1;
            let snapshot = self.snapshot(EventSource::Command, Some(update.ok), Some(update.msg));
            self.broadcaster.publish(&snapshot);
        }
    }

    /// One bounded reader poll.
    async fn reader_step(&mut self, now_ms: u64) {
        let poll_timeout = Duration::from_millis(self.config.poll_timeout_ms);
        if let Some(uid) = self.driver.read_uid(poll_timeout).await {
            self.handle_tap(uid, now_ms).await;
        }
    }

    /// Decide, record and broadcast one tag read.
    async fn handle_tap(&mut self, uid: Uid, now_ms: u64) {
        if let (Some(last), Some(at)) = (&self.state.last_uid, self.state.last_tap_ms) {
            if *last == uid && now_ms.saturating_sub(at) < self.config.coalesce_window_ms {
                // Tag still on the reader: same tap, keep the window
                // open and ease off the bus for a moment.
                self.state.last_tap_ms = Some(now_ms);
                sleep(Duration::from_millis(COALESCE_REST_MS)).await;
                return;
            }
        }

        self.lamp.signal(FeedbackPattern::Read).await;

        let hex = uid.to_hex();
        let name = self.store.name_of(&uid).unwrap_or_default().to_string();
        let decision = AccessDecision::from_allowed(self.store.check(&uid));

        self.state.last_uid = Some(uid);
        self.state.last_tap_ms = Some(now_ms);
        self.state.last_access = decision.as_str().to_string();
        self.state.last_name = name;
        self.state.seq += 1;
        info!(
            uid = %hex,
            %decision,
            name = %self.state.last_name,
            seq = self.state.seq,
            "tap"
        );

        let pattern = if decision.is_granted() {
            FeedbackPattern::Granted
        } else {
            FeedbackPattern::Denied
        };
        self.lamp.signal(pattern).await;

        let snapshot = self.snapshot(EventSource::Nfc, None, None);
        self.broadcaster.publish(&snapshot);

        if self.config.notify_on_tap {
            if let Err(error) = self
                .bot
                .notify_tap(&hex, decision, &self.config.device_name)
                .await
            {
                debug!(%error, "tap notification failed");
            }
        }
    }

    fn snapshot(&self, src: EventSource, ok: Option<bool>, msg: Option<String>) -> Snapshot {
        self.state.snapshot(self.store.cards(), src, ok, msg)
    }
}

/// Run one admin command; mutating commands queue a `cmd` snapshot
/// carrying their outcome, whether they succeeded or not.
fn run_admin(
    store: &mut AccessStore,
    last_uid: Option<&Uid>,
    pending: &mut Vec<PendingUpdate>,
    command: AdminCommand,
) -> CommandOutcome {
    let mutates = command.mutates();
    let outcome = commands::execute(store, last_uid, command);
    if mutates {
        pending.push(PendingUpdate {
            ok: outcome.ok,
            msg: outcome.msg.clone(),
        });
    }
    outcome
}

/// Map one inbound chat message to its reply.
///
/// `None` means the text is not addressed to the device; the bot sends
/// nothing back.
fn chat_command(
    text: &str,
    store: &mut AccessStore,
    state: &DeviceState,
    pending: &mut Vec<PendingUpdate>,
    device_name: &str,
) -> Option<String> {
    match text.trim() {
        "/start" | "/help" => Some(format!("{device_name} NFC bot\n/last\n/add_last\n/help")),
        "/last" => Some(match &state.last_uid {
            Some(uid) => format!(
                "LAST UID: {}\nName: {}\nAccess: {}",
                uid.to_hex(),
                or_dash(&state.last_name),
                or_dash(&state.last_access),
            ),
            None => "No taps yet".to_string(),
        }),
        "/add_last" => {
            if state.last_uid.is_none() {
                return Some("No last UID (tap a card first)".to_string());
            }
            let outcome = run_admin(
                store,
                state.last_uid.as_ref(),
                pending,
                AdminCommand::AddLast {
                    name: String::new(),
                },
            );
            let prefix = if outcome.ok { "OK" } else { "ERR" };
            Some(format!("{prefix}: {}", outcome.msg))
        }
        _ => None,
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
