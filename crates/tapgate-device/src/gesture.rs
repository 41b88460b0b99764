//! Button gesture detection: multi-tap and hold.
//!
//! Detection is split across the two execution contexts the button
//! lives in:
//!
//! - [`EdgeLatch`] is the interrupt half. An edge callback calls
//!   [`EdgeLatch::record_edge`], which debounces against the last
//!   accepted edge and bumps a pending counter. Atomics only — no
//!   allocation, no locks, no I/O.
//! - [`GestureDetector`] is the tick half. The controller drains the
//!   latch once per tick and advances the tap state machine
//!   (idle / counting / suspended), and tracks the hold gesture from
//!   the polled button level.
//!
//! Reaching the tap target raises [`GestureSignal::ModeSwitch`] and
//! suspends the latch so edges during the provisioning hand-off are
//! ignored until the controller acknowledges the signal. A continuous
//! hold past the clear threshold raises [`GestureSignal::HardReset`]
//! exactly once per press.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tracing::debug;

use crate::config::GestureConfig;

/// Sentinel for "no edge accepted yet".
const NO_EDGE: u64 = u64::MAX;

/// Gestures the detector can raise, at most one per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureSignal {
    /// Tap target reached: switch into provisioning mode.
    ModeSwitch,
    /// Hold threshold reached: clear stored network credentials, then
    /// switch into provisioning mode.
    HardReset,
}

/// Interrupt-side edge capture.
///
/// One writer (the edge interrupt) and one consumer (the controller
/// tick). `record_edge` is the only method meant for interrupt
/// context; it performs a timestamp compare and two atomic writes,
/// nothing else. The non-atomic read/store pair on the last-edge
/// timestamp is sound under the single-writer contract.
#[derive(Debug)]
pub struct EdgeLatch {
    debounce_ms: u64,
    pending: AtomicU32,
    last_edge_ms: AtomicU64,
    suspended: AtomicBool,
}

impl EdgeLatch {
    fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            pending: AtomicU32::new(0),
            last_edge_ms: AtomicU64::new(NO_EDGE),
            suspended: AtomicBool::new(false),
        }
    }

    /// Record a button edge observed at `now_ms`.
    ///
    /// Returns `true` when the edge was accepted, `false` when it was
    /// discarded as contact chatter or because the latch is suspended.
    pub fn record_edge(&self, now_ms: u64) -> bool {
        if self.suspended.load(Ordering::Acquire) {
            return false;
        }
        let last = self.last_edge_ms.load(Ordering::Acquire);
        if last != NO_EDGE && now_ms.saturating_sub(last) < self.debounce_ms {
            return false;
        }
        self.last_edge_ms.store(now_ms, Ordering::Release);
        self.pending.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Drain the accepted-edge counter.
    pub fn take_pending(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }

    /// Whether the latch is currently discarding edges.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }
}

/// Tap state advanced on the controller tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapState {
    /// No tap sequence in progress.
    Idle,
    /// Counting taps inside an open window.
    Counting { window_start_ms: u64, count: u32 },
    /// Mode switch raised; waiting for the controller to acknowledge.
    Suspended,
}

/// Tick-side gesture state machine.
///
/// Owns the [`EdgeLatch`] handed to the button interrupt and converts
/// drained edges plus the polled button level into gesture signals.
/// All transitions happen inside [`GestureDetector::poll`], never in
/// interrupt context.
#[derive(Debug)]
pub struct GestureDetector {
    config: GestureConfig,
    latch: Arc<EdgeLatch>,
    state: TapState,
    hold_start_ms: Option<u64>,
    hold_fired: bool,
}

impl GestureDetector {
    /// Create a detector with the given thresholds.
    pub fn new(config: GestureConfig) -> Self {
        let latch = Arc::new(EdgeLatch::new(config.debounce_ms));
        Self {
            config,
            latch,
            state: TapState::Idle,
            hold_start_ms: None,
            hold_fired: false,
        }
    }

    /// The latch to hand to the button edge interrupt.
    pub fn latch(&self) -> Arc<EdgeLatch> {
        Arc::clone(&self.latch)
    }

    /// Advance the state machine one tick.
    ///
    /// `pressed` is the button level at tick time; pending edges are
    /// drained from the latch. Returns at most one signal. After a
    /// signal the detector stays suspended — further edges and holds
    /// are ignored — until [`GestureDetector::acknowledge`].
    pub fn poll(&mut self, now_ms: u64, pressed: bool) -> Option<GestureSignal> {
        if self.state == TapState::Suspended {
            // Swallow anything latched between the trigger and the ack.
            self.latch.take_pending();
            return None;
        }

        if let Some(signal) = self.track_hold(now_ms, pressed) {
            self.suspend();
            return Some(signal);
        }

        let edges = self.latch.take_pending();
        for _ in 0..edges {
            if let Some(signal) = self.apply_edge(now_ms) {
                self.suspend();
                return Some(signal);
            }
        }
        None
    }

    /// Acknowledge a raised signal and re-arm edge capture.
    ///
    /// Called by the controller once the provisioning hand-off is over.
    /// The hold tracker is left alone so a button still held from the
    /// triggering press cannot fire again before it is released.
    pub fn acknowledge(&mut self) {
        self.state = TapState::Idle;
        self.latch.take_pending();
        self.latch.set_suspended(false);
    }

    /// Taps counted in the currently open window.
    pub fn tap_count(&self) -> u32 {
        match self.state {
            TapState::Counting { count, .. } => count,
            _ => 0,
        }
    }

    /// Whether a raised signal is still waiting for acknowledgement.
    pub fn is_suspended(&self) -> bool {
        self.state == TapState::Suspended
    }

    fn suspend(&mut self) {
        self.state = TapState::Suspended;
        self.latch.set_suspended(true);
    }

    fn track_hold(&mut self, now_ms: u64, pressed: bool) -> Option<GestureSignal> {
        if !pressed {
            self.hold_start_ms = None;
            self.hold_fired = false;
            return None;
        }
        let start = *self.hold_start_ms.get_or_insert(now_ms);
        if !self.hold_fired && now_ms.saturating_sub(start) >= self.config.hold_clear_ms {
            self.hold_fired = true;
            debug!(held_ms = now_ms.saturating_sub(start), "hold threshold reached");
            return Some(GestureSignal::HardReset);
        }
        None
    }

    fn apply_edge(&mut self, now_ms: u64) -> Option<GestureSignal> {
        match &mut self.state {
            TapState::Idle => {
                self.state = TapState::Counting {
                    window_start_ms: now_ms,
                    count: 1,
                };
            }
            TapState::Counting {
                window_start_ms,
                count,
            } => {
                // Strict comparison: an edge landing exactly on the
                // window boundary still belongs to the open window.
                if now_ms.saturating_sub(*window_start_ms) > self.config.press_window_ms {
                    debug!("tap window expired, restarting count");
                    *window_start_ms = now_ms;
                    *count = 1;
                } else {
                    *count += 1;
                }
            }
            TapState::Suspended => return None,
        }

        if let TapState::Counting { count, .. } = self.state {
            debug!(tap = count, target = self.config.press_target, "button tap");
            if count >= self.config.press_target {
                return Some(GestureSignal::ModeSwitch);
            }
        }
        None
    }
}
