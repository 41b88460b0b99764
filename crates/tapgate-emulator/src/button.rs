//! Emulated mode button.
//!
//! [`VirtualButton`] stands in for the GPIO button: the controller
//! attaches an edge latch to it and polls its level, while
//! [`VirtualButtonHandle`] plays the finger. Pressing records an edge
//! into the attached latch exactly the way a GPIO interrupt would, and
//! the level stays high until released so hold gestures work too.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tapgate_device::{ButtonSource, EdgeLatch};

#[derive(Debug, Default)]
struct ButtonShared {
    pressed: AtomicBool,
    latch: Mutex<Option<Arc<EdgeLatch>>>,
}

fn latch_slot(shared: &ButtonShared) -> MutexGuard<'_, Option<Arc<EdgeLatch>>> {
    shared
        .latch
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process stand-in for the mode button.
#[derive(Debug)]
pub struct VirtualButton {
    shared: Arc<ButtonShared>,
}

impl VirtualButton {
    /// Create a released button with no latch attached.
    ///
    /// Returns the button (to hand to the controller) and the handle
    /// that presses it from the outside.
    pub fn new() -> (Self, VirtualButtonHandle) {
        let shared = Arc::new(ButtonShared::default());
        let button = Self {
            shared: Arc::clone(&shared),
        };
        (button, VirtualButtonHandle { shared })
    }
}

impl ButtonSource for VirtualButton {
    fn attach(&mut self, latch: Arc<EdgeLatch>) {
        *latch_slot(&self.shared) = Some(latch);
    }

    fn detach(&mut self) {
        *latch_slot(&self.shared) = None;
    }

    fn is_pressed(&self) -> bool {
        self.shared.pressed.load(Ordering::Acquire)
    }
}

/// Control handle for a [`VirtualButton`].
#[derive(Debug, Clone)]
pub struct VirtualButtonHandle {
    shared: Arc<ButtonShared>,
}

impl VirtualButtonHandle {
    /// Press the button at `now_ms`: raise the level and deliver one
    /// edge into the attached latch.
    ///
    /// Returns `true` when the edge was accepted, `false` when it was
    /// debounced away, the latch is suspended, or no latch is attached.
    pub fn press(&self, now_ms: u64) -> bool {
        self.shared.pressed.store(true, Ordering::Release);
        match latch_slot(&self.shared).as_ref() {
            Some(latch) => latch.record_edge(now_ms),
            None => false,
        }
    }

    /// Release the button.
    pub fn release(&self) {
        self.shared.pressed.store(false, Ordering::Release);
    }

    /// One full tap: press at `now_ms` and release immediately.
    pub fn tap(&self, now_ms: u64) -> bool {
        let accepted = self.press(now_ms);
        self.release();
        accepted
    }

    /// Whether the controller currently has a latch attached.
    pub fn is_attached(&self) -> bool {
        latch_slot(&self.shared).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapgate_device::{GestureConfig, GestureDetector, GestureSignal};

    fn attached() -> (VirtualButton, VirtualButtonHandle, GestureDetector) {
        let (mut button, handle) = VirtualButton::new();
        let detector = GestureDetector::new(GestureConfig::default());
        button.attach(detector.latch());
        (button, handle, detector)
    }

    #[test]
    fn test_press_without_latch_reports_nothing() {
        let (button, handle) = VirtualButton::new();

        assert!(!handle.press(0));
        assert!(button.is_pressed());
        assert!(!handle.is_attached());
    }

    #[test]
    fn test_press_delivers_edge_into_latch() {
        let (_button, handle, mut detector) = attached();

        assert!(handle.press(1000));

        detector.poll(1000, true);
        assert_eq!(detector.tap_count(), 1);
    }

    #[test]
    fn test_level_follows_press_and_release() {
        let (button, handle, _detector) = attached();

        handle.press(0);
        assert!(button.is_pressed());

        handle.release();
        assert!(!button.is_pressed());
    }

    #[test]
    fn test_taps_drive_the_detector_to_mode_switch() {
        let (_button, handle, mut detector) = attached();

        for i in 0..6 {
            assert!(handle.tap(i * 1000));
            assert_eq!(detector.poll(i * 1000, false), None);
        }
        assert!(handle.tap(6000));

        assert_eq!(detector.poll(6000, false), Some(GestureSignal::ModeSwitch));
    }

    #[test]
    fn test_detached_button_delivers_no_edges() {
        let (mut button, handle, mut detector) = attached();
        button.detach();

        assert!(!handle.tap(1000));

        assert_eq!(detector.poll(1000, false), None);
        assert_eq!(detector.tap_count(), 0);
    }

    #[test]
    fn test_rapid_presses_are_debounced_by_the_latch() {
        let (_button, handle, mut detector) = attached();

        assert!(handle.tap(1000));
        assert!(!handle.tap(1050));
        assert!(!handle.tap(1100));
        assert!(handle.tap(1200));

        detector.poll(1200, false);
        assert_eq!(detector.tap_count(), 2);
    }
}
