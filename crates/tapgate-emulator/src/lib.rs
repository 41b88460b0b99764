//! In-process emulation of the tapgate hardware.
//!
//! This crate stands in for the physical peripherals so the full
//! firmware stack (driver, controller, gestures) runs unmodified on a
//! development machine: [`VirtualChip`] emulates the reader chip at the
//! link level and [`VirtualButton`] emulates the mode button. Each
//! comes with a handle that plays the physical world — presenting
//! tags, pressing the button, injecting bus noise.

pub mod button;
pub mod chip;

pub use button::{VirtualButton, VirtualButtonHandle};
pub use chip::{VirtualChip, VirtualChipHandle};
