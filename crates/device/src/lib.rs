//! ADB device bridge for AdbPilot.
//!
//! [`AdbBridge`] implements `adbpilot_core::DeviceCapability` by spawning
//! the `adb` executable for each action.

pub mod bridge;
pub mod devices;
pub mod input;
pub mod screenshot;

pub use bridge::{AdbBridge, CommandOutput};
pub use devices::{DeviceDetails, DeviceEntry, DeviceInfo};
pub use screenshot::ScreenshotStore;
