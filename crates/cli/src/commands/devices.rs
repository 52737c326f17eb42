//! `adbpilot devices` — List attached devices.

use adbpilot_config::AppConfig;
use adbpilot_device::AdbBridge;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let bridge = AdbBridge::from_config(&config);
    let adb = bridge.adb_path()?;

    println!("📱 Attached devices ({})", adb.display());
    println!("─────────────────────────────────────");

    let devices = bridge.list_devices().await?;
    if devices.is_empty() {
        println!("  (none) — connect a device or start an emulator");
        return Ok(());
    }

    for device in &devices {
        let kind = if device.is_emulator { "emulator" } else { "physical" };
        println!("  {}  [{}] {kind}", device.id, device.status);
        match (&device.details, &device.details_error) {
            (Some(d), _) => println!(
                "      {} · Android {} · serial {}",
                d.model, d.android_version, d.serial
            ),
            (None, Some(err)) => println!("      details unavailable: {err}"),
            (None, None) => {}
        }
    }

    Ok(())
}
