//! `adbpilot doctor` — Diagnose system health.

use adbpilot_config::AppConfig;
use adbpilot_core::provider::Provider;
use adbpilot_device::AdbBridge;
use tracing::{debug, info};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 AdbPilot Doctor — System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    // Check config
    let config_path = AppConfig::config_path();
    if !config_path.exists() {
        println!("  ⚠️  No config file — using defaults (run `adbpilot onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid (provider: {}, model: {})", config.provider, config.model);
            config
        }
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            println!("\n  ⚠️  Fix the config file and re-run doctor.");
            return Ok(());
        }
    };

    // Check API key
    if config.has_api_key() || config.provider == "ollama" {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured — set GEMINI_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    // Check adb
    let bridge = AdbBridge::from_config(&config);
    match bridge.adb_path() {
        Ok(path) => {
            println!("  ✅ adb found at {}", path.display());
            match bridge.list_devices().await {
                Ok(devices) if devices.iter().any(|d| d.status == "device") => {
                    println!("  ✅ {} device(s) attached", devices.len());
                }
                Ok(_) => {
                    println!("  ⚠️  No ready device — connect one or start an emulator");
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ `adb devices` failed: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Check provider
    debug!(provider = %config.provider, "Checking provider health");
    match adbpilot_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider reachable ({})", provider.base_url()),
            Ok(false) => {
                println!("  ⚠️  Provider answered with an error ({})", provider.base_url());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Summary
    info!(issues, "Doctor finished");
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
