//! The `adb` bridge — runs adb as a child process and implements every
//! catalog action against the attached device.
//!
//! Commands are spawned directly with `tokio::process::Command` (never via
//! a local shell) and bounded by a per-command timeout. A non-zero exit
//! status is reported as [`DeviceError::CommandFailed`] with stderr kept
//! verbatim.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use adbpilot_config::AppConfig;
use adbpilot_core::action::{ActionKind, SwipeParams, TapParams};
use adbpilot_core::device::{ActionPayload, DeviceCapability};
use adbpilot_core::error::DeviceError;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::devices::{self, DeviceDetails, DeviceInfo, EMULATOR_INDICATORS};
use crate::input;
use crate::screenshot::ScreenshotStore;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Raw result of one adb invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    fn into_checked(self) -> Result<Self, DeviceError> {
        if self.success() {
            Ok(self)
        } else {
            warn!(command = %self.command, exit_code = self.code, "adb command failed");
            Err(DeviceError::CommandFailed {
                command: self.command,
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }

    /// The JSON reported to the model for a successful input command.
    fn summary(&self) -> Value {
        let mut body = json!({ "command": self.command });
        let stdout = self.stdout_text();
        if !stdout.trim().is_empty() {
            body["stdout"] = Value::String(stdout.trim().to_string());
        }
        if !self.stderr.trim().is_empty() {
            body["stderr"] = Value::String(self.stderr.trim().to_string());
        }
        body
    }
}

/// Capability provider backed by the `adb` executable.
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb: Option<PathBuf>,
    serial: Option<String>,
    timeout: Duration,
    store: Option<ScreenshotStore>,
}

impl AdbBridge {
    /// Use an explicit adb path (`None` means adb could not be located).
    pub fn new(adb: Option<PathBuf>) -> Self {
        Self {
            adb,
            serial: None,
            timeout: Duration::from_secs(30),
            store: None,
        }
    }

    /// Locate adb on `PATH`.
    pub fn locate() -> Self {
        Self::new(which::which("adb").ok())
    }

    /// Build the bridge from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let device = &config.device;
        let bridge = match &device.adb_path {
            Some(path) => Self::new(Some(path.clone())),
            None => Self::locate(),
        };
        let bridge = bridge.with_timeout(Duration::from_secs(device.command_timeout_secs));
        let bridge = match &device.serial {
            Some(serial) => bridge.with_serial(serial.clone()),
            None => bridge,
        };
        if device.save_screenshots {
            bridge.with_screenshot_store(ScreenshotStore::new(config.screenshot_dir()))
        } else {
            bridge
        }
    }

    /// Target one device with `-s <serial>`.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Save every captured screen to the store.
    pub fn with_screenshot_store(mut self, store: ScreenshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// The resolved adb executable.
    pub fn adb_path(&self) -> Result<&Path, DeviceError> {
        match &self.adb {
            Some(path) if path.is_file() => Ok(path),
            Some(path) => Err(DeviceError::Unavailable(format!(
                "adb not found at {}",
                path.display()
            ))),
            None => Err(DeviceError::Unavailable("can't locate adb on PATH".into())),
        }
    }

    /// Run adb with `args`, targeting `device` (or the configured serial).
    ///
    /// The exit status is not checked.
    pub async fn exec(&self, device: Option<&str>, args: &[String]) -> Result<CommandOutput, DeviceError> {
        let adb = self.adb_path()?;

        let mut full_args: Vec<&str> = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = device.or(self.serial.as_deref()) {
            full_args.push("-s");
            full_args.push(serial);
        }
        full_args.extend(args.iter().map(String::as_str));
        let command = format!("adb {}", full_args.join(" "));

        debug!(command = %command, "Running adb");
        let started = Instant::now();

        let child = Command::new(adb)
            .args(&full_args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(DeviceError::Spawn {
                    command,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, "adb command timed out");
                return Err(DeviceError::Timeout {
                    command,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        debug!(
            command = %command,
            exit_code = output.status.code().unwrap_or(-1),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "adb finished"
        );

        Ok(CommandOutput {
            command,
            code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run adb and fail on a non-zero exit status.
    pub async fn run(&self, device: Option<&str>, args: &[&str]) -> Result<CommandOutput, DeviceError> {
        self.exec(device, &to_args(args)).await?.into_checked()
    }

    async fn getprop(&self, device_id: &str, prop: &str) -> Result<String, DeviceError> {
        let output = self.run(Some(device_id), &["shell", "getprop", prop]).await?;
        Ok(output.stdout_text().trim().to_string())
    }

    /// Every attached device with its emulator flag and details.
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let output = self.run(None, &["devices"]).await?;
        let entries = devices::parse_device_list(&output.stdout_text());

        let mut listed = Vec::with_capacity(entries.len());
        for entry in entries {
            let is_emulator = self.is_emulator(&entry.id).await;
            let (details, details_error) = match self.device_details(&entry.id).await {
                Ok(details) => (Some(details), None),
                Err(e) => (None, Some(e.to_string())),
            };
            listed.push(DeviceInfo {
                id: entry.id,
                status: entry.status,
                is_emulator,
                details,
                details_error,
            });
        }
        Ok(listed)
    }

    /// Whether `device_id` is an emulator, from its id or system properties.
    ///
    /// Properties that cannot be read count as "no match".
    pub async fn is_emulator(&self, device_id: &str) -> bool {
        if devices::id_looks_like_emulator(device_id) {
            return true;
        }
        for (prop, check) in EMULATOR_INDICATORS {
            if let Ok(value) = self.getprop(device_id, prop).await {
                if check.matches(&value) {
                    debug!(device = %device_id, prop, "Emulator indicator matched");
                    return true;
                }
            }
        }
        false
    }

    /// Model, Android version and serial number of one device.
    pub async fn device_details(&self, device_id: &str) -> Result<DeviceDetails, DeviceError> {
        Ok(DeviceDetails {
            model: self.getprop(device_id, "ro.product.model").await?,
            android_version: self.getprop(device_id, "ro.build.version.release").await?,
            serial: self.getprop(device_id, "ro.serialno").await?,
        })
    }

    pub async fn installed_packages(&self) -> Result<Vec<String>, DeviceError> {
        let output = self.run(None, &["shell", "pm", "list", "packages"]).await?;
        Ok(input::parse_packages(&output.stdout_text()))
    }

    /// Start an app by package name.
    ///
    /// The launcher activity is resolved and started with `am start`; if it
    /// cannot be resolved the monkey tool fires a launcher intent instead.
    pub async fn launch_app(&self, package_name: &str) -> Result<Value, DeviceError> {
        let resolve = self
            .exec(None, &to_args(&["shell", "cmd", "package", "resolve-activity", "--brief", package_name]))
            .await?;

        let activity = if resolve.success() && resolve.stderr.trim().is_empty() {
            input::parse_resolved_activity(&resolve.stdout_text())
        } else {
            None
        };

        match activity {
            Some(activity) => {
                let started = self.run(None, &["shell", "am", "start", "-n", &activity]).await?;
                info!(package = %package_name, activity = %activity, "App launched");
                let mut body = started.summary();
                body["method"] = json!("am start");
                body["activity"] = json!(activity);
                Ok(body)
            }
            None => {
                debug!(package = %package_name, "Launcher activity not resolved, using monkey");
                let started = self
                    .run(
                        None,
                        &["shell", "monkey", "-p", package_name, "-c", "android.intent.category.LAUNCHER", "1"],
                    )
                    .await?;
                info!(package = %package_name, "App launched via monkey");
                let mut body = started.summary();
                body["method"] = json!("monkey");
                Ok(body)
            }
        }
    }

    /// Capture the screen of `device` (or the configured serial) as PNG.
    pub async fn screencap(&self, device: Option<&str>) -> Result<Vec<u8>, DeviceError> {
        let output = self.run(device, &["exec-out", "screencap", "-p"]).await?;
        if !output.stdout.starts_with(PNG_SIGNATURE) {
            return Err(DeviceError::InvalidOutput {
                command: output.command,
                reason: format!("expected PNG data, got {} bytes", output.stdout.len()),
            });
        }
        if let Some(store) = &self.store {
            store.save(&output.stdout).await;
        }
        Ok(output.stdout)
    }

    /// Run a model-supplied adb command line.
    async fn run_command_line(&self, command: &str) -> Result<Value, DeviceError> {
        let mut args = input::split_command_line(command);
        if args.first().is_some_and(|a| a == "adb") {
            args.remove(0);
        }
        if args.is_empty() {
            return Err(DeviceError::Spawn {
                command: command.to_string(),
                reason: "empty command".into(),
            });
        }
        let output = self.exec(None, &args).await?.into_checked()?;
        Ok(output.summary())
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[async_trait]
impl DeviceCapability for AdbBridge {
    fn name(&self) -> &str {
        "adb"
    }

    async fn ensure_available(&self) -> Result<(), DeviceError> {
        self.adb_path().map(|_| ())
    }

    async fn invoke(&self, action: &ActionKind) -> Result<ActionPayload, DeviceError> {
        let payload = match action {
            ActionKind::CheckAdbInstalled => {
                let path = self.adb_path()?;
                ActionPayload::Structured(json!({ "path": path.display().to_string() }))
            }
            ActionKind::ListDevices => {
                let listed = self.list_devices().await?;
                ActionPayload::Structured(json!(listed))
            }
            ActionKind::DeviceDetails { device_id } => {
                let details = self.device_details(device_id).await?;
                ActionPayload::Structured(json!(details))
            }
            ActionKind::IsEmulator { device_id } => {
                self.adb_path()?;
                let is_emulator = self.is_emulator(device_id).await;
                ActionPayload::Structured(json!({ "device_id": device_id, "is_emulator": is_emulator }))
            }
            ActionKind::TakeScreenshot { device_id } => ActionPayload::Binary {
                mime_type: "image/png".into(),
                bytes: self.screencap(device_id.as_deref()).await?,
            },
            ActionKind::Tap(TapParams { x, y }) => {
                let (x, y) = (x.to_string(), y.to_string());
                let output = self.run(None, &["shell", "input", "tap", &x, &y]).await?;
                ActionPayload::Structured(output.summary())
            }
            ActionKind::Swipe(SwipeParams {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            }) => {
                let args = [x1, y1, x2, y2, duration_ms].map(|n| n.to_string());
                let output = self
                    .run(
                        None,
                        &["shell", "input", "swipe", &args[0], &args[1], &args[2], &args[3], &args[4]],
                    )
                    .await?;
                ActionPayload::Structured(output.summary())
            }
            ActionKind::InputText { text } => {
                let escaped = input::escape_input_text(text);
                let output = self.run(None, &["shell", "input", "text", &escaped]).await?;
                ActionPayload::Structured(output.summary())
            }
            ActionKind::PressKey { keycode } => {
                let keycode = input::normalize_keycode(keycode);
                let output = self.run(None, &["shell", "input", "keyevent", &keycode]).await?;
                ActionPayload::Structured(output.summary())
            }
            ActionKind::LaunchApp { package_name } => {
                ActionPayload::Structured(self.launch_app(package_name).await?)
            }
            ActionKind::InstalledPackages => {
                let packages = self.installed_packages().await?;
                ActionPayload::Structured(json!({ "count": packages.len(), "packages": packages }))
            }
            ActionKind::RunCommand { command } => {
                ActionPayload::Structured(self.run_command_line(command).await?)
            }
        };
        Ok(payload)
    }

    async fn capture_screen(&self) -> Result<Vec<u8>, DeviceError> {
        self.screencap(None).await
    }
}
