//! Action catalog — the declarative registry of device actions.
//!
//! The catalog is what the model sees: every round it is rendered into
//! tool definitions and sent alongside the transcript. It is also what
//! the dispatcher validates incoming requests against, turning a
//! loosely-typed wire request into a typed [`ActionKind`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::InvalidActionRequest;
use crate::provider::{ToolDefinition, completion_definition};

/// JSON type of a single action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
}

/// One entry of an action's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub description: &'static str,
    pub required: bool,
}

impl ParamSpec {
    const fn required(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self { name, kind, description, required: true }
    }

    const fn optional(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self { name, kind, description, required: false }
    }
}

/// A named, schema-described device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Parameters in declaration order.
    pub params: &'static [ParamSpec],
}

impl ActionSpec {
    /// JSON Schema describing this action's parameters.
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    serde_json::json!({ "type": p.kind, "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self.required_params().collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Names of the required parameters, in declaration order.
    pub fn required_params(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().filter(|p| p.required).map(|p| p.name)
    }

    /// Convert this spec into a ToolDefinition for sending to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

use ParamType::{Integer, String as Str};

const DEVICE_ID: ParamSpec = ParamSpec::required("device_id", Str, "The device identifier");

/// The built-in device actions, in advertisement order.
pub const STANDARD_ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "check_if_adb_installed",
        description: "Checks if ADB is installed and available in the system path. Returns the path to ADB or an error.",
        params: &[],
    },
    ActionSpec {
        name: "list_android_devices",
        description: "Lists all connected Android devices with their status, whether they are emulators, and their details.",
        params: &[],
    },
    ActionSpec {
        name: "get_device_details",
        description: "Gets detailed information about a specific device including model, Android version, and serial number.",
        params: &[DEVICE_ID],
    },
    ActionSpec {
        name: "is_emulator",
        description: "Determines whether a device is an emulator or a physical device.",
        params: &[DEVICE_ID],
    },
    ActionSpec {
        name: "take_screenshot",
        description: "Takes a screenshot of the connected Android device and returns the raw PNG data.",
        params: &[ParamSpec::optional(
            "device_id",
            Str,
            "The device identifier. If omitted, uses the default device.",
        )],
    },
    ActionSpec {
        name: "tap",
        description: "Taps at the specified coordinates on the device screen and returns operation result details.",
        params: &[
            ParamSpec::required("x", Integer, "X coordinate"),
            ParamSpec::required("y", Integer, "Y coordinate"),
        ],
    },
    ActionSpec {
        name: "swipe",
        description: "Swipes from one point to another on the device screen with configurable duration and returns operation result details.",
        params: &[
            ParamSpec::required("x1", Integer, "Starting X coordinate"),
            ParamSpec::required("y1", Integer, "Starting Y coordinate"),
            ParamSpec::required("x2", Integer, "Ending X coordinate"),
            ParamSpec::required("y2", Integer, "Ending Y coordinate"),
            ParamSpec::optional("duration", Integer, "Swipe duration in milliseconds. Defaults to 300."),
        ],
    },
    ActionSpec {
        name: "input_text",
        description: "Inputs text on the device with special character handling and returns operation result details.",
        params: &[ParamSpec::required(
            "text",
            Str,
            "Text to input (spaces will be converted to %s and single quotes will be escaped)",
        )],
    },
    ActionSpec {
        name: "press_key",
        description: "Presses a key on the device by sending a keyevent and returns operation result details.",
        params: &[ParamSpec::required(
            "keycode",
            Str,
            "Key code (e.g., 'HOME', 'BACK'). Will be prefixed with 'KEYCODE_' if not already present.",
        )],
    },
    ActionSpec {
        name: "launch_app",
        description: "Launches an application by package name using either activity resolution or the monkey tool and returns detailed operation result.",
        params: &[ParamSpec::required("package_name", Str, "Package name of the app to launch")],
    },
    ActionSpec {
        name: "get_installed_packages",
        description: "Gets a list of all installed packages on the device by parsing the output of 'pm list packages'.",
        params: &[],
    },
    ActionSpec {
        name: "run_command",
        description: "Executes an ADB command and returns its output.",
        params: &[ParamSpec::required(
            "command",
            Str,
            "The ADB command to execute (without the ADB path), e.g. 'shell dumpsys battery'",
        )],
    },
];

/// Default swipe duration in milliseconds.
pub const DEFAULT_SWIPE_DURATION_MS: u32 = 300;

/// A request to execute an action, as produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the action to execute
    pub name: String,

    /// Arguments keyed by parameter name
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ActionRequest {
    /// Build a request with a fresh call ID.
    ///
    /// Non-object `arguments` are treated as "no arguments".
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self::with_id(format!("call_{}", Uuid::new_v4().simple()), name, arguments)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    fn arg(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|v| !v.is_null())
    }

    fn string(&self, name: &str) -> Result<Option<String>, InvalidActionRequest> {
        match self.arg(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(invalid(name, format!("expected a string, got {other}"))),
        }
    }

    fn integer(&self, name: &str) -> Result<Option<i64>, InvalidActionRequest> {
        let Some(value) = self.arg(name) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| invalid(name, format!("expected an integer, got {value}")))
    }

    fn required_string(&self, name: &str) -> Result<String, InvalidActionRequest> {
        self.string(name)?
            .ok_or_else(|| InvalidActionRequest::MissingParameter(name.to_string()))
    }

    fn coordinate(&self, name: &str) -> Result<u32, InvalidActionRequest> {
        let value = self
            .integer(name)?
            .ok_or_else(|| InvalidActionRequest::MissingParameter(name.to_string()))?;
        u32::try_from(value).map_err(|_| invalid(name, format!("must be a non-negative screen coordinate, got {value}")))
    }
}

fn invalid(name: &str, reason: String) -> InvalidActionRequest {
    InvalidActionRequest::InvalidParameter {
        name: name.to_string(),
        reason,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapParams {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeParams {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub duration_ms: u32,
}

/// A validated action with typed parameters.
///
/// Every catalog entry has exactly one variant here, so capability
/// providers can match exhaustively instead of dispatching on strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    CheckAdbInstalled,
    ListDevices,
    DeviceDetails { device_id: String },
    IsEmulator { device_id: String },
    TakeScreenshot { device_id: Option<String> },
    Tap(TapParams),
    Swipe(SwipeParams),
    InputText { text: String },
    PressKey { keycode: String },
    LaunchApp { package_name: String },
    InstalledPackages,
    RunCommand { command: String },
}

impl ActionKind {
    /// The catalog name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckAdbInstalled => "check_if_adb_installed",
            Self::ListDevices => "list_android_devices",
            Self::DeviceDetails { .. } => "get_device_details",
            Self::IsEmulator { .. } => "is_emulator",
            Self::TakeScreenshot { .. } => "take_screenshot",
            Self::Tap(_) => "tap",
            Self::Swipe(_) => "swipe",
            Self::InputText { .. } => "input_text",
            Self::PressKey { .. } => "press_key",
            Self::LaunchApp { .. } => "launch_app",
            Self::InstalledPackages => "get_installed_packages",
            Self::RunCommand { .. } => "run_command",
        }
    }

    /// Build the typed action from a request whose name is already known.
    fn from_request(request: &ActionRequest) -> Result<Self, InvalidActionRequest> {
        let kind = match request.name.as_str() {
            "check_if_adb_installed" => Self::CheckAdbInstalled,
            "list_android_devices" => Self::ListDevices,
            "get_device_details" => Self::DeviceDetails {
                device_id: request.required_string("device_id")?,
            },
            "is_emulator" => Self::IsEmulator {
                device_id: request.required_string("device_id")?,
            },
            "take_screenshot" => Self::TakeScreenshot {
                device_id: request.string("device_id")?.filter(|s| !s.trim().is_empty()),
            },
            "tap" => Self::Tap(TapParams {
                x: request.coordinate("x")?,
                y: request.coordinate("y")?,
            }),
            "swipe" => {
                let duration_ms = match request.integer("duration")? {
                    None => DEFAULT_SWIPE_DURATION_MS,
                    Some(ms) => u32::try_from(ms)
                        .map_err(|_| invalid("duration", format!("must be a non-negative number of milliseconds, got {ms}")))?,
                };
                Self::Swipe(SwipeParams {
                    x1: request.coordinate("x1")?,
                    y1: request.coordinate("y1")?,
                    x2: request.coordinate("x2")?,
                    y2: request.coordinate("y2")?,
                    duration_ms,
                })
            }
            "input_text" => Self::InputText {
                text: request.required_string("text")?,
            },
            "press_key" => Self::PressKey {
                keycode: request.required_string("keycode")?,
            },
            "launch_app" => Self::LaunchApp {
                package_name: request.required_string("package_name")?,
            },
            "get_installed_packages" => Self::InstalledPackages,
            "run_command" => Self::RunCommand {
                command: request.required_string("command")?,
            },
            other => return Err(InvalidActionRequest::UnknownAction(other.to_string())),
        };
        Ok(kind)
    }
}

/// The process-wide, immutable set of actions the model may call.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    specs: Vec<ActionSpec>,
}

impl ActionCatalog {
    /// The catalog of all built-in device actions.
    pub fn standard() -> Self {
        Self {
            specs: STANDARD_ACTIONS.to_vec(),
        }
    }

    /// A catalog restricted to the named built-in actions.
    ///
    /// Unknown names are ignored; advertisement order follows the
    /// built-in order.
    pub fn only(names: &[&str]) -> Self {
        Self {
            specs: STANDARD_ACTIONS
                .iter()
                .filter(|s| names.contains(&s.name))
                .copied()
                .collect(),
        }
    }

    /// All action specs, in advertisement order.
    pub fn describe(&self) -> &[ActionSpec] {
        &self.specs
    }

    /// Look up a spec by name.
    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Tool definitions for every action plus the reserved completion
    /// action, ready to send to the LLM.
    pub fn advertisement(&self) -> Vec<ToolDefinition> {
        self.specs
            .iter()
            .map(ActionSpec::to_definition)
            .chain(std::iter::once(completion_definition()))
            .collect()
    }

    /// Check a request against the catalog and produce its typed form.
    ///
    /// Order of checks: the name must be in this catalog, every required
    /// parameter must be present (reported in declaration order), then
    /// every argument must have the declared type.
    pub fn validate(&self, request: &ActionRequest) -> Result<ActionKind, InvalidActionRequest> {
        let spec = self
            .get(&request.name)
            .ok_or_else(|| InvalidActionRequest::UnknownAction(request.name.clone()))?;

        if let Some(missing) = spec.required_params().find(|p| request.arg(p).is_none()) {
            return Err(InvalidActionRequest::MissingParameter(missing.to_string()));
        }

        ActionKind::from_request(request)
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
