//! Turn dispatcher — turns one model action request into one observation.
//!
//! Per request: validate against the catalog, invoke the device at most
//! once, let the screen settle, then capture it exactly once. Validation
//! and device failures become `Failure` results; dispatch itself never
//! fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use adbpilot_core::action::{ActionCatalog, ActionRequest};
use adbpilot_core::device::{ActionResult, DeviceCapability, Observation};
use adbpilot_core::event::{DomainEvent, EventBus};
use tracing::{debug, warn};

/// Screen settle time between an action and its capture.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

pub struct TurnDispatcher {
    device: Arc<dyn DeviceCapability>,
    catalog: Arc<ActionCatalog>,
    settle_delay: Duration,
    event_bus: Arc<EventBus>,
}

impl TurnDispatcher {
    pub fn new(device: Arc<dyn DeviceCapability>, catalog: Arc<ActionCatalog>) -> Self {
        Self {
            device,
            catalog,
            settle_delay: DEFAULT_SETTLE_DELAY,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Execute one request and observe the screen afterwards.
    pub async fn dispatch(&self, request: &ActionRequest) -> Observation {
        let start = Instant::now();

        let result = match self.catalog.validate(request) {
            Ok(action) => {
                debug!(action = %request.name, call_id = %request.id, "Invoking device action");
                let result = ActionResult::from(self.device.invoke(&action).await);
                if !self.settle_delay.is_zero() {
                    tokio::time::sleep(self.settle_delay).await;
                }
                result
            }
            Err(invalid) => {
                warn!(action = %request.name, error = %invalid, "Rejected action request");
                ActionResult::failure(invalid)
            }
        };

        if let ActionResult::Failure { error } = &result {
            warn!(action = %request.name, error = %error, "Action failed");
        }

        let capture = self.device.capture_screen().await;
        if let Err(e) = &capture {
            warn!(action = %request.name, error = %e, "Screen capture failed");
        }
        let observation = Observation::new(result, capture);

        self.event_bus.publish(DomainEvent::ActionDispatched {
            action: request.name.clone(),
            success: observation.result.is_success(),
            error: match &observation.result {
                ActionResult::Failure { error } => Some(error.clone()),
                _ => None,
            },
            screenshot: observation.visual.is_some(),
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
        });

        observation
    }
}
