//! Capture workflow — capture, validate, submit, record.
//!
//! DESIGN
//! ======
//! [`CaptureWorkflow`] is the pure state machine. Every async step is split
//! into `begin_*`, which moves into an in-flight state and hands back a
//! [`Ticket`], and `finish_*`, which applies the result only if the ticket
//! still matches. Each capture bumps the generation, so a completion that
//! arrives after a recapture is dropped instead of overwriting fresh state.
//!
//! [`WorkflowDriver`] runs the adapters around the machine. The machine sits
//! behind a std mutex that is only held for a transition, never across an
//! await. Every transition publishes a [`WorkflowSnapshot`] on a watch
//! channel for observers.
//!
//! ```text
//! Empty → Captured → Validating → Validated{found} → Submitting → Complete
//!                                                              ↘ Failed ─┐
//!                                                  Submitting ←──────────┘
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::image::{self, Camera, DataUrl, ImageError};
use crate::services::detection::{HandCheck, HandValidator, ValidationError};
use crate::services::reading::{GenerationError, ReadingGenerator};
use crate::store::{ReadingRecord, SharedStore};

pub const MSG_NO_HAND: &str = "Did not detect a clear hand in the image. Please take a clearer photo of your palm.";
pub const MSG_VALIDATION_FAILED: &str = "Error validating image. Please try again.";
pub const MSG_GENERATION_FAILED: &str = "Error analyzing palm. Please try again.";

pub const DEFAULT_VALIDATE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 90;

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WorkflowState {
    #[default]
    Empty,
    Captured,
    Validating,
    /// `error` carries the user-facing reason when no hand was accepted.
    Validated { hand_found: bool, error: Option<String> },
    Submitting,
    Complete { text: String },
    Failed { reason: String },
}

impl WorkflowState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Captured => "captured",
            Self::Validating => "validating",
            Self::Validated { .. } => "validated",
            Self::Submitting => "submitting",
            Self::Complete { .. } => "complete",
            Self::Failed { .. } => "failed",
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Validating | Self::Submitting)
    }
}

/// What observers see after each transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub image: Option<DataUrl>,
    pub generation: u64,
    pub can_submit: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("no image captured")]
    NoImage,
    #[error("camera has not produced a frame yet")]
    NoFrame,
    #[error("image capture failed: {0}")]
    Capture(#[from] ImageError),
    #[error("another validation or submission is in flight")]
    Busy,
    #[error("cannot {action} while {from}")]
    InvalidTransition { action: &'static str, from: &'static str },
    #[error("superseded by a newer capture")]
    Superseded,
}

impl ErrorCode for WorkflowError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NoImage => "E_NO_IMAGE",
            Self::NoFrame => "E_NO_FRAME",
            Self::Capture(_) => "E_CAPTURE",
            Self::Busy => "E_BUSY",
            Self::InvalidTransition { .. } => "E_INVALID_TRANSITION",
            Self::Superseded => "E_SUPERSEDED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::NoFrame)
    }
}

/// Proof that a `begin_*` call happened under a given capture generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

// =============================================================================
// STATE MACHINE
// =============================================================================

#[derive(Debug, Default)]
pub struct CaptureWorkflow {
    state: WorkflowState,
    image: Option<DataUrl>,
    generation: u64,
}

impl CaptureWorkflow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    #[must_use]
    pub fn image(&self) -> Option<&DataUrl> {
        self.image.as_ref()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Submit is offered after a positive validation and again after a
    /// failed submission.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        matches!(self.state, WorkflowState::Validated { hand_found: true, .. } | WorkflowState::Failed { .. })
    }

    #[must_use]
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            state: self.state.clone(),
            image: self.image.clone(),
            generation: self.generation,
            can_submit: self.can_submit(),
        }
    }

    /// Replace the image and clear everything derived from the previous one.
    /// Any in-flight call becomes stale.
    pub fn capture(&mut self, image: DataUrl) {
        self.generation += 1;
        self.image = Some(image);
        self.state = WorkflowState::Captured;
    }

    /// # Errors
    ///
    /// [`WorkflowError::NoImage`] before any capture, [`WorkflowError::Busy`]
    /// while a call is in flight, and [`WorkflowError::InvalidTransition`]
    /// once the current image has already been validated.
    pub fn begin_validate(&mut self) -> Result<(Ticket, DataUrl), WorkflowError> {
        match &self.state {
            WorkflowState::Captured => {}
            WorkflowState::Empty => return Err(WorkflowError::NoImage),
            s if s.is_busy() => return Err(WorkflowError::Busy),
            s => return Err(WorkflowError::InvalidTransition { action: "validate", from: s.name() }),
        }
        let image = self.image.clone().ok_or(WorkflowError::NoImage)?;
        self.state = WorkflowState::Validating;
        Ok((self.ticket(), image))
    }

    /// Apply a validation result.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Superseded`] if the image changed since
    /// `begin_validate`; the state is left untouched.
    pub fn finish_validate(
        &mut self,
        ticket: Ticket,
        result: &Result<HandCheck, ValidationError>,
    ) -> Result<(), WorkflowError> {
        if !self.is_current(ticket, &WorkflowState::Validating) {
            return Err(WorkflowError::Superseded);
        }
        self.state = match result {
            Ok(HandCheck { hand_found: true }) => WorkflowState::Validated { hand_found: true, error: None },
            Ok(HandCheck { hand_found: false }) => {
                WorkflowState::Validated { hand_found: false, error: Some(MSG_NO_HAND.to_string()) }
            }
            Err(_) => WorkflowState::Validated { hand_found: false, error: Some(MSG_VALIDATION_FAILED.to_string()) },
        };
        Ok(())
    }

    /// # Errors
    ///
    /// [`WorkflowError::NoImage`], [`WorkflowError::Busy`], or
    /// [`WorkflowError::InvalidTransition`] from any state other than a
    /// positive validation or a failed submission.
    pub fn begin_submit(&mut self) -> Result<(Ticket, DataUrl), WorkflowError> {
        if !self.can_submit() {
            return Err(match &self.state {
                WorkflowState::Empty => WorkflowError::NoImage,
                s if s.is_busy() => WorkflowError::Busy,
                s => WorkflowError::InvalidTransition { action: "submit", from: s.name() },
            });
        }
        let image = self.image.clone().ok_or(WorkflowError::NoImage)?;
        self.state = WorkflowState::Submitting;
        Ok((self.ticket(), image))
    }

    /// Apply a generation result. Returns the reading text when the workflow
    /// reached `Complete`.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Superseded`] if the image changed since
    /// `begin_submit`; the state is left untouched.
    pub fn finish_submit(
        &mut self,
        ticket: Ticket,
        result: Result<String, GenerationError>,
    ) -> Result<Option<String>, WorkflowError> {
        if !self.is_current(ticket, &WorkflowState::Submitting) {
            return Err(WorkflowError::Superseded);
        }
        match result {
            Ok(text) => {
                self.state = WorkflowState::Complete { text: text.clone() };
                Ok(Some(text))
            }
            Err(_) => {
                self.state = WorkflowState::Failed { reason: MSG_GENERATION_FAILED.to_string() };
                Ok(None)
            }
        }
    }

    fn ticket(&self) -> Ticket {
        Ticket { generation: self.generation }
    }

    fn is_current(&self, ticket: Ticket, expected: &WorkflowState) -> bool {
        ticket.generation == self.generation && &self.state == expected
    }
}

// =============================================================================
// DRIVER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowTimeouts {
    pub validate: Duration,
    pub submit: Duration,
}

impl Default for WorkflowTimeouts {
    fn default() -> Self {
        Self {
            validate: Duration::from_secs(DEFAULT_VALIDATE_TIMEOUT_SECS),
            submit: Duration::from_secs(DEFAULT_SUBMIT_TIMEOUT_SECS),
        }
    }
}

pub struct WorkflowDriver {
    machine: Mutex<CaptureWorkflow>,
    validator: Arc<HandValidator>,
    generator: Arc<dyn ReadingGenerator>,
    store: SharedStore,
    timeouts: WorkflowTimeouts,
    updates: watch::Sender<WorkflowSnapshot>,
}

impl WorkflowDriver {
    #[must_use]
    pub fn new(
        validator: Arc<HandValidator>,
        generator: Arc<dyn ReadingGenerator>,
        store: SharedStore,
        timeouts: WorkflowTimeouts,
    ) -> Self {
        let machine = CaptureWorkflow::new();
        let (updates, _) = watch::channel(machine.snapshot());
        Self { machine: Mutex::new(machine), validator, generator, store, timeouts, updates }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.updates.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.updates.borrow().clone()
    }

    /// Run one transition under the lock and publish the resulting snapshot.
    fn transition<T>(&self, f: impl FnOnce(&mut CaptureWorkflow) -> T) -> T {
        let mut machine = self.machine.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut machine);
        let snapshot = machine.snapshot();
        drop(machine);
        debug!(state = snapshot.state.name(), generation = snapshot.generation, "workflow: transition");
        self.updates.send_replace(snapshot);
        out
    }

    pub fn capture(&self, image: DataUrl) -> WorkflowSnapshot {
        info!(bytes = image.len(), "workflow: captured");
        self.transition(|m| m.capture(image));
        self.snapshot()
    }

    /// # Errors
    ///
    /// Returns [`WorkflowError::Capture`] if the file is not a readable image.
    pub async fn capture_file(&self, path: impl AsRef<Path>) -> Result<WorkflowSnapshot, WorkflowError> {
        let image = image::from_file(path).await?;
        Ok(self.capture(image))
    }

    /// # Errors
    ///
    /// Returns [`WorkflowError::NoFrame`] if the camera has nothing yet.
    pub fn capture_camera(&self, camera: &dyn Camera) -> Result<WorkflowSnapshot, WorkflowError> {
        let image = image::from_camera(camera).ok_or(WorkflowError::NoFrame)?;
        Ok(self.capture(image))
    }

    /// Ask the validator whether the current image shows a hand.
    ///
    /// # Errors
    ///
    /// Transition errors from [`CaptureWorkflow::begin_validate`], or
    /// [`WorkflowError::Superseded`] if a recapture happened meanwhile.
    /// Validator failures are not errors here; they land in the state.
    pub async fn validate(&self) -> Result<WorkflowSnapshot, WorkflowError> {
        let (ticket, image) = self.transition(CaptureWorkflow::begin_validate)?;
        info!(generation = ticket.generation, "workflow: validating");

        let limit = self.timeouts.validate;
        let result = match tokio::time::timeout(limit, self.validator.detect(&image)).await {
            Ok(result) => result,
            Err(_) => Err(ValidationError::Timeout(limit.as_secs())),
        };
        if let Err(e) = &result {
            warn!(code = e.error_code(), retryable = e.retryable(), error = %e, "workflow: validation failed");
        }

        self.transition(|m| m.finish_validate(ticket, &result))
            .inspect_err(|_| debug!(generation = ticket.generation, "workflow: stale validation dropped"))?;
        Ok(self.snapshot())
    }

    /// Generate a reading for the validated image and record it.
    ///
    /// # Errors
    ///
    /// Transition errors from [`CaptureWorkflow::begin_submit`], or
    /// [`WorkflowError::Superseded`] if a recapture happened meanwhile.
    /// Generator failures are not errors here; they land in the state.
    pub async fn submit(&self) -> Result<WorkflowSnapshot, WorkflowError> {
        let (ticket, image) = self.transition(CaptureWorkflow::begin_submit)?;
        info!(generation = ticket.generation, "workflow: submitting");

        let limit = self.timeouts.submit;
        let result = match tokio::time::timeout(limit, self.generator.generate(&image)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(limit.as_secs())),
        };
        if let Err(e) = &result {
            warn!(code = e.error_code(), retryable = e.retryable(), error = %e, "workflow: generation failed");
        }

        let completed = self
            .transition(|m| m.finish_submit(ticket, result))
            .inspect_err(|_| debug!(generation = ticket.generation, "workflow: stale submission dropped"))?;
        if let Some(text) = completed {
            self.record(&image, text).await;
        }
        Ok(self.snapshot())
    }

    /// Append the completed reading. A failed write is logged; the reading
    /// itself stays visible.
    async fn record(&self, image: &DataUrl, text: String) {
        let record = match ReadingRecord::now(image, text) {
            Ok(record) => record,
            Err(e) => {
                warn!(code = e.error_code(), error = %e, "workflow: could not stamp reading");
                return;
            }
        };
        let mut store = self.store.lock().await;
        match store.append(record).await {
            Ok(()) => info!(count = store.len(), "workflow: reading saved"),
            Err(e) => warn!(code = e.error_code(), error = %e, "workflow: reading not saved"),
        }
    }
}

#[cfg(test)]
#[path = "workflow_test.rs"]
mod tests;
