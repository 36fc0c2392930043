//! Step navigation over the onboarding form.

use std::sync::Arc;

use super::draft::DraftSnapshotManager;
use super::form::SharedForm;
use super::steps::{field_label, validate_step, StepId, ValidationContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormStepState {
    pub current_step_index: usize,
    pub step_completed: Vec<bool>,
    pub step_error_summary: Option<Vec<String>>,
    /// First invalid field of the last failed `handle_next`.
    pub focus_field: Option<String>,
}

impl Default for FormStepState {
    fn default() -> Self {
        Self {
            current_step_index: 0,
            step_completed: vec![false; StepId::ALL.len()],
            step_error_summary: None,
            focus_field: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    StepView { step: StepId },
    StepComplete { step: StepId },
}

pub trait AnalyticsSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// Sends analytics events to the log.
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn emit(&self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::StepView { step } => log::info!("step_view step={}", step.as_str()),
            AnalyticsEvent::StepComplete { step } => {
                log::info!("step_complete step={}", step.as_str())
            }
        }
    }
}

pub struct StepWizard {
    form: SharedForm,
    drafts: Arc<DraftSnapshotManager>,
    analytics: Arc<dyn AnalyticsSink>,
    context: ValidationContext,
    state: FormStepState,
    hash_synced: bool,
}

impl StepWizard {
    pub fn new(
        form: SharedForm,
        drafts: Arc<DraftSnapshotManager>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            form,
            drafts,
            analytics,
            context: ValidationContext::default(),
            state: FormStepState::default(),
            hash_synced: false,
        }
    }

    pub fn with_context(mut self, context: ValidationContext) -> Self {
        self.context = context;
        self
    }

    pub fn state(&self) -> &FormStepState {
        &self.state
    }

    pub fn current_step(&self) -> StepId {
        StepId::from_index(self.state.current_step_index).unwrap_or(StepId::Basics)
    }

    pub fn is_review(&self) -> bool {
        self.current_step() == StepId::Review
    }

    /// Validate the active step, persist, then advance. Returns whether the
    /// visible step moved.
    pub async fn handle_next(&mut self) -> bool {
        let step = self.current_step();
        let errors = {
            let form = self.form.lock().unwrap_or_else(|e| e.into_inner());
            validate_step(step, &form, self.context)
        };

        if !errors.is_empty() {
            let mut labels: Vec<String> = Vec::new();
            for error in &errors {
                let label = field_label(&error.path);
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
            log::debug!("Step {} blocked by {} field(s)", step.as_str(), errors.len());
            self.state.focus_field = errors.first().map(|e| e.path.clone());
            self.state.step_error_summary = Some(labels);
            return false;
        }

        self.state.step_error_summary = None;
        self.state.focus_field = None;

        let last = StepId::ALL.len() - 1;
        let target = (self.state.current_step_index + 1).min(last);

        // The saved step must be the one the captain lands on.
        self.drafts.set_current_step(target as i32);
        if let Err(e) = self.drafts.save().await {
            log::warn!("Draft save before leaving step {} failed: {}", step.as_str(), e);
        }

        self.state.step_completed[step.index()] = true;
        self.state.current_step_index = target;
        self.analytics.emit(AnalyticsEvent::StepComplete { step });
        self.analytics.emit(AnalyticsEvent::StepView {
            step: self.current_step(),
        });
        true
    }

    pub fn handle_prev(&mut self) {
        self.state.current_step_index = self.state.current_step_index.saturating_sub(1);
        self.drafts.set_current_step(self.state.current_step_index as i32);
        self.state.step_error_summary = None;
    }

    /// Jump without validation. Out-of-range indices are ignored.
    pub fn goto_step(&mut self, index: usize) -> bool {
        let Some(step) = StepId::from_index(index) else {
            return false;
        };
        self.state.current_step_index = index;
        self.state.step_error_summary = None;
        self.drafts.set_current_step(index as i32);
        self.analytics.emit(AnalyticsEvent::StepView { step });
        true
    }

    /// Apply a URL fragment once, at load time.
    pub fn sync_from_hash(&mut self, fragment: &str) -> bool {
        if self.hash_synced {
            return false;
        }
        self.hash_synced = true;
        match StepId::parse(fragment) {
            Some(step) => self.goto_step(step.index()),
            None => false,
        }
    }
}
