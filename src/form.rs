//! Create/edit form controller for equipment records

use crate::{
    error::{AppError, FieldErrors},
    models::{
        equipment::is_digits_only, EquipmentDraft, EquipmentField, EquipmentId, EquipmentRecord,
    },
    repository::equipment::EquipmentRepository,
};

const SAVE_FAILED: &str = "Could not save changes. Please try again.";

/// What the form is editing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(EquipmentId),
}

/// An open form: its draft plus the outcome of the last submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenForm {
    pub mode: FormMode,
    pub draft: EquipmentDraft,
    pub errors: FieldErrors,
    /// Generic message shown when the last save failed remotely
    pub failure: Option<String>,
}

impl OpenForm {
    fn new(mode: FormMode, draft: EquipmentDraft) -> Self {
        Self {
            mode,
            draft,
            errors: FieldErrors::new(),
            failure: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormState {
    #[default]
    Closed,
    Open(OpenForm),
    Submitting(OpenForm),
}

/// Result of a submit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(EquipmentId),
    Saved(EquipmentId),
    /// Validation failed, nothing was written; the form stays open
    Invalid(FieldErrors),
    /// The write failed; the form stays open with its draft
    Failed(String),
    /// There was no open form to submit
    NotOpen,
}

/// Drives one equipment form through `Closed → Open → Submitting → Closed`
#[derive(Debug, Default)]
pub struct EquipmentForm {
    state: FormState,
}

impl EquipmentForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, FormState::Open(_))
    }

    fn open_form(&self) -> Option<&OpenForm> {
        match &self.state {
            FormState::Open(form) | FormState::Submitting(form) => Some(form),
            FormState::Closed => None,
        }
    }

    pub fn draft(&self) -> Option<&EquipmentDraft> {
        self.open_form().map(|form| &form.draft)
    }

    pub fn errors(&self) -> Option<&FieldErrors> {
        self.open_form().map(|form| &form.errors)
    }

    /// Open with every field empty
    pub fn open_create(&mut self) {
        self.state = FormState::Open(OpenForm::new(FormMode::Create, EquipmentDraft::default()));
    }

    /// Open with every field copied from `record`
    pub fn open_edit(&mut self, record: &EquipmentRecord) {
        self.state = FormState::Open(OpenForm::new(
            FormMode::Edit(record.id.clone()),
            record.to_draft(),
        ));
    }

    /// Apply an input change. Returns `false` if the form is not open or the
    /// value was rejected; a rejected value leaves the field unchanged.
    pub fn set_field(&mut self, field: EquipmentField, value: impl Into<String>) -> bool {
        let FormState::Open(form) = &mut self.state else {
            return false;
        };
        let value = value.into();
        if field == EquipmentField::SerialNumber && !is_digits_only(&value) {
            return false;
        }
        form.draft.set_field(field, value);
        true
    }

    /// Discard the draft without persisting
    pub fn close(&mut self) {
        self.state = FormState::Closed;
    }

    /// Validate and hand the draft to the repository.
    ///
    /// The form closes only after the repository reports success.
    pub async fn submit(&mut self, repository: &EquipmentRepository) -> SubmitOutcome {
        let mut form = match std::mem::take(&mut self.state) {
            FormState::Open(form) => form,
            other => {
                self.state = other;
                return SubmitOutcome::NotOpen;
            }
        };

        if let Err(errors) = form.draft.check() {
            form.errors = errors.clone();
            form.failure = None;
            self.state = FormState::Open(form);
            return SubmitOutcome::Invalid(errors);
        }

        form.errors = FieldErrors::new();
        form.failure = None;
        self.state = FormState::Submitting(form.clone());

        let result = match &form.mode {
            FormMode::Create => repository.create(&form.draft).await.map(SubmitOutcome::Created),
            FormMode::Edit(id) => repository
                .update(id, &form.draft)
                .await
                .map(|()| SubmitOutcome::Saved(id.clone())),
        };

        match result {
            Ok(outcome) => {
                self.state = FormState::Closed;
                outcome
            }
            Err(AppError::Validation(errors)) => {
                form.errors = errors.clone();
                self.state = FormState::Open(form);
                SubmitOutcome::Invalid(errors)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Equipment form submit failed");
                form.failure = Some(SAVE_FAILED.to_string());
                self.state = FormState::Open(form);
                SubmitOutcome::Failed(SAVE_FAILED.to_string())
            }
        }
    }
}
