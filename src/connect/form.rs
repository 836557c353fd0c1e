//! External contact form: field edits, validation and the submission guard.

use std::future::Future;

use crate::api::{ApiError, ExternalContactDraft};

use super::validate::{self, ContactField, FieldErrors};

pub const NETWORK_SUBMIT_ERROR: &str =
    "Network error. Please check your connection and try again.";
pub const GENERIC_SUBMIT_ERROR: &str = "Failed to save contact. Please try again.";

/// Why a submit attempt did not reach the save callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormBlocked {
    /// A submission is already outstanding (locally or in the caller)
    Busy,
    Invalid(FieldErrors),
}

#[derive(Debug, Clone, Default)]
pub struct ContactForm {
    draft: ExternalContactDraft,
    errors: FieldErrors,
    submitting: bool,
    submit_error: Option<String>,
    edit_mode: bool,
}

impl ContactForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Form pre-filled from an existing contact; it keeps its data after saving
    pub fn editing(initial: ExternalContactDraft) -> Self {
        Self {
            draft: initial,
            edit_mode: true,
            ..Self::default()
        }
    }

    pub fn draft(&self) -> &ExternalContactDraft {
        &self.draft
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn is_edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn value(&self, field: ContactField) -> &str {
        match field {
            ContactField::Name => &self.draft.name,
            ContactField::Phone => &self.draft.phone,
            ContactField::Address => self.draft.address.as_deref().unwrap_or(""),
            ContactField::Relationship => &self.draft.relationship,
        }
    }

    /// Replace one field; its stale error goes away immediately.
    pub fn set_field(&mut self, field: ContactField, value: impl Into<String>) {
        let value = value.into();
        match field {
            ContactField::Name => self.draft.name = value,
            ContactField::Phone => self.draft.phone = value,
            ContactField::Address => {
                self.draft.address = if value.is_empty() { None } else { Some(value) }
            }
            ContactField::Relationship => self.draft.relationship = value,
        }
        self.errors.clear(field);
    }

    /// Validate and claim the submission slot.
    ///
    /// `external_submitting` is the caller's own in-flight flag; either flag
    /// being set turns the attempt into a no-op. On success the trimmed draft
    /// is returned and the form stays busy until [`finish_submit`] runs.
    /// When editing, a blank address comes back as `Some("")` so the update
    /// clears the stored one; a missing address would leave it untouched.
    ///
    /// [`finish_submit`]: ContactForm::finish_submit
    pub fn begin_submit(
        &mut self,
        external_submitting: bool,
    ) -> Result<ExternalContactDraft, FormBlocked> {
        if self.submitting || external_submitting {
            return Err(FormBlocked::Busy);
        }

        let errors = validate::validate(&self.draft);
        if !errors.is_empty() {
            self.errors = errors.clone();
            return Err(FormBlocked::Invalid(errors));
        }

        self.errors = FieldErrors::default();
        self.submit_error = None;
        self.submitting = true;
        let mut draft = self.draft.trimmed();
        if self.edit_mode && draft.address.is_none() {
            draft.address = Some(String::new());
        }
        Ok(draft)
    }

    pub fn finish_submit(&mut self, result: Result<(), ApiError>) {
        self.submitting = false;
        match result {
            Ok(()) => {
                if !self.edit_mode {
                    self.draft = ExternalContactDraft::default();
                    self.errors = FieldErrors::default();
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "contact save failed");
                self.submit_error = Some(submit_error_message(&err));
            }
        }
    }

    /// Run a whole submission against `save`.
    ///
    /// Returns `true` when the callback was invoked and succeeded.
    pub async fn submit<F, Fut>(&mut self, external_submitting: bool, save: F) -> bool
    where
        F: FnOnce(ExternalContactDraft) -> Fut,
        Fut: Future<Output = Result<(), ApiError>>,
    {
        let draft = match self.begin_submit(external_submitting) {
            Ok(draft) => draft,
            Err(_) => return false,
        };
        let result = save(draft).await;
        let saved = result.is_ok();
        self.finish_submit(result);
        saved
    }
}

/// User-facing text for a failed save
pub fn submit_error_message(err: &ApiError) -> String {
    if err.is_network() {
        return NETWORK_SUBMIT_ERROR.to_string();
    }
    let message = err.to_string();
    if message.trim().is_empty() {
        GENERIC_SUBMIT_ERROR.to_string()
    } else {
        message
    }
}
