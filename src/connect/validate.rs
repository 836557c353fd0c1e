use std::sync::LazyLock;

use regex::Regex;

use crate::api::ExternalContactDraft;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 100;
pub const PHONE_MIN_DIGITS: usize = 10;
pub const ADDRESS_MAX_CHARS: usize = 200;

static NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z \-']+$").unwrap());
static PHONE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9 \-+()]+$").unwrap());

/// Fields of the external contact form, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContactField {
    Name,
    Phone,
    Address,
    Relationship,
}

impl ContactField {
    pub const ALL: [ContactField; 4] = [
        ContactField::Name,
        ContactField::Phone,
        ContactField::Address,
        ContactField::Relationship,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ContactField::Name => "Name",
            ContactField::Phone => "Phone",
            ContactField::Address => "Address",
            ContactField::Relationship => "Relationship",
        }
    }

    pub fn required(self) -> bool {
        !matches!(self, ContactField::Address)
    }

    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let index = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(index + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Per-field validation messages; a field without a message is valid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub relationship: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    pub fn get(&self, field: ContactField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn clear(&mut self, field: ContactField) {
        *self.slot_mut(field) = None;
    }

    /// Fields that currently carry an error
    pub fn fields(&self) -> Vec<ContactField> {
        ContactField::ALL
            .into_iter()
            .filter(|field| self.slot(*field).is_some())
            .collect()
    }

    fn set(&mut self, field: ContactField, message: &str) {
        *self.slot_mut(field) = Some(message.to_string());
    }

    fn slot(&self, field: ContactField) -> &Option<String> {
        match field {
            ContactField::Name => &self.name,
            ContactField::Phone => &self.phone,
            ContactField::Address => &self.address,
            ContactField::Relationship => &self.relationship,
        }
    }

    fn slot_mut(&mut self, field: ContactField) -> &mut Option<String> {
        match field {
            ContactField::Name => &mut self.name,
            ContactField::Phone => &mut self.phone,
            ContactField::Address => &mut self.address,
            ContactField::Relationship => &mut self.relationship,
        }
    }
}

/// Check every field of `draft` and collect all failures.
pub fn validate(draft: &ExternalContactDraft) -> FieldErrors {
    let mut errors = FieldErrors::default();

    if let Some(message) = name_error(&draft.name) {
        errors.set(ContactField::Name, message);
    }
    if let Some(message) = phone_error(&draft.phone) {
        errors.set(ContactField::Phone, message);
    }
    if let Some(message) = draft.address.as_deref().and_then(address_error) {
        errors.set(ContactField::Address, message);
    }
    if draft.relationship.trim().is_empty() {
        errors.set(ContactField::Relationship, "Please select a relationship");
    }

    errors
}

fn name_error(name: &str) -> Option<&'static str> {
    let name = name.trim();
    let len = name.chars().count();
    if name.is_empty() {
        Some("Name is required")
    } else if len < NAME_MIN_CHARS {
        Some("Name must be at least 2 characters")
    } else if len > NAME_MAX_CHARS {
        Some("Name must be 100 characters or less")
    } else if !NAME_CHARS.is_match(name) {
        Some("Name can only contain letters, spaces, hyphens, and apostrophes")
    } else {
        None
    }
}

fn phone_error(phone: &str) -> Option<&'static str> {
    let phone = phone.trim();
    if phone.is_empty() {
        Some("Phone number is required")
    } else if !PHONE_CHARS.is_match(phone) {
        Some("Phone number can only contain digits, spaces, +, -, and parentheses")
    } else if digit_count(phone) < PHONE_MIN_DIGITS {
        Some("Phone number must contain at least 10 digits")
    } else {
        None
    }
}

fn address_error(address: &str) -> Option<&'static str> {
    if address.trim().chars().count() > ADDRESS_MAX_CHARS {
        Some("Address must be 200 characters or less")
    } else {
        None
    }
}

pub fn digit_count(value: &str) -> usize {
    value.chars().filter(char::is_ascii_digit).count()
}
