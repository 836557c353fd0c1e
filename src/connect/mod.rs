//! Connection acquisition workflow: user search, external contact form and
//! the modal that ties them to the connections service.

pub mod form;
pub mod modal;
pub mod relationship;
pub mod search;
pub mod validate;

pub use form::ContactForm;
pub use modal::{ClickTarget, ConnectionModal, Mode, SubmitBlocked, SubmitOutcome, Tab};
pub use relationship::RelationshipSelector;
pub use search::SearchResolver;
pub use validate::{ContactField, FieldErrors};
