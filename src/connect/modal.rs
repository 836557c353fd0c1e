//! The add/edit connection modal.
//!
//! Opening derives the mode from the contact being edited (if any); from then
//! on every transition replaces the [`ModalState`] value as a whole. At most
//! one submission is outstanding at a time: the modal's own `submitting` flag
//! and the contact form's flag are OR-combined, and either vetoes a new
//! submission, a tab switch or a close.

use std::sync::Arc;

use crate::api::{
    ApiResult, ConnectionCandidate, ConnectionKind, ConnectionStatus, ConnectionUpdate,
    ConnectionsApi, EditingContact, NewConnection, SaveReceipt,
};

use super::form::{self, ContactForm, FormBlocked};
use super::relationship::RelationshipSelector;
use super::search::SearchResolver;
use super::validate::ContactField;

pub const SELECT_PROMPT: &str = "Please select a user and a relationship";
pub const RELATIONSHIP_PROMPT: &str = "Please select a relationship";
pub const MALFORMED_SELECTION: &str = "This user cannot be selected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Add,
    EditLinked,
    EditExternal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Search,
    External,
}

impl Tab {
    pub fn title(self) -> &'static str {
        match self {
            Tab::Search => "FIND A USER",
            Tab::External => "EXTERNAL CONTACT",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Tab::Search => Tab::External,
            Tab::External => Tab::Search,
        }
    }
}

/// Where a click inside the modal layer landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    Backdrop,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalState {
    pub mode: Mode,
    pub active_tab: Tab,
    pub selected_candidate: Option<ConnectionCandidate>,
    pub selected_relationship: String,
    pub submitting: bool,
    /// Submit-level message for the linked flow (prompts and failures)
    pub submit_error: Option<String>,
}

impl ModalState {
    fn opened(editing: Option<&EditingContact>) -> Self {
        match editing {
            None => Self {
                mode: Mode::Add,
                active_tab: Tab::Search,
                selected_candidate: None,
                selected_relationship: String::new(),
                submitting: false,
                submit_error: None,
            },
            Some(EditingContact::Linked(link)) => Self {
                mode: Mode::EditLinked,
                active_tab: Tab::Search,
                selected_candidate: Some(ConnectionCandidate {
                    id: link.connected_user.id.clone(),
                    name: link.connected_user.name.clone(),
                    email: link.connected_user.email.clone(),
                    status: ConnectionStatus::Connected,
                }),
                selected_relationship: link.relationship.clone(),
                submitting: false,
                submit_error: None,
            },
            Some(EditingContact::External(contact)) => Self {
                mode: Mode::EditExternal,
                active_tab: Tab::External,
                selected_candidate: None,
                selected_relationship: contact.relationship.clone(),
                submitting: false,
                submit_error: None,
            },
        }
    }

    /// Tabs can only be toggled while adding
    pub fn shows_tab_toggle(&self) -> bool {
        self.mode == Mode::Add
    }

    /// Which submission path the current mode and tab lead to
    pub fn flow(&self) -> ConnectionKind {
        match (self.mode, self.active_tab) {
            (Mode::EditLinked, _) | (Mode::Add, Tab::Search) => ConnectionKind::Linked,
            (Mode::EditExternal, _) | (Mode::Add, Tab::External) => ConnectionKind::External,
        }
    }

    fn with_tab(self, active_tab: Tab) -> Self {
        Self {
            active_tab,
            submit_error: None,
            ..self
        }
    }

    fn with_candidate(self, selected_candidate: Option<ConnectionCandidate>) -> Self {
        Self {
            selected_candidate,
            submit_error: None,
            ..self
        }
    }

    fn with_relationship(self, selected_relationship: String) -> Self {
        Self {
            selected_relationship,
            submit_error: None,
            ..self
        }
    }

    fn with_error(self, message: &str) -> Self {
        Self {
            submit_error: Some(message.to_string()),
            ..self
        }
    }

    fn started(self) -> Self {
        Self {
            submitting: true,
            submit_error: None,
            ..self
        }
    }

    fn settled(self) -> Self {
        Self {
            submitting: false,
            ..self
        }
    }
}

/// A collaborator call claimed by [`ConnectionModal::begin_submit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingSubmission {
    Add(NewConnection),
    Update {
        contact_id: String,
        update: ConnectionUpdate,
    },
}

impl PendingSubmission {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            PendingSubmission::Add(payload) => payload.kind(),
            PendingSubmission::Update { update, .. } => update.kind(),
        }
    }

    pub async fn dispatch<A>(self, api: &A) -> ApiResult<SaveReceipt>
    where
        A: ConnectionsApi + ?Sized,
    {
        match self {
            PendingSubmission::Add(payload) => api.add_connection(payload).await,
            PendingSubmission::Update { contact_id, update } => {
                api.update_connection(&contact_id, update).await
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitBlocked {
    Closed,
    InFlight,
    MissingSelection,
    MissingRelationship,
    Form(FormBlocked),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Saved {
        kind: ConnectionKind,
        receipt: SaveReceipt,
    },
    Failed {
        kind: ConnectionKind,
        message: String,
    },
    /// A result arrived with nothing outstanding
    Ignored,
}

pub struct ConnectionModal<A> {
    api: Arc<A>,
    state: Option<ModalState>,
    editing: Option<EditingContact>,
    search: SearchResolver<A>,
    form: ContactForm,
    relationships: RelationshipSelector,
}

impl<A> ConnectionModal<A>
where
    A: ConnectionsApi + 'static,
{
    pub fn new(
        api: Arc<A>,
        search: SearchResolver<A>,
        relationships: RelationshipSelector,
    ) -> Self {
        Self {
            api,
            state: None,
            editing: None,
            search,
            form: ContactForm::new(),
            relationships,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&ModalState> {
        self.state.as_ref()
    }

    pub fn editing(&self) -> Option<&EditingContact> {
        self.editing.as_ref()
    }

    pub fn search(&self) -> &SearchResolver<A> {
        &self.search
    }

    pub fn search_mut(&mut self) -> &mut SearchResolver<A> {
        &mut self.search
    }

    pub fn form(&self) -> &ContactForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ContactForm {
        &mut self.form
    }

    pub fn relationships(&self) -> &RelationshipSelector {
        &self.relationships
    }

    pub fn relationships_mut(&mut self) -> &mut RelationshipSelector {
        &mut self.relationships
    }

    /// Either side has a submission outstanding
    pub fn is_submitting(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.submitting) || self.form.is_submitting()
    }

    /// The relationship the active flow would submit
    pub fn current_relationship(&self) -> &str {
        match self.state.as_ref() {
            Some(state) if state.flow() == ConnectionKind::Linked => &state.selected_relationship,
            Some(_) => self.form.value(ContactField::Relationship),
            None => "",
        }
    }

    /// Open the modal, deriving everything from `editing`.
    ///
    /// Returns `false` if the modal was already open.
    pub fn open(&mut self, editing: Option<EditingContact>) -> bool {
        if self.is_open() {
            return false;
        }

        let state = ModalState::opened(editing.as_ref());
        self.form = match &editing {
            Some(EditingContact::External(contact)) => ContactForm::editing(contact.to_draft()),
            _ => ContactForm::new(),
        };
        self.search.reset();
        self.relationships.disabled = false;
        self.relationships.sync(&state.selected_relationship);

        tracing::debug!(mode = ?state.mode, "connection modal opened");
        self.state = Some(state);
        self.editing = editing;
        true
    }

    /// Close unless a submission is outstanding.
    ///
    /// Returns `true` when the modal actually closed; the caller hides it then.
    pub fn close(&mut self) -> bool {
        if !self.is_open() || self.is_submitting() {
            return false;
        }
        self.state = None;
        self.editing = None;
        self.search.reset();
        self.form = ContactForm::new();
        true
    }

    /// Only a click on the backdrop itself closes the modal
    pub fn click(&mut self, target: ClickTarget) -> bool {
        match target {
            ClickTarget::Backdrop => self.close(),
            ClickTarget::Content => false,
        }
    }

    pub fn switch_tab(&mut self, tab: Tab) -> bool {
        let allowed = self
            .state
            .as_ref()
            .is_some_and(|s| s.shows_tab_toggle() && s.active_tab != tab);
        if !allowed || self.is_submitting() {
            return false;
        }
        self.transition(|state| state.with_tab(tab));
        let relationship = self.current_relationship().to_string();
        self.relationships.sync(&relationship);
        true
    }

    /// Pick a search result as the user to connect with.
    ///
    /// Candidates that are already connected or pending are ignored; a
    /// candidate without an identifier is refused with a notice.
    pub fn select_candidate(&mut self, candidate: &ConnectionCandidate) -> bool {
        let allowed = self
            .state
            .as_ref()
            .is_some_and(|s| s.mode == Mode::Add && s.active_tab == Tab::Search);
        if !allowed || self.is_submitting() {
            return false;
        }

        if candidate.id.trim().is_empty() {
            tracing::warn!(name = %candidate.name, "refusing to select candidate without an id");
            self.transition(|state| state.with_error(MALFORMED_SELECTION));
            return false;
        }

        let mut chosen = None;
        self.search.select(candidate, |c| chosen = Some(c.clone()));
        match chosen {
            Some(candidate) => {
                self.transition(|state| state.with_candidate(Some(candidate)));
                true
            }
            None => false,
        }
    }

    pub fn clear_candidate(&mut self) {
        let adding = self.state.as_ref().is_some_and(|s| s.mode == Mode::Add);
        if adding && !self.is_submitting() {
            self.transition(|state| state.with_candidate(None));
        }
    }

    /// Change handler for the relationship selector; routed to the active flow
    pub fn set_relationship(&mut self, relationship: impl Into<String>) {
        let Some(flow) = self.state.as_ref().map(ModalState::flow) else {
            return;
        };
        if self.is_submitting() {
            return;
        }
        let relationship = relationship.into();
        self.relationships.sync(&relationship);
        match flow {
            ConnectionKind::Linked => self.transition(|state| state.with_relationship(relationship)),
            ConnectionKind::External => self.form.set_field(ContactField::Relationship, relationship),
        }
    }

    /// Validate the active flow and claim the submission slot.
    pub fn begin_submit(&mut self) -> Result<PendingSubmission, SubmitBlocked> {
        let Some((flow, mode, submitting)) = self
            .state
            .as_ref()
            .map(|s| (s.flow(), s.mode, s.submitting))
        else {
            return Err(SubmitBlocked::Closed);
        };
        if self.is_submitting() {
            return Err(SubmitBlocked::InFlight);
        }

        let pending = match flow {
            ConnectionKind::Linked => self.relationship_submission(mode)?,
            ConnectionKind::External => {
                let draft = self
                    .form
                    .begin_submit(submitting)
                    .map_err(SubmitBlocked::Form)?;
                match self.editing.as_ref() {
                    Some(contact) if mode == Mode::EditExternal => PendingSubmission::Update {
                        contact_id: contact.id().to_string(),
                        update: ConnectionUpdate::External(draft),
                    },
                    _ => PendingSubmission::Add(NewConnection::External(draft)),
                }
            }
        };

        tracing::info!(kind = pending.kind().as_str(), "connection submission started");
        self.transition(ModalState::started);
        self.relationships.disabled = true;
        Ok(pending)
    }

    /// Add-linked and update-linked differ only in whether the user is fixed
    fn relationship_submission(&mut self, mode: Mode) -> Result<PendingSubmission, SubmitBlocked> {
        let (candidate_id, relationship) = match self.state.as_ref() {
            Some(state) => (
                state.selected_candidate.as_ref().map(|c| c.id.clone()),
                state.selected_relationship.trim().to_string(),
            ),
            None => return Err(SubmitBlocked::Closed),
        };

        if mode == Mode::EditLinked {
            let contact_id = self.editing.as_ref().map(|c| c.id().to_string());
            return match contact_id {
                Some(contact_id) if !relationship.is_empty() => Ok(PendingSubmission::Update {
                    contact_id,
                    update: ConnectionUpdate::Linked { relationship },
                }),
                _ => {
                    self.transition(|state| state.with_error(RELATIONSHIP_PROMPT));
                    Err(SubmitBlocked::MissingRelationship)
                }
            };
        }

        match candidate_id {
            Some(connected_user_id) if !relationship.is_empty() => {
                Ok(PendingSubmission::Add(NewConnection::Linked {
                    connected_user_id,
                    relationship,
                }))
            }
            _ => {
                self.transition(|state| state.with_error(SELECT_PROMPT));
                Err(SubmitBlocked::MissingSelection)
            }
        }
    }

    /// Apply the collaborator's answer for the outstanding submission.
    pub fn finish_submit(&mut self, result: ApiResult<SaveReceipt>) -> SubmitOutcome {
        let Some(state) = self.state.as_ref() else {
            return SubmitOutcome::Ignored;
        };
        if !self.is_submitting() {
            tracing::warn!("submission result arrived with nothing outstanding");
            return SubmitOutcome::Ignored;
        }

        let kind = state.flow();
        let mode = state.mode;
        self.transition(ModalState::settled);
        self.relationships.disabled = false;

        match kind {
            ConnectionKind::Linked => match result {
                Ok(receipt) => {
                    tracing::info!(id = ?receipt.id, "linked connection saved");
                    if mode == Mode::Add {
                        self.transition(|state| state.with_candidate(None).with_relationship(String::new()));
                    }
                    SubmitOutcome::Saved { kind, receipt }
                }
                Err(err) => {
                    tracing::error!(error = %err, "linked connection submission failed");
                    let message = form::submit_error_message(&err);
                    self.transition(|state| state.with_error(&message));
                    SubmitOutcome::Failed { kind, message }
                }
            },
            ConnectionKind::External => {
                // The form owns error display for external contacts
                let receipt = result.clone().ok();
                self.form.finish_submit(result.map(|_| ()));
                match receipt {
                    Some(receipt) => {
                        tracing::info!(id = ?receipt.id, "external contact saved");
                        SubmitOutcome::Saved { kind, receipt }
                    }
                    None => SubmitOutcome::Failed {
                        kind,
                        message: self.form.submit_error().unwrap_or_default().to_string(),
                    },
                }
            }
        }
    }

    /// Begin, call the service, and finish in one go
    pub async fn submit(&mut self) -> Result<SubmitOutcome, SubmitBlocked> {
        let pending = self.begin_submit()?;
        let api = Arc::clone(&self.api);
        let result = pending.dispatch(api.as_ref()).await;
        Ok(self.finish_submit(result))
    }

    fn transition<F>(&mut self, f: F)
    where
        F: FnOnce(ModalState) -> ModalState,
    {
        self.state = self.state.take().map(f);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::fake::{candidate, Call, FakeApi};
    use crate::api::{
        ApiError, ConnectedUser, ExternalContact, ExternalContactDraft, LinkedConnection,
    };
    use crate::connect::search::DEFAULT_DEBOUNCE;

    fn modal(api: FakeApi) -> (Arc<FakeApi>, ConnectionModal<FakeApi>) {
        let api = Arc::new(api);
        let search = SearchResolver::new(Arc::clone(&api), Some("me".into()), DEFAULT_DEBOUNCE);
        let modal = ConnectionModal::new(
            Arc::clone(&api),
            search,
            RelationshipSelector::new(Vec::new()),
        );
        (api, modal)
    }

    fn linked() -> EditingContact {
        EditingContact::Linked(LinkedConnection {
            id: "conn-1".into(),
            connected_user: ConnectedUser {
                id: "u7".into(),
                name: "Ana Lee".into(),
                email: Some("ana@example.com".into()),
                phone: None,
            },
            relationship: "Sister".into(),
            created_at: None,
        })
    }

    fn external() -> EditingContact {
        EditingContact::External(ExternalContact {
            id: "rel-3".into(),
            name: "Bob Ray".into(),
            phone: "555 123 4567".into(),
            address: None,
            relationship: "Neighbor".into(),
            created_at: None,
        })
    }

    fn fill_form(modal: &mut ConnectionModal<FakeApi>) {
        let form = modal.form_mut();
        form.set_field(ContactField::Name, " Al ");
        form.set_field(ContactField::Phone, "1234567890");
        form.set_field(ContactField::Relationship, "Sibling");
    }

    #[tokio::test]
    async fn test_open_without_contact_starts_in_add_search() {
        let (_, mut modal) = modal(FakeApi::new());
        assert!(modal.open(None));
        let state = modal.state().unwrap();
        assert_eq!(state.mode, Mode::Add);
        assert_eq!(state.active_tab, Tab::Search);
        assert!(state.shows_tab_toggle());
        assert!(!modal.open(None));
    }

    #[tokio::test]
    async fn test_open_linked_prepopulates_and_hides_tabs() {
        let (_, mut modal) = modal(FakeApi::new());
        modal.open(Some(linked()));
        let state = modal.state().unwrap().clone();
        assert_eq!(state.mode, Mode::EditLinked);
        assert_eq!(state.selected_candidate.as_ref().unwrap().id, "u7");
        assert_eq!(state.selected_relationship, "Sister");
        assert!(!state.shows_tab_toggle());
        assert!(!modal.switch_tab(Tab::External));
    }

    #[tokio::test]
    async fn test_open_external_prefills_form() {
        let (_, mut modal) = modal(FakeApi::new());
        modal.open(Some(external()));
        let state = modal.state().unwrap();
        assert_eq!(state.mode, Mode::EditExternal);
        assert_eq!(state.active_tab, Tab::External);
        assert!(!state.shows_tab_toggle());
        assert!(modal.form().is_edit_mode());
        assert_eq!(modal.form().draft().name, "Bob Ray");
        assert_eq!(modal.current_relationship(), "Neighbor");
    }

    #[tokio::test]
    async fn test_select_respects_connection_status() {
        let (_, mut modal) = modal(FakeApi::new());
        modal.open(None);

        assert!(!modal.select_candidate(&candidate("u2", "Al", ConnectionStatus::PendingSent)));
        assert!(modal.state().unwrap().selected_candidate.is_none());

        assert!(modal.select_candidate(&candidate("u1", "Al", ConnectionStatus::None)));
        assert_eq!(modal.state().unwrap().selected_candidate.as_ref().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_select_without_id_is_refused_locally() {
        let (api, mut modal) = modal(FakeApi::new());
        modal.open(None);
        assert!(!modal.select_candidate(&candidate("", "Ghost", ConnectionStatus::None)));
        let state = modal.state().unwrap();
        assert!(state.selected_candidate.is_none());
        assert_eq!(state.submit_error.as_deref(), Some(MALFORMED_SELECTION));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_linked_requires_candidate_and_relationship() {
        let (api, mut modal) = modal(FakeApi::new());
        modal.open(None);
        modal.set_relationship("Friend");

        assert_eq!(modal.submit().await, Err(SubmitBlocked::MissingSelection));
        assert_eq!(modal.state().unwrap().submit_error.as_deref(), Some(SELECT_PROMPT));
        assert!(!modal.is_submitting());
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test]
    async fn test_add_linked_success_clears_selection_and_stays_open() {
        let (api, mut modal) = modal(FakeApi::new());
        modal.open(None);
        modal.select_candidate(&candidate("u1", "Alice", ConnectionStatus::None));
        modal.set_relationship("Friend");

        let outcome = modal.submit().await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Saved { kind: ConnectionKind::Linked, .. }));
        assert_eq!(
            api.calls(),
            vec![Call::Add(NewConnection::Linked {
                connected_user_id: "u1".into(),
                relationship: "Friend".into(),
            })]
        );
        let state = modal.state().unwrap();
        assert!(state.selected_candidate.is_none());
        assert!(state.selected_relationship.is_empty());
        assert!(!state.submitting);
        assert!(modal.is_open());
    }

    #[tokio::test]
    async fn test_add_linked_failure_is_surfaced() {
        let (_, mut modal) =
            modal(FakeApi::new().with_write_error(ApiError::Rejected("Request already sent".into())));
        modal.open(None);
        modal.select_candidate(&candidate("u1", "Alice", ConnectionStatus::None));
        modal.set_relationship("Friend");

        let outcome = modal.submit().await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Failed {
                kind: ConnectionKind::Linked,
                message: "Request already sent".into(),
            }
        );
        let state = modal.state().unwrap();
        assert_eq!(state.submit_error.as_deref(), Some("Request already sent"));
        assert!(!modal.is_submitting());
        assert!(state.selected_candidate.is_some());
    }

    #[tokio::test]
    async fn test_update_linked_sends_relationship_only() {
        let (api, mut modal) = modal(FakeApi::new());
        modal.open(Some(linked()));
        modal.set_relationship("Friend");
        modal.submit().await.unwrap();
        assert_eq!(
            api.calls(),
            vec![Call::Update {
                id: "conn-1".into(),
                update: ConnectionUpdate::Linked {
                    relationship: "Friend".into()
                },
            }]
        );
        assert_eq!(modal.state().unwrap().selected_relationship, "Friend");
    }

    #[tokio::test]
    async fn test_update_linked_requires_relationship() {
        let (api, mut modal) = modal(FakeApi::new());
        modal.open(Some(linked()));
        modal.set_relationship("");
        assert_eq!(modal.submit().await, Err(SubmitBlocked::MissingRelationship));
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test]
    async fn test_add_external_submits_trimmed_and_resets_form() {
        let (api, mut modal) = modal(FakeApi::new());
        modal.open(None);
        assert!(modal.switch_tab(Tab::External));
        fill_form(&mut modal);

        let outcome = modal.submit().await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Saved { kind: ConnectionKind::External, .. }));
        assert_eq!(
            api.calls(),
            vec![Call::Add(NewConnection::External(ExternalContactDraft {
                name: "Al".into(),
                phone: "1234567890".into(),
                address: None,
                relationship: "Sibling".into(),
            }))]
        );
        assert_eq!(modal.form().draft(), &ExternalContactDraft::default());
    }

    #[tokio::test]
    async fn test_external_failure_is_shown_by_form() {
        let (_, mut modal) =
            modal(FakeApi::new().with_write_error(ApiError::Network("connection reset".into())));
        modal.open(Some(external()));
        let outcome = modal.submit().await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Failed { .. }));
        assert_eq!(modal.form().submit_error(), Some(form::NETWORK_SUBMIT_ERROR));
        assert_eq!(modal.state().unwrap().submit_error, None);
        assert_eq!(modal.form().draft().name, "Bob Ray");
    }

    #[tokio::test]
    async fn test_edit_external_updates_and_keeps_draft() {
        let (api, mut modal) = modal(FakeApi::new());
        let mut contact = external();
        if let EditingContact::External(inner) = &mut contact {
            inner.address = Some("1 Main St".into());
        }
        modal.open(Some(contact));
        modal.form_mut().set_field(ContactField::Name, " Bob Ray Jr ");
        modal.form_mut().set_field(ContactField::Address, "");
        modal.set_relationship("Friend");

        let outcome = modal.submit().await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Saved { kind: ConnectionKind::External, .. }));
        assert_eq!(
            api.calls(),
            vec![Call::Update {
                id: "rel-3".into(),
                update: ConnectionUpdate::External(ExternalContactDraft {
                    name: "Bob Ray Jr".into(),
                    phone: "555 123 4567".into(),
                    address: Some(String::new()),
                    relationship: "Friend".into(),
                }),
            }]
        );
        assert_eq!(modal.form().value(ContactField::Name), " Bob Ray Jr ");
        assert_eq!(modal.form().value(ContactField::Relationship), "Friend");
        assert!(!modal.is_submitting());
        assert!(modal.is_open());
    }

    #[tokio::test]
    async fn test_invalid_external_never_reaches_service() {
        let (api, mut modal) = modal(FakeApi::new());
        modal.open(None);
        modal.switch_tab(Tab::External);
        modal.form_mut().set_field(ContactField::Name, "A");
        let blocked = modal.submit().await.unwrap_err();
        assert!(matches!(blocked, SubmitBlocked::Form(FormBlocked::Invalid(_))));
        assert!(!modal.is_submitting());
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_submission_blocks_everything() {
        let (api, mut modal) = modal(FakeApi::new().with_write_delay(Duration::from_secs(1)));
        modal.open(None);
        modal.select_candidate(&candidate("u1", "Alice", ConnectionStatus::None));
        modal.set_relationship("Friend");

        let pending = modal.begin_submit().unwrap();
        assert_eq!(modal.begin_submit(), Err(SubmitBlocked::InFlight));
        assert!(!modal.switch_tab(Tab::External));
        let before = modal.state().cloned();
        assert!(!modal.close());
        assert!(!modal.click(ClickTarget::Backdrop));
        assert_eq!(modal.state().cloned(), before);

        let result = pending.dispatch(api.as_ref()).await;
        modal.finish_submit(result);
        assert_eq!(api.write_count(), 1);
        assert!(modal.close());
        assert!(!modal.is_open());
    }

    #[tokio::test]
    async fn test_form_guard_vetoes_modal_submit() {
        let (api, mut modal) = modal(FakeApi::new());
        modal.open(None);
        modal.switch_tab(Tab::External);
        fill_form(&mut modal);
        let _pending = modal.begin_submit().unwrap();
        assert!(modal.form().is_submitting());
        assert_eq!(modal.begin_submit(), Err(SubmitBlocked::InFlight));
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test]
    async fn test_content_click_keeps_modal_open() {
        let (_, mut modal) = modal(FakeApi::new());
        modal.open(None);
        assert!(!modal.click(ClickTarget::Content));
        assert!(modal.is_open());
        assert!(modal.click(ClickTarget::Backdrop));
        assert!(!modal.is_open());
    }

    #[tokio::test]
    async fn test_reopen_rederives_state() {
        let (_, mut modal) = modal(FakeApi::new());
        modal.open(None);
        modal.switch_tab(Tab::External);
        modal.form_mut().set_field(ContactField::Name, "Temp");
        assert!(modal.close());

        modal.open(None);
        let state = modal.state().unwrap();
        assert_eq!(state.active_tab, Tab::Search);
        assert!(state.selected_candidate.is_none());
        assert_eq!(modal.form().draft().name, "");
    }

    #[tokio::test]
    async fn test_reopen_for_add_forgets_previous_relationship_highlight() {
        let (_, mut modal) = modal(FakeApi::new());
        modal.open(Some(linked()));
        assert_ne!(modal.relationships().highlighted(), 0);
        assert!(modal.close());

        modal.open(None);
        assert_eq!(modal.relationships().highlighted(), 0);
    }

    #[tokio::test]
    async fn test_finish_without_submission_is_ignored() {
        let (_, mut modal) = modal(FakeApi::new());
        assert_eq!(modal.finish_submit(Ok(SaveReceipt::default())), SubmitOutcome::Ignored);
        modal.open(None);
        assert_eq!(modal.finish_submit(Ok(SaveReceipt::default())), SubmitOutcome::Ignored);
    }
}
