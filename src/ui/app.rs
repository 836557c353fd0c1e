use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tui_widgets::popup::PopupState;

use crate::api::{
    ApiResult, ConnectionKind, ConnectionList, ConnectionsApi, EditingContact, SaveReceipt,
};
use crate::config::{Config, Keys, UiColors};
use crate::connect::form::{submit_error_message, FormBlocked};
use crate::connect::modal::{Mode, SubmitBlocked, SubmitOutcome};
use crate::connect::{
    ClickTarget, ConnectionModal, ContactField, RelationshipSelector, SearchResolver,
};

use super::draw;
use super::edit::{EditTarget, InlineEditor};

const TICK: Duration = Duration::from_millis(50);

/// Results of background work, delivered to the UI thread
#[derive(Debug)]
pub enum AppEvent {
    ConnectionsLoaded(ApiResult<ConnectionList>),
    Submitted(ApiResult<SaveReceipt>),
    Deleted {
        name: String,
        result: ApiResult<SaveReceipt>,
    },
}

/// Which part of the connection popup receives keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalFocus {
    Query,
    Results,
    Relationship,
    Field(ContactField),
}

impl ModalFocus {
    fn edit_target(self) -> Option<EditTarget> {
        match self {
            ModalFocus::Query => Some(EditTarget::Query),
            ModalFocus::Field(field) => Some(EditTarget::Field(field)),
            ModalFocus::Results | ModalFocus::Relationship => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmModal {
    pub title: String,
    pub message: String,
    pub action: ConfirmAction,
}

#[derive(Debug, Clone)]
pub enum ConfirmAction {
    Delete { id: String, name: String },
}

pub struct App<A> {
    api: Arc<A>,
    user_id: String,
    pub phone_region: Option<String>,
    pub keys: Keys,
    colors: UiColors,
    pub connections: Vec<EditingContact>,
    pub selected: usize,
    pub loading: bool,
    pub modal: ConnectionModal<A>,
    pub focus: ModalFocus,
    pub result_index: usize,
    pub editor: InlineEditor,
    pub confirm_modal: Option<ConfirmModal>,
    pub confirm_popup: PopupState,
    /// Where the connection popup was last drawn; clicks outside it hit the backdrop
    pub modal_area: Option<Rect>,
    pub status: Option<String>,
    tx: UnboundedSender<AppEvent>,
    rx: UnboundedReceiver<AppEvent>,
}

impl<A> App<A>
where
    A: ConnectionsApi + 'static,
{
    /// Must be called from within a tokio runtime context.
    pub fn new(api: Arc<A>, config: &Config) -> Self {
        let search = SearchResolver::new(
            Arc::clone(&api),
            Some(config.user_id.clone()),
            config.search.debounce,
        );
        let relationships = RelationshipSelector::new(config.relationships.clone());
        let modal = ConnectionModal::new(Arc::clone(&api), search, relationships);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut app = Self {
            api,
            user_id: config.user_id.clone(),
            phone_region: config.phone_region.clone(),
            keys: config.keys.clone(),
            colors: config.ui.colors.clone(),
            connections: Vec::new(),
            selected: 0,
            loading: false,
            modal,
            focus: ModalFocus::Query,
            result_index: 0,
            editor: InlineEditor::default(),
            confirm_modal: None,
            confirm_popup: PopupState::default(),
            modal_area: None,
            status: None,
            tx,
            rx,
        };
        app.refresh();
        app
    }

    pub fn ui_colors(&self) -> &UiColors {
        &self.colors
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn selected_contact(&self) -> Option<&EditingContact> {
        self.connections.get(self.selected)
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop<B>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        B: ratatui::backend::Backend,
    {
        loop {
            draw::render(terminal, self)?;

            if event::poll(TICK)? {
                match event::read()? {
                    Event::Key(key) => {
                        if self.handle_key(key)? {
                            break;
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    _ => {}
                }
            }

            self.process_events();
        }
        tracing::info!("kinlink exiting");
        Ok(())
    }

    // =========================================================================
    // Background work
    // =========================================================================

    /// Apply everything background tasks have finished since the last tick
    fn process_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.apply_event(event);
        }
        if self.modal.search_mut().pump() {
            self.clamp_result_index();
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ConnectionsLoaded(result) => {
                self.loading = false;
                match result {
                    Ok(list) => {
                        self.connections = list.entries();
                        self.selected = self.selected.min(self.connections.len().saturating_sub(1));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to load connections");
                        self.set_status(format!("Could not load connections: {}", err));
                    }
                }
            }
            AppEvent::Submitted(result) => self.finish_submit(result),
            AppEvent::Deleted { name, result } => match result {
                Ok(_) => {
                    tracing::info!(name = %name, "connection deleted");
                    self.set_status(format!("Removed {}", name));
                    self.refresh();
                }
                Err(err) => {
                    tracing::error!(error = %err, "delete failed");
                    self.set_status(submit_error_message(&err));
                }
            },
        }
    }

    fn refresh(&mut self) {
        self.loading = true;
        let api = Arc::clone(&self.api);
        let user_id = self.user_id.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.list_connections(&user_id).await;
            let _ = tx.send(AppEvent::ConnectionsLoaded(result));
        });
    }

    fn submit(&mut self) {
        match self.modal.begin_submit() {
            Ok(pending) => {
                self.set_status("Saving...");
                let api = Arc::clone(&self.api);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = pending.dispatch(api.as_ref()).await;
                    let _ = tx.send(AppEvent::Submitted(result));
                });
            }
            Err(SubmitBlocked::InFlight) => self.set_status("Already saving, please wait"),
            Err(SubmitBlocked::Form(FormBlocked::Invalid(errors))) => {
                if let Some(field) = errors.fields().first() {
                    self.focus_to(match field {
                        ContactField::Relationship => ModalFocus::Relationship,
                        other => ModalFocus::Field(*other),
                    });
                }
                self.set_status("Please fix the highlighted fields");
            }
            Err(_) => {
                let notice = self
                    .modal
                    .state()
                    .and_then(|state| state.submit_error.clone());
                if let Some(notice) = notice {
                    self.set_status(notice);
                }
            }
        }
    }

    fn finish_submit(&mut self, result: ApiResult<SaveReceipt>) {
        match self.modal.finish_submit(result) {
            SubmitOutcome::Saved { kind, receipt } => {
                let fallback = match kind {
                    ConnectionKind::Linked => "Connection saved",
                    ConnectionKind::External => "Contact saved",
                };
                let message = if receipt.message.trim().is_empty() {
                    fallback.to_string()
                } else {
                    receipt.message
                };
                // Success hands control back to the list
                self.close_modal();
                self.set_status(message);
                self.refresh();
            }
            SubmitOutcome::Failed { message, .. } => self.set_status(message),
            SubmitOutcome::Ignored => {}
        }
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// Returns `true` when the app should quit
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Ctrl+C always quits (hardcoded for safety)
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
        {
            return Ok(true);
        }

        if self.confirm_modal.is_some() {
            self.handle_confirm_modal_key(key);
            return Ok(false);
        }

        if self.modal.is_open() {
            self.handle_modal_key(key);
            return Ok(false);
        }

        Ok(self.handle_list_key(key))
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        if !matches!(mouse.kind, MouseEventKind::Down(MouseButton::Left)) || !self.modal.is_open() {
            return;
        }
        let inside = self
            .modal_area
            .is_some_and(|area| contains(area, mouse.column, mouse.row));
        let target = if inside {
            ClickTarget::Content
        } else {
            ClickTarget::Backdrop
        };
        if self.modal.click(target) {
            self.after_close();
        } else if target == ClickTarget::Backdrop && self.modal.is_submitting() {
            self.set_status("Already saving, please wait");
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> bool {
        let keys = &self.keys.list;
        if key_matches_any(&key, &keys.quit) {
            return true;
        }
        if key_matches_any(&key, &keys.next) {
            if self.selected + 1 < self.connections.len() {
                self.selected += 1;
            }
        } else if key_matches_any(&key, &keys.prev) {
            self.selected = self.selected.saturating_sub(1);
        } else if key_matches_any(&key, &keys.add) {
            self.open_modal(None);
        } else if key_matches_any(&key, &keys.edit) {
            if let Some(contact) = self.selected_contact().cloned() {
                self.open_modal(Some(contact));
            }
        } else if key_matches_any(&key, &keys.delete) {
            let confirm = self.selected_contact().map(|contact| {
                let name = contact.display_name().to_string();
                ConfirmModal {
                    title: "REMOVE CONNECTION".to_string(),
                    message: format!("Remove {} ({})?", name, contact.relationship()),
                    action: ConfirmAction::Delete {
                        id: contact.id().to_string(),
                        name,
                    },
                }
            });
            if confirm.is_some() {
                self.confirm_modal = confirm;
            }
        } else if key_matches_any(&key, &keys.refresh) {
            self.set_status("Refreshing...");
            self.refresh();
        }
        false
    }

    fn handle_confirm_modal_key(&mut self, key: KeyEvent) {
        let Some(modal) = self.confirm_modal.take() else {
            return;
        };

        if key_matches_any(&key, &self.keys.confirm.accept) {
            match modal.action {
                ConfirmAction::Delete { id, name } => {
                    self.set_status(format!("Removing {}...", name));
                    let api = Arc::clone(&self.api);
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let result = api.delete_connection(&id).await;
                        let _ = tx.send(AppEvent::Deleted { name, result });
                    });
                }
            }
            return;
        }

        if key_matches_any(&key, &self.keys.confirm.reject) {
            return;
        }

        self.confirm_modal = Some(modal);
    }

    fn open_modal(&mut self, editing: Option<EditingContact>) {
        if !self.modal.open(editing) {
            return;
        }
        self.result_index = 0;
        self.status = None;
        let first = self.focus_order().first().copied().unwrap_or(ModalFocus::Query);
        self.focus_to(first);
    }

    fn close_modal(&mut self) {
        if self.modal.close() {
            self.after_close();
        } else if self.modal.is_submitting() {
            self.set_status("Already saving, please wait");
        }
    }

    fn after_close(&mut self) {
        self.editor.cancel();
        self.modal_area = None;
    }

    /// Focusable parts of the popup for the active mode and tab
    pub fn focus_order(&self) -> Vec<ModalFocus> {
        let Some(state) = self.modal.state() else {
            return Vec::new();
        };
        match (state.flow(), state.mode) {
            (ConnectionKind::Linked, Mode::EditLinked) => vec![ModalFocus::Relationship],
            (ConnectionKind::Linked, _) => vec![
                ModalFocus::Query,
                ModalFocus::Results,
                ModalFocus::Relationship,
            ],
            (ConnectionKind::External, _) => vec![
                ModalFocus::Field(ContactField::Name),
                ModalFocus::Field(ContactField::Phone),
                ModalFocus::Field(ContactField::Address),
                ModalFocus::Relationship,
            ],
        }
    }

    fn focus_to(&mut self, focus: ModalFocus) {
        self.focus = focus;
        match focus.edit_target() {
            Some(target) => {
                let current = match target {
                    EditTarget::Query => self.modal.search().query().to_string(),
                    EditTarget::Field(field) => self.modal.form().value(field).to_string(),
                };
                self.editor.start(&current, target);
            }
            None => self.editor.cancel(),
        }
    }

    fn cycle_focus(&mut self, forward: bool) {
        let order = self.focus_order();
        if order.is_empty() {
            return;
        }
        let index = order.iter().position(|f| *f == self.focus).unwrap_or(0);
        let next = if forward {
            (index + 1) % order.len()
        } else {
            (index + order.len() - 1) % order.len()
        };
        self.focus_to(order[next]);
    }

    fn handle_modal_key(&mut self, key: KeyEvent) {
        let keys = &self.keys.modal;
        if key_matches_any(&key, &keys.close) {
            self.close_modal();
            return;
        }
        if key_matches_any(&key, &keys.submit) {
            self.submit();
            return;
        }
        if key_matches_any(&key, &keys.toggle_tab) {
            let tab = self.modal.state().map(|s| s.active_tab.toggled());
            if let Some(tab) = tab {
                if self.modal.switch_tab(tab) {
                    let first = self.focus_order().first().copied().unwrap_or(ModalFocus::Query);
                    self.focus_to(first);
                }
            }
            return;
        }
        if key_matches_any(&key, &keys.next_field) {
            self.cycle_focus(true);
            return;
        }
        if key_matches_any(&key, &keys.prev_field) {
            self.cycle_focus(false);
            return;
        }

        if self.modal.is_submitting() {
            return;
        }

        match self.focus {
            ModalFocus::Query => match key.code {
                KeyCode::Enter | KeyCode::Down => self.focus_to(ModalFocus::Results),
                _ => {
                    if let Some(value) = self.editor.handle_key_event(key) {
                        self.modal.search_mut().set_query(value);
                        self.result_index = 0;
                    }
                }
            },
            ModalFocus::Field(field) => {
                if key.code == KeyCode::Enter {
                    self.cycle_focus(true);
                } else if let Some(value) = self.editor.handle_key_event(key) {
                    self.modal.form_mut().set_field(field, value);
                }
            }
            ModalFocus::Results => self.handle_results_key(key),
            ModalFocus::Relationship => self.handle_relationship_key(key),
        }
    }

    fn handle_results_key(&mut self, key: KeyEvent) {
        let count = self.modal.search().results().len();
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                if self.result_index + 1 < count {
                    self.result_index += 1;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if self.result_index == 0 {
                    self.focus_to(ModalFocus::Query);
                } else {
                    self.result_index -= 1;
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                let candidate = self.modal.search().results().get(self.result_index).cloned();
                if let Some(candidate) = candidate {
                    if self.modal.select_candidate(&candidate) {
                        self.focus_to(ModalFocus::Relationship);
                    } else if !candidate.is_selectable() {
                        self.set_status(format!("{}: {}", candidate.name, candidate.status.label()));
                    }
                }
            }
            KeyCode::Delete | KeyCode::Backspace => self.modal.clear_candidate(),
            _ => {}
        }
    }

    fn handle_relationship_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Left | KeyCode::Up | KeyCode::Char('k') => {
                self.modal.relationships_mut().prev();
            }
            KeyCode::Right | KeyCode::Down | KeyCode::Char('j') => {
                self.modal.relationships_mut().next();
            }
            KeyCode::Enter | KeyCode::Char(' ') => {}
            _ => return,
        }
        let mut chosen = None;
        self.modal.relationships().commit(|value| chosen = Some(value));
        if let Some(value) = chosen {
            self.modal.set_relationship(value);
        }
    }

    fn clamp_result_index(&mut self) {
        let count = self.modal.search().results().len();
        self.result_index = self.result_index.min(count.saturating_sub(1));
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

/// Check if the key event matches any of the bindings in the list
pub fn key_matches_any(event: &KeyEvent, bindings: &[String]) -> bool {
    bindings.iter().any(|b| key_matches_single(event, b))
}

/// Check if the key event matches a single binding string
fn key_matches_single(event: &KeyEvent, binding: &str) -> bool {
    let trimmed = binding.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_ascii_lowercase();

    if let Some(rest) = lower.strip_prefix("ctrl+") {
        if !event.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        let mut chars = rest.chars();
        return match (chars.next(), chars.next()) {
            (Some(wanted), None) => {
                matches!(event.code, KeyCode::Char(c) if c.to_ascii_lowercase() == wanted)
            }
            _ => false,
        };
    }

    // Other modifiers are only meaningful through the ctrl+ prefix
    let disallowed = KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER;
    if event.modifiers.intersects(disallowed) {
        return false;
    }

    match lower.as_str() {
        "enter" => matches!(event.code, KeyCode::Enter),
        "tab" => matches!(event.code, KeyCode::Tab),
        "backtab" | "shift+tab" => matches!(event.code, KeyCode::BackTab),
        "backspace" => matches!(event.code, KeyCode::Backspace),
        "delete" | "del" => matches!(event.code, KeyCode::Delete),
        "esc" | "escape" => matches!(event.code, KeyCode::Esc),
        "space" => matches!(event.code, KeyCode::Char(' ')),
        "up" => matches!(event.code, KeyCode::Up),
        "down" => matches!(event.code, KeyCode::Down),
        "left" => matches!(event.code, KeyCode::Left),
        "right" => matches!(event.code, KeyCode::Right),
        "pageup" | "page_up" => matches!(event.code, KeyCode::PageUp),
        "pagedown" | "page_down" => matches!(event.code, KeyCode::PageDown),
        "home" => matches!(event.code, KeyCode::Home),
        "end" => matches!(event.code, KeyCode::End),
        // Single character - case-sensitive (m != M, since M requires Shift)
        _ => {
            let mut chars = trimmed.chars();
            if let (Some(first), None) = (chars.next(), chars.next()) {
                matches!(event.code, KeyCode::Char(c) if c == first)
            } else {
                false
            }
        }
    }
}
