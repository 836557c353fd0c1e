use anyhow::Result;
use ratatui::backend::Backend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState};
use ratatui::{Frame, Terminal};
// Use Popup from tui-widgets to render modals
use tui_widgets::popup::Popup;

use crate::api::{ConnectionKind, ConnectionStatus, ConnectionsApi, EditingContact};
use crate::config::RgbColor;
use crate::connect::modal::{Mode, Tab};
use crate::connect::search::is_searchable;
use crate::connect::ContactField;
use crate::phone;

use super::app::{App, ModalFocus};

const LIST_HELP: &str = "a: add  e/Enter: edit  d: remove  r: refresh  q: quit";
const SEARCH_HELP: &str =
    "Type to search  Enter: results  Tab: next  Ctrl+T: external  Ctrl+S: save  Esc: close";
const FORM_HELP: &str = "Tab/Shift+Tab: field  Ctrl+T: find a user  Ctrl+S: save  Esc: close";
const EDIT_HELP: &str = "Left/Right: relationship  Tab: field  Ctrl+S: save  Esc: close";
const CONFIRM_HELP: &str = "Y/Enter: confirm  N/Esc: cancel";
const LABEL_WIDTH: u16 = 14;

pub fn render<B: Backend, A: ConnectionsApi + 'static>(
    terminal: &mut Terminal<B>,
    app: &mut App<A>,
) -> Result<()> {
    terminal.draw(|frame| draw_frame(frame, app))?;
    Ok(())
}

fn draw_frame<A: ConnectionsApi + 'static>(frame: &mut Frame<'_>, app: &mut App<A>) {
    let size = frame.area();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(size);

    draw_header(frame, layout[0], app);
    draw_connections(frame, layout[1], app);
    draw_footer(frame, layout[2], app);
    draw_connection_modal(frame, size, app);
    draw_confirm_modal(frame, size, app);
}

fn draw_header<A: ConnectionsApi + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<A>) {
    let count = app.connections.len();
    let line = Line::from(vec![
        Span::styled("KINLINK", header_text_style(app).add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {}  ", app.user_id())),
        Span::styled(
            format!("{} connection{}", count, if count == 1 { "" } else { "s" }),
            muted_style(app),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_connections<A: ConnectionsApi + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<A>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled("CONNECTIONS", header_text_style(app)));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.connections.is_empty() {
        let message = if app.loading {
            "Loading..."
        } else {
            "No connections yet. Press a to add one."
        };
        frame.render_widget(Paragraph::new(message).style(muted_style(app)), inner);
        return;
    }

    let region = app.phone_region.as_deref();
    let rows: Vec<Row> = app
        .connections
        .iter()
        .map(|entry| match entry {
            EditingContact::Linked(link) => Row::new(vec![
                Cell::from("user"),
                Cell::from(link.connected_user.name.clone()),
                Cell::from(link.relationship.clone()),
                Cell::from(link.connected_user.email.clone().unwrap_or_default()),
            ]),
            EditingContact::External(contact) => Row::new(vec![
                Cell::from("contact"),
                Cell::from(contact.name.clone()),
                Cell::from(contact.relationship.clone()),
                Cell::from(phone::display_phone(&contact.phone, region)),
            ]),
        })
        .collect();

    let header = Row::new(vec!["TYPE", "NAME", "RELATIONSHIP", "CONTACT"]).style(header_text_style(app));
    let widths = [
        Constraint::Length(8),
        Constraint::Percentage(35),
        Constraint::Percentage(20),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .highlight_style(selection_style(app));

    let mut state = TableState::default();
    state.select(Some(app.selected));
    frame.render_stateful_widget(table, inner, &mut state);
}

fn draw_footer<A: ConnectionsApi + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<A>) {
    let help = if app.confirm_modal.is_some() {
        CONFIRM_HELP
    } else if let Some(state) = app.modal.state() {
        match (state.mode, state.flow()) {
            (Mode::EditLinked, _) => EDIT_HELP,
            (_, ConnectionKind::Linked) => SEARCH_HELP,
            (_, ConnectionKind::External) => FORM_HELP,
        }
    } else {
        LIST_HELP
    };
    let message = match &app.status {
        Some(status) => format!("{}  |  {}", status, help),
        None => help.to_string(),
    };

    let colors = app.ui_colors();
    let style = Style::default()
        .fg(color(colors.status_fg))
        .bg(color(colors.status_bg));
    let background = Block::default().style(Style::default().bg(color(colors.status_bg)));
    frame.render_widget(background, area);
    frame.render_widget(Paragraph::new(message).style(style), area);
}

// =============================================================================
// Connection popup
// =============================================================================

fn modal_rect(area: Rect) -> Rect {
    let width = (area.width.saturating_mul(3) / 4).clamp(area.width.min(40), area.width);
    let height = area.height.min(22);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_connection_modal<A: ConnectionsApi + 'static>(
    frame: &mut Frame<'_>,
    area: Rect,
    app: &mut App<A>,
) {
    let Some(state) = app.modal.state().cloned() else {
        app.modal_area = None;
        return;
    };

    let rect = modal_rect(area);
    app.modal_area = Some(rect);

    let title = match state.mode {
        Mode::Add => "ADD CONNECTION",
        Mode::EditLinked => "EDIT CONNECTION",
        Mode::EditExternal => "EDIT CONTACT",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(title, header_text_style(app)));
    let inner = block.inner(rect);
    frame.render_widget(Clear, rect);
    frame.render_widget(block, rect);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let mut body = inner;
    if state.shows_tab_toggle() {
        let tabs = Line::from(
            [Tab::Search, Tab::External]
                .into_iter()
                .flat_map(|tab| {
                    let style = if tab == state.active_tab {
                        selection_style(app)
                    } else {
                        muted_style(app)
                    };
                    [Span::styled(format!(" {} ", tab.title()), style), Span::raw(" ")]
                })
                .collect::<Vec<_>>(),
        );
        frame.render_widget(Paragraph::new(tabs), Rect { height: 1, ..inner });
        body = Rect {
            y: inner.y + 2,
            height: inner.height.saturating_sub(2),
            ..inner
        };
    }

    match (state.mode, state.flow()) {
        (Mode::EditLinked, _) => draw_linked_edit(frame, body, app),
        (_, ConnectionKind::Linked) => draw_user_search(frame, body, app),
        (_, ConnectionKind::External) => draw_contact_form(frame, body, app),
    }
}

fn draw_user_search<A: ConnectionsApi + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<A>) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

    let search = app.modal.search();
    let focused = app.focus == ModalFocus::Query;
    draw_text_row(frame, layout[0], app, "Search", search.query(), focused, None);

    let results_area = layout[1];
    if search.is_loading() {
        frame.render_widget(Paragraph::new("Searching...").style(muted_style(app)), results_area);
    } else if let Some(error) = search.error() {
        frame.render_widget(Paragraph::new(error).style(error_style(app)), results_area);
    } else if search.has_searched() && search.results().is_empty() {
        let message = format!("No users found matching \"{}\"", search.query().trim());
        frame.render_widget(Paragraph::new(message).style(muted_style(app)), results_area);
    } else if !is_searchable(search.query()) {
        frame.render_widget(
            Paragraph::new("Type at least 2 characters to search").style(muted_style(app)),
            results_area,
        );
    } else {
        let items: Vec<ListItem> = search
            .results()
            .iter()
            .map(|candidate| {
                let mut spans = vec![Span::raw(candidate.name.clone())];
                if let Some(email) = &candidate.email {
                    spans.push(Span::styled(format!("  {}", email), muted_style(app)));
                }
                if candidate.status != ConnectionStatus::None {
                    spans.push(Span::styled(
                        format!("  [{}]", candidate.status.label()),
                        header_text_style(app),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();
        let mut list = List::new(items);
        let mut list_state = ListState::default();
        if app.focus == ModalFocus::Results {
            list = list.highlight_style(selection_style(app));
            list_state.select(Some(app.result_index));
        }
        frame.render_stateful_widget(list, results_area, &mut list_state);
    }

    let selected = app
        .modal
        .state()
        .and_then(|state| state.selected_candidate.as_ref())
        .map(|candidate| candidate.name.clone())
        .unwrap_or_else(|| "(none)".to_string());
    draw_text_row(frame, layout[2], app, "Selected", &selected, false, None);
    draw_relationship_row(frame, layout[3], app, None);
    draw_submit_line(frame, layout[4], app, linked_error(app));
}

fn draw_linked_edit<A: ConnectionsApi + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<A>) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);

    let user = app
        .modal
        .state()
        .and_then(|state| state.selected_candidate.as_ref())
        .map(|candidate| match &candidate.email {
            Some(email) => format!("{} ({})", candidate.name, email),
            None => candidate.name.clone(),
        })
        .unwrap_or_default();
    draw_text_row(frame, layout[0], app, "User", &user, false, None);
    draw_relationship_row(frame, layout[1], app, None);
    draw_submit_line(frame, layout[2], app, linked_error(app));
}

fn draw_contact_form<A: ConnectionsApi + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<A>) {
    let mut constraints: Vec<Constraint> = ContactField::ALL
        .iter()
        .map(|_| Constraint::Length(2))
        .collect();
    constraints.push(Constraint::Length(1));
    constraints.push(Constraint::Min(0));
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let form = app.modal.form();
    for (index, field) in ContactField::ALL.into_iter().enumerate() {
        let error = form.errors().get(field);
        if field == ContactField::Relationship {
            draw_relationship_row(frame, layout[index], app, error);
            continue;
        }
        let focused = app.focus == ModalFocus::Field(field);
        draw_text_row(frame, layout[index], app, field.label(), form.value(field), focused, error);
    }

    draw_submit_line(frame, layout[ContactField::ALL.len()], app, form.submit_error());
}

/// Label, value and an optional error line underneath
fn draw_text_row<A: ConnectionsApi + 'static>(
    frame: &mut Frame<'_>,
    area: Rect,
    app: &App<A>,
    label: &str,
    value: &str,
    focused: bool,
    error: Option<&str>,
) {
    if area.height == 0 {
        return;
    }
    let shown = if focused { app.editor.value() } else { value };
    let label_style = if focused {
        header_text_style(app).add_modifier(Modifier::BOLD)
    } else {
        header_text_style(app)
    };
    let line = Line::from(vec![
        Span::styled(format!("{:<width$}", label, width = LABEL_WIDTH as usize), label_style),
        Span::raw(shown.to_string()),
    ]);
    frame.render_widget(Paragraph::new(line), Rect { height: 1, ..area });

    if focused {
        let x = area.x + LABEL_WIDTH + app.editor.visual_cursor() as u16;
        if x < area.x + area.width {
            frame.set_cursor_position((x, area.y));
        }
    }

    if let (Some(error), true) = (error, area.height > 1) {
        let error_line = Line::from(vec![
            Span::raw(" ".repeat(LABEL_WIDTH as usize)),
            Span::styled(error.to_string(), error_style(app)),
        ]);
        frame.render_widget(
            Paragraph::new(error_line),
            Rect {
                y: area.y + 1,
                height: 1,
                ..area
            },
        );
    }
}

fn draw_relationship_row<A: ConnectionsApi + 'static>(
    frame: &mut Frame<'_>,
    area: Rect,
    app: &App<A>,
    error: Option<&str>,
) {
    if area.height == 0 {
        return;
    }
    let focused = app.focus == ModalFocus::Relationship;
    let selector = app.modal.relationships();
    let current = app.modal.current_relationship();

    let value = if focused {
        let highlighted = selector
            .options()
            .get(selector.highlighted())
            .map(String::as_str)
            .unwrap_or("");
        format!("< {} >", highlighted)
    } else if current.is_empty() {
        "(choose)".to_string()
    } else {
        current.to_string()
    };

    let mut spans = vec![
        Span::styled(
            format!("{:<width$}", "Relationship", width = LABEL_WIDTH as usize),
            header_text_style(app),
        ),
        if focused {
            Span::styled(value, selection_style(app))
        } else {
            Span::raw(value)
        },
    ];
    if focused && !current.is_empty() {
        spans.push(Span::styled(format!("  current: {}", current), muted_style(app)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), Rect { height: 1, ..area });

    if let (Some(error), true) = (error, area.height > 1) {
        let error_line = Line::from(vec![
            Span::raw(" ".repeat(LABEL_WIDTH as usize)),
            Span::styled(error.to_string(), error_style(app)),
        ]);
        frame.render_widget(
            Paragraph::new(error_line),
            Rect {
                y: area.y + 1,
                height: 1,
                ..area
            },
        );
    }
}

fn linked_error<A: ConnectionsApi + 'static>(app: &App<A>) -> Option<&str> {
    app.modal
        .state()
        .and_then(|state| state.submit_error.as_deref())
}

fn draw_submit_line<A: ConnectionsApi + 'static>(
    frame: &mut Frame<'_>,
    area: Rect,
    app: &App<A>,
    error: Option<&str>,
) {
    if area.height == 0 {
        return;
    }
    let line = if app.modal.is_submitting() {
        Line::from(Span::styled("Saving...", muted_style(app)))
    } else if let Some(error) = error {
        Line::from(Span::styled(error.to_string(), error_style(app)))
    } else {
        return;
    };
    frame.render_widget(Paragraph::new(line), Rect { height: 1, ..area });
}

fn draw_confirm_modal<A: ConnectionsApi + 'static>(
    frame: &mut Frame<'_>,
    area: Rect,
    app: &mut App<A>,
) {
    let Some(modal) = app.confirm_modal.as_ref() else {
        return;
    };

    let body_text = Text::from(vec![
        Line::from(modal.message.clone()),
        Line::from(""),
        Line::from(CONFIRM_HELP),
    ]);
    let title_line = Line::from(Span::styled(modal.title.clone(), header_text_style(app)));
    let popup = Popup::new(body_text)
        .title(title_line)
        .border_style(border_style(app));

    frame.render_stateful_widget_ref(popup, area, &mut app.confirm_popup);
}

// =============================================================================
// Styles
// =============================================================================

fn selection_style<A: ConnectionsApi + 'static>(app: &App<A>) -> Style {
    let colors = app.ui_colors();
    Style::default()
        .fg(color(colors.selection_fg))
        .bg(color(colors.selection_bg))
}

fn border_style<A: ConnectionsApi + 'static>(app: &App<A>) -> Style {
    Style::default().fg(color(app.ui_colors().border))
}

fn header_text_style<A: ConnectionsApi + 'static>(app: &App<A>) -> Style {
    Style::default().fg(color(app.ui_colors().border))
}

fn muted_style<A: ConnectionsApi + 'static>(app: &App<A>) -> Style {
    Style::default().fg(color(app.ui_colors().muted))
}

fn error_style<A: ConnectionsApi + 'static>(app: &App<A>) -> Style {
    Style::default().fg(color(app.ui_colors().error))
}

fn color(rgb: RgbColor) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modal_rect_is_centered_and_fits() {
        let area = Rect::new(0, 0, 100, 40);
        let rect = modal_rect(area);
        assert_eq!(rect.width, 75);
        assert_eq!(rect.height, 22);
        assert_eq!(rect.x, 12);
        assert_eq!(rect.y, 9);

        let tiny = Rect::new(0, 0, 20, 5);
        let rect = modal_rect(tiny);
        assert!(rect.width <= 20 && rect.height <= 5);
    }
}
