//! Terminal rendering of the membership application wizard.
//!
//! One page per section: scalar fields, single-file attachments, repeating
//! records and multi-file slots, with inline field errors, a banner for
//! save/upload failures and a `[ Back ] [ Save & Next ] [ Quit ]` button row.
//!
//! Logging is file-only while the TUI owns the terminal.

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::{error, info};
use ratatui::backend::{CrosstermBackend, TestBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use uuid::Uuid;

use crate::client::InMemoryBackend;
use crate::hooks::SectionHook;
use crate::models::document::DocumentState;
use crate::models::section::{DocumentSlot, RepeatingList, SectionId};
use crate::store::DraftStore;
use crate::widgets::fields::{toggle_yes_no, FieldKind, FieldSpec, FieldValue};
use crate::widgets::upload::UploadConfig;
use crate::wizard::{sample, StepError, StepOutcome, WizardController};

const WINDOW_TITLE: &str = "Membership Application";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonFocus {
    Back,
    Next,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Row(usize),
    Button(ButtonFocus),
}

/// One focusable line of the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Row {
    Field(FieldSpec),
    Document {
        key: &'static str,
        label: &'static str,
    },
    List(RepeatingList),
    ItemField {
        list: RepeatingList,
        index: usize,
        spec: FieldSpec,
    },
    ItemDocument {
        list: RepeatingList,
        index: usize,
    },
    Multi {
        key: &'static str,
        label: &'static str,
        max_files: usize,
    },
}

impl Row {
    fn slot(&self) -> Option<DocumentSlot> {
        match self {
            Row::Document { key, .. } => Some(DocumentSlot::field(key)),
            Row::ItemDocument { list, index } => Some(DocumentSlot::Item {
                list: *list,
                index: *index,
            }),
            _ => None,
        }
    }

    fn takes_path(&self) -> bool {
        matches!(
            self,
            Row::Document { .. } | Row::ItemDocument { .. } | Row::Multi { .. }
        )
    }

    /// Key used for inline validation errors.
    fn error_key(&self) -> String {
        match self {
            Row::Field(spec) => spec.name.to_string(),
            Row::Document { key, .. } | Row::Multi { key, .. } => key.to_string(),
            Row::List(list) => list.key().to_string(),
            Row::ItemField { list, index, spec } => {
                format!("{}[{}].{}", list.key(), index, spec.name)
            }
            Row::ItemDocument { list, index } => {
                format!("{}[{}].{}", list.key(), index, list.document_key())
            }
        }
    }
}

struct TuiState {
    focus: Focus,
    /// Path typed on a document row; cleared when focus moves.
    path_input: String,
    notice: Option<String>,
    quit: bool,
}

impl TuiState {
    fn new() -> Self {
        Self {
            focus: Focus::Row(0),
            path_input: String::new(),
            notice: None,
            quit: false,
        }
    }
}

fn rows_for(hook: &SectionHook) -> Vec<Row> {
    let data = hook.data();
    let mut rows: Vec<Row> = data.fields().iter().copied().map(Row::Field).collect();
    rows.extend(data.document_specs().iter().map(|d| Row::Document {
        key: d.key,
        label: d.label,
    }));
    for list in data.lists() {
        rows.push(Row::List(*list));
        let len = data.list_len(*list).unwrap_or(0);
        for index in 0..len {
            rows.extend(list.fields().iter().map(|spec| Row::ItemField {
                list: *list,
                index,
                spec: *spec,
            }));
            rows.push(Row::ItemDocument { list: *list, index });
        }
    }
    rows.extend(data.multi_document_specs().iter().map(|m| Row::Multi {
        key: m.key,
        label: m.label,
        max_files: m.max_files,
    }));
    rows
}

fn current_rows(wizard: &WizardController) -> Vec<Row> {
    wizard.current_hook().map(rows_for).unwrap_or_default()
}

fn focused_row(state: &TuiState, wizard: &WizardController) -> Option<Row> {
    match state.focus {
        Focus::Row(i) => current_rows(wizard).get(i).cloned(),
        Focus::Button(_) => None,
    }
}

fn next_label(wizard: &WizardController) -> &'static str {
    if wizard.current_step() >= wizard.total_steps() {
        "Submit"
    } else {
        "Save & Next"
    }
}

// =========================
// Entry points
// =========================

pub fn run(rt: &Runtime, mut wizard: WizardController) -> Result<()> {
    info!("[PHASE: tui] [STEP: start] Starting application wizard");

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, rt, &mut wizard);
    restore_terminal(&mut terminal)?;

    result
}

/// Render a single frame of the wizard at `target` and return the screen text.
///
/// Targets: a step number, a section id (`financialThresholds`), or `complete`.
/// Earlier steps are filled with sample data against an in-memory backend.
pub fn smoke(target: &str) -> Result<String> {
    info!(
        "[PHASE: tui] [STEP: smoke] Rendering single-frame TUI smoke target={}",
        target
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let store = Arc::new(DraftStore::new(Arc::new(InMemoryBackend::new())));
    let mut wizard = WizardController::new(store, UploadConfig::default());
    rt.block_on(wizard.start())?;

    let t = target.trim();
    let stop_at = if t.eq_ignore_ascii_case("complete") {
        wizard.total_steps() + 1
    } else if let Ok(n) = t.parse::<usize>() {
        n.clamp(1, wizard.total_steps())
    } else {
        let id = SectionId::parse(t)
            .ok_or_else(|| anyhow::anyhow!("Unknown smoke target '{}'", target))?;
        wizard
            .membership_type()
            .step_of(id)
            .ok_or_else(|| anyhow::anyhow!("{} is not part of this application", id))?
    };

    let files = std::env::temp_dir().join(format!("member-portal-smoke-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&files)?;
    let walked = walk_to(&rt, &mut wizard, stop_at, &files);
    if let Err(e) = std::fs::remove_dir_all(&files) {
        log::warn!("[PHASE: tui] [STEP: smoke] Could not remove {:?}: {}", files, e);
    }
    walked?;

    let state = TuiState::new();
    let backend = TestBackend::new(100, 32);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| draw(f.size(), f, &state, &wizard))?;
    Ok(buffer_text(terminal.backend()))
}

fn walk_to(
    rt: &Runtime,
    wizard: &mut WizardController,
    stop_at: usize,
    files: &std::path::Path,
) -> Result<(), StepError> {
    while wizard.current_step() < stop_at && !wizard.is_completed() {
        let Some(id) = wizard.current_section() else {
            break;
        };
        rt.block_on(async {
            sample::fill_section(wizard, id, files).await?;
            wizard.save_and_next().await
        })?;
    }
    Ok(())
}

fn buffer_text(backend: &TestBackend) -> String {
    let buffer = backend.buffer();
    let width = buffer.area.width as usize;
    buffer
        .content()
        .chunks(width.max(1))
        .map(|row| {
            let line: String = row.iter().map(|c| c.symbol()).collect();
            line.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    rt: &Runtime,
    wizard: &mut WizardController,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut state = TuiState::new();

    while !state.quit {
        terminal.draw(|f| draw(f.size(), f, &state, wizard))?;
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(&mut state, wizard, rt, key);
                }
            }
        }
    }

    info!("[PHASE: tui] [STEP: exit] Wizard closed at step {}", wizard.current_step());
    Ok(())
}

// =========================
// Input
// =========================

fn move_focus(state: &mut TuiState, wizard: &WizardController, forward: bool) {
    let row_count = current_rows(wizard).len();
    // Rows, then the buttons, wrapping around.
    let order: Vec<Focus> = (0..row_count)
        .map(Focus::Row)
        .chain([
            Focus::Button(ButtonFocus::Back),
            Focus::Button(ButtonFocus::Next),
            Focus::Button(ButtonFocus::Quit),
        ])
        .collect();
    let pos = order.iter().position(|f| *f == state.focus).unwrap_or(0);
    let next = if forward {
        (pos + 1) % order.len()
    } else {
        (pos + order.len() - 1) % order.len()
    };
    state.focus = order[next];
    state.path_input.clear();
}

fn report<T>(state: &mut TuiState, result: Result<T, StepError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(StepError::Validation(_)) => {
            state.notice = Some("Please fix the highlighted fields.".to_string());
            None
        }
        Err(e) => {
            state.notice = Some(e.user_message());
            None
        }
    }
}

fn go_back(state: &mut TuiState, wizard: &mut WizardController, rt: &Runtime) {
    if report(state, rt.block_on(wizard.back())).is_some() {
        state.focus = Focus::Row(0);
        state.path_input.clear();
    }
}

fn save_and_next(state: &mut TuiState, wizard: &mut WizardController, rt: &Runtime) {
    match report(state, rt.block_on(wizard.save_and_next())) {
        Some(StepOutcome::Advanced(step)) => {
            state.notice = Some(format!("Saved. Step {} of {}.", step, wizard.total_steps()));
            state.focus = Focus::Row(0);
            state.path_input.clear();
        }
        Some(StepOutcome::Completed) => {
            state.notice = Some("Application submitted.".to_string());
            state.focus = Focus::Button(ButtonFocus::Quit);
        }
        None => {}
    }
}

fn edit_text(wizard: &mut WizardController, row: &Row, edit: impl FnOnce(&mut String)) -> Result<(), StepError> {
    let hook = wizard.current_hook_mut().ok_or(StepError::NotStarted)?;
    match row {
        Row::Field(spec) if spec.kind == FieldKind::Text => {
            let mut text = hook
                .data()
                .field(spec.name)
                .and_then(|v| v.as_text().map(str::to_string))
                .unwrap_or_default();
            edit(&mut text);
            hook.set_field(spec.name, FieldValue::Text(text))?;
        }
        Row::ItemField { list, index, spec } if spec.kind == FieldKind::Text => {
            let mut text = hook
                .data()
                .item_field(*list, *index, spec.name)?
                .as_text()
                .map(str::to_string)
                .unwrap_or_default();
            edit(&mut text);
            hook.set_repeating_item_field(*list, *index, spec.name, FieldValue::Text(text))?;
        }
        _ => {}
    }
    Ok(())
}

fn toggle(wizard: &mut WizardController, row: &Row) -> Result<(), StepError> {
    let hook = wizard.current_hook_mut().ok_or(StepError::NotStarted)?;
    let (current, name) = match row {
        Row::Field(spec) => (hook.data().field(spec.name), spec.name),
        _ => return Ok(()),
    };
    let next = match current {
        Some(FieldValue::YesNo(v)) => FieldValue::YesNo(toggle_yes_no(v)),
        Some(FieldValue::Checked(v)) => FieldValue::Checked(!v),
        _ => return Ok(()),
    };
    hook.set_field(name, next)?;
    Ok(())
}

fn attach_typed_paths(
    state: &mut TuiState,
    wizard: &mut WizardController,
    rt: &Runtime,
    row: &Row,
) {
    let typed = state.path_input.trim().to_string();
    if typed.is_empty() {
        state.notice = Some("Type a file path, then press Enter.".to_string());
        return;
    }
    match row {
        Row::Multi { key, .. } => {
            let paths: Vec<PathBuf> = typed
                .split(';')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
            if let Some(result) = report(state, rt.block_on(wizard.upload_multi(key, &paths))) {
                state.notice = wizard.banner().map(str::to_string).or_else(|| {
                    Some(format!(
                        "{} document(s) uploaded.",
                        result.outcome.new_document_ids.len()
                    ))
                });
                state.path_input.clear();
            }
        }
        _ => {
            let Some(slot) = row.slot() else {
                return;
            };
            if let Some(file) = report(state, wizard.stage_document(slot, &PathBuf::from(&typed))) {
                state.notice = Some(format!(
                    "{} selected; it is uploaded on Save & Next.",
                    file.file_name
                ));
                state.path_input.clear();
            }
        }
    }
}

fn add_item(state: &mut TuiState, wizard: &mut WizardController, list: RepeatingList) {
    let result = wizard
        .current_hook_mut()
        .ok_or(StepError::NotStarted)
        .and_then(|h| h.add_repeating_item(list).map_err(StepError::from));
    if let Some(index) = report(state, result) {
        state.notice = Some(format!("{} #{} added.", list.item_label(), index + 1));
    }
}

fn remove_item(state: &mut TuiState, wizard: &mut WizardController, list: RepeatingList, index: usize) {
    let result = wizard
        .current_hook_mut()
        .ok_or(StepError::NotStarted)
        .and_then(|h| h.remove_repeating_item(list, index).map_err(StepError::from));
    if report(state, result).is_some() {
        state.notice = Some(format!("{} #{} removed.", list.item_label(), index + 1));
        let rows = current_rows(wizard).len();
        if let Focus::Row(i) = state.focus {
            if i >= rows {
                state.focus = Focus::Row(rows.saturating_sub(1));
            }
        }
    }
}

fn handle_key(state: &mut TuiState, wizard: &mut WizardController, rt: &Runtime, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        state.quit = true;
        return;
    }
    if key.code == KeyCode::F(2) || (ctrl && key.code == KeyCode::Char('s')) {
        save_and_next(state, wizard, rt);
        return;
    }

    match key.code {
        KeyCode::Tab | KeyCode::Down => return move_focus(state, wizard, true),
        KeyCode::BackTab | KeyCode::Up => return move_focus(state, wizard, false),
        KeyCode::Esc => return go_back(state, wizard, rt),
        _ => {}
    }

    let row = match state.focus {
        Focus::Button(button) => {
            match key.code {
                KeyCode::Left => move_focus(state, wizard, false),
                KeyCode::Right => move_focus(state, wizard, true),
                KeyCode::Enter | KeyCode::Char(' ') => match button {
                    ButtonFocus::Back => go_back(state, wizard, rt),
                    ButtonFocus::Next if !wizard.is_completed() => save_and_next(state, wizard, rt),
                    ButtonFocus::Next => {}
                    ButtonFocus::Quit => state.quit = true,
                },
                _ => {}
            }
            return;
        }
        Focus::Row(_) => match focused_row(state, wizard) {
            Some(row) => row,
            None => return,
        },
    };

    if wizard.is_completed() {
        state.notice = Some("This application has been submitted.".to_string());
        return;
    }

    let result = match (&row, key.code) {
        (Row::List(list), KeyCode::Char('+') | KeyCode::Enter) => {
            add_item(state, wizard, *list);
            Ok(())
        }
        (Row::List(list), KeyCode::Char('-')) => {
            let len = wizard
                .current_hook()
                .and_then(|h| h.data().list_len(*list).ok())
                .unwrap_or(0);
            if len > 0 {
                remove_item(state, wizard, *list, len - 1);
            }
            Ok(())
        }
        (Row::ItemField { list, index, .. } | Row::ItemDocument { list, index }, KeyCode::Delete) => {
            remove_item(state, wizard, *list, *index);
            Ok(())
        }
        (Row::Multi { key: slot, .. }, KeyCode::Delete) => {
            let count = wizard
                .current_hook()
                .map(|h| h.multi_documents(slot).len())
                .unwrap_or(0);
            if count == 0 {
                Ok(())
            } else {
                wizard.remove_multi_document(slot, count - 1)
            }
        }
        (r, KeyCode::Enter) if r.takes_path() => {
            attach_typed_paths(state, wizard, rt, r);
            Ok(())
        }
        (r, KeyCode::Char(c)) if r.takes_path() => {
            state.path_input.push(c);
            Ok(())
        }
        (r, KeyCode::Backspace) if r.takes_path() => {
            state.path_input.pop();
            Ok(())
        }
        (Row::Field(spec), KeyCode::Char(' ') | KeyCode::Enter) if spec.kind != FieldKind::Text => {
            toggle(wizard, &row)
        }
        (Row::Field(spec), KeyCode::Left | KeyCode::Right) if spec.kind == FieldKind::YesNo => {
            toggle(wizard, &row)
        }
        (_, KeyCode::Char(c)) => edit_text(wizard, &row, |t| t.push(c)),
        (_, KeyCode::Backspace) => edit_text(wizard, &row, |t| {
            t.pop();
        }),
        (_, KeyCode::Enter) => {
            move_focus(state, wizard, true);
            Ok(())
        }
        _ => Ok(()),
    };
    report(state, result);
}

// =========================
// Rendering
// =========================

fn draw(area: Rect, f: &mut ratatui::Frame<'_>, state: &TuiState, wizard: &WizardController) {
    let window = centered_window(area, 100, 32);
    f.render_widget(
        Block::default().borders(Borders::ALL).title(WINDOW_TITLE),
        window,
    );

    let inner = window.inner(&ratatui::layout::Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(inner);

    draw_header(f, rows[0], wizard);
    if wizard.is_completed() {
        let done = Paragraph::new(Text::from(vec![
            Line::from("Your application has been submitted."),
            Line::from(""),
            Line::from("You can track its status from the dashboard."),
        ]))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: false });
        f.render_widget(done, rows[1]);
    } else {
        draw_page(f, rows[1], state, wizard);
    }
    draw_notice(f, rows[2], state, wizard);
    draw_buttons(f, rows[3], state, wizard);
}

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(w)) / 2,
        y: area.y + (area.height.saturating_sub(h)) / 2,
        width: w,
        height: h,
    }
}

fn draw_header(f: &mut ratatui::Frame<'_>, area: Rect, wizard: &WizardController) {
    let title = wizard
        .current_section()
        .map(|s| s.title())
        .unwrap_or("Application");
    let header = Text::from(vec![
        Line::from(Span::styled(
            format!(
                "Step {} of {}: {}",
                wizard.current_step(),
                wizard.total_steps(),
                title
            ),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("{:?} membership", wizard.membership_type()),
            Style::default().fg(Color::DarkGray),
        )),
    ]);
    f.render_widget(Paragraph::new(header), area);
}

fn document_status(state: DocumentState, name: String) -> String {
    match state {
        DocumentState::Unset => "(no file)".to_string(),
        DocumentState::Staged => format!("{} (selected, not uploaded)", name),
        DocumentState::Persisted => name,
    }
}

fn row_text(row: &Row, hook: &SectionHook, typed: Option<&str>) -> (String, bool) {
    let data = hook.data();
    let (label, value, enabled) = match row {
        Row::Field(spec) => (
            spec.label.to_string(),
            data.field(spec.name).map(|v| v.display()).unwrap_or_default(),
            data.is_enabled(spec.name),
        ),
        Row::Document { key, label } => {
            let slot = DocumentSlot::field(key);
            let value = data
                .document(&slot)
                .map(|d| document_status(d.state(), d.display_name()))
                .unwrap_or_default();
            (label.to_string(), value, data.is_enabled(key))
        }
        Row::List(list) => {
            let len = data.list_len(*list).unwrap_or(0);
            (
                format!("{}s", list.item_label()),
                format!("{} added   [+] add  [-] remove last", len),
                true,
            )
        }
        Row::ItemField { list, index, spec } => (
            format!("  #{} {}", index + 1, spec.label),
            data.item_field(*list, *index, spec.name)
                .map(|v| v.display())
                .unwrap_or_default(),
            true,
        ),
        Row::ItemDocument { list, index } => {
            let slot = DocumentSlot::Item {
                list: *list,
                index: *index,
            };
            let value = data
                .document(&slot)
                .map(|d| document_status(d.state(), d.display_name()))
                .unwrap_or_default();
            (format!("  #{} {}", index + 1, list.document_label()), value, true)
        }
        Row::Multi {
            key,
            label,
            max_files,
        } => {
            let docs = hook.multi_documents(key);
            let names: Vec<String> = docs.iter().map(|d| d.display_name()).collect();
            let value = if names.is_empty() {
                format!("(none, up to {})", max_files)
            } else {
                format!("{}/{}: {}", names.len(), max_files, names.join(", "))
            };
            (label.to_string(), value, true)
        }
    };
    let value = match typed {
        Some(t) if row.takes_path() => format!("{}  path: {}_", value, t),
        _ => value,
    };
    let value = if enabled {
        value
    } else {
        "(answer Yes above to enable)".to_string()
    };
    (format!("{:<34} {}", label, value), enabled)
}

fn draw_page(f: &mut ratatui::Frame<'_>, area: Rect, state: &TuiState, wizard: &WizardController) {
    let Some(hook) = wizard.current_hook() else {
        f.render_widget(Paragraph::new("Loading application..."), area);
        return;
    };
    let errors = wizard.field_errors();
    let mut lines = Vec::new();
    let mut focused_line = 0usize;

    for (i, row) in rows_for(hook).iter().enumerate() {
        let focused = state.focus == Focus::Row(i);
        let typed = focused.then_some(state.path_input.as_str());
        let (text, enabled) = row_text(row, hook, typed);
        let mut style = Style::default();
        if !enabled {
            style = style.fg(Color::DarkGray);
        }
        if matches!(row, Row::List(_)) {
            style = style.add_modifier(Modifier::BOLD);
        }
        if focused {
            style = style.add_modifier(Modifier::REVERSED);
            focused_line = lines.len();
        }
        let marker = if focused { "> " } else { "  " };
        lines.push(Line::from(Span::styled(format!("{}{}", marker, text), style)));
        if let Some(msg) = errors.get(&row.error_key()) {
            lines.push(Line::from(Span::styled(
                format!("    ! {}", msg),
                Style::default().fg(Color::Red),
            )));
        }
    }

    let visible = area.height.saturating_sub(2) as usize;
    let scroll = focused_line.saturating_sub(visible.saturating_sub(1));
    let page = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL))
        .scroll((scroll as u16, 0));
    f.render_widget(page, area);
}

fn draw_notice(f: &mut ratatui::Frame<'_>, area: Rect, state: &TuiState, wizard: &WizardController) {
    let (text, style) = match (wizard.banner(), state.notice.as_deref()) {
        (Some(banner), _) => (banner.to_string(), Style::default().fg(Color::Red)),
        (None, Some(notice)) => (notice.to_string(), Style::default().fg(Color::Yellow)),
        (None, None) => (
            "Tab/Up/Down move  Space toggles  Enter attaches a typed path  F2 saves  Esc goes back"
                .to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };
    f.render_widget(Paragraph::new(Span::styled(text, style)), area);
}

fn draw_buttons(f: &mut ratatui::Frame<'_>, area: Rect, state: &TuiState, wizard: &WizardController) {
    let back = button_text(
        "Back",
        state.focus == Focus::Button(ButtonFocus::Back),
        wizard.current_step() > 1 && !wizard.is_completed(),
    );
    let next = button_text(
        next_label(wizard),
        state.focus == Focus::Button(ButtonFocus::Next),
        !wizard.is_completed(),
    );
    let quit = button_text(
        "Quit",
        state.focus == Focus::Button(ButtonFocus::Quit),
        true,
    );
    let line = Line::from(vec![back, Span::raw(" "), next, Span::raw(" "), quit]);
    f.render_widget(Paragraph::new(line).alignment(Alignment::Right), area);
}

fn button_text(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    }
    if focused && enabled {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(format!("[ {} ]", label), style)
}

/// Start the wizard for the interactive run. Errors are logged here as well
/// because the terminal is about to be taken over.
pub fn start_wizard(rt: &Runtime, wizard: &mut WizardController) -> Result<()> {
    rt.block_on(wizard.start()).map_err(|e| {
        error!("[PHASE: tui] [STEP: start] Could not load the application: {}", e);
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn started(rt: &Runtime) -> (Arc<InMemoryBackend>, WizardController) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = Arc::new(DraftStore::new(backend.clone()));
        let mut wizard = WizardController::new(store, UploadConfig::default());
        rt.block_on(wizard.start()).unwrap();
        (backend, wizard)
    }

    fn press(state: &mut TuiState, wizard: &mut WizardController, rt: &Runtime, code: KeyCode) {
        handle_key(state, wizard, rt, KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn completion_errors_read_as_section_titles() {
        let mut state = TuiState::new();
        let err = StepError::Store(crate::store::StoreError::IncompleteSections(vec![
            SectionId::CompanyDetails,
            SectionId::DataProtectionPrivacy,
        ]));
        assert!(report::<()>(&mut state, Err(err)).is_none());
        assert_eq!(
            state.notice.as_deref(),
            Some("Please complete: Company Details, Data Protection & Privacy")
        );
    }

    fn type_text(state: &mut TuiState, wizard: &mut WizardController, rt: &Runtime, text: &str) {
        for c in text.chars() {
            press(state, wizard, rt, KeyCode::Char(c));
        }
    }

    fn focus_row(state: &mut TuiState, wizard: &WizardController, wanted: impl Fn(&Row) -> bool) {
        let index = current_rows(wizard)
            .iter()
            .position(wanted)
            .expect("row present");
        state.focus = Focus::Row(index);
        state.path_input.clear();
    }

    #[test]
    fn smoke_renders_first_step() {
        let screen = smoke("1").unwrap();
        assert!(screen.contains("Membership Application"));
        assert!(screen.contains("Step 1 of 5: Company Details"));
        assert!(screen.contains("[ Save & Next ]"));
    }

    #[test]
    fn smoke_walks_to_a_named_section() {
        let screen = smoke("dataProtectionPrivacy").unwrap();
        assert!(screen.contains("Step 3 of 5: Data Protection & Privacy"));
    }

    #[test]
    fn smoke_complete_shows_submission() {
        let screen = smoke("complete").unwrap();
        assert!(screen.contains("Your application has been submitted."));
        assert!(smoke("nonsense").is_err());
    }

    #[test]
    fn typing_edits_the_focused_text_field() {
        let rt = runtime();
        let (_, mut wizard) = started(&rt);
        let mut state = TuiState::new();

        focus_row(&mut state, &wizard, |r| matches!(r, Row::Field(s) if s.name == "companyName"));
        type_text(&mut state, &mut wizard, &rt, "Acme");
        press(&mut state, &mut wizard, &rt, KeyCode::Backspace);

        let hook = wizard.current_hook().unwrap();
        assert_eq!(
            hook.data().field("companyName"),
            Some(FieldValue::text("Acm"))
        );
        assert!(hook.is_dirty());
    }

    #[test]
    fn plus_and_minus_manage_repeating_records() {
        let rt = runtime();
        let (_, mut wizard) = started(&rt);
        let mut state = TuiState::new();

        focus_row(&mut state, &wizard, |r| *r == Row::List(RepeatingList::Directors));
        press(&mut state, &mut wizard, &rt, KeyCode::Char('+'));
        press(&mut state, &mut wizard, &rt, KeyCode::Char('+'));
        let len = |w: &WizardController| {
            w.current_hook()
                .unwrap()
                .data()
                .list_len(RepeatingList::Directors)
                .unwrap()
        };
        assert_eq!(len(&wizard), 2);

        press(&mut state, &mut wizard, &rt, KeyCode::Char('-'));
        assert_eq!(len(&wizard), 1);
    }

    #[test]
    fn enter_on_a_document_row_stages_the_typed_path() {
        let rt = runtime();
        let (backend, mut wizard) = started(&rt);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("licence.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let mut state = TuiState::new();

        focus_row(&mut state, &wizard, |r| {
            matches!(r, Row::Document { key, .. } if *key == "tradeLicenseFile")
        });
        type_text(&mut state, &mut wizard, &rt, &path.display().to_string());
        press(&mut state, &mut wizard, &rt, KeyCode::Enter);

        let staged = wizard.current_hook().unwrap().staged_documents();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].1.file_name, "licence.pdf");
        assert!(state.path_input.is_empty());
        assert_eq!(backend.upload_calls(), 0);
    }

    #[test]
    fn save_with_empty_page_shows_inline_errors_and_stays() {
        let rt = runtime();
        let (backend, mut wizard) = started(&rt);
        let mut state = TuiState::new();

        handle_key(
            &mut state,
            &mut wizard,
            &rt,
            KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL),
        );
        assert_eq!(wizard.current_step(), 1);
        assert!(wizard.field_errors().contains_key("companyName"));
        assert_eq!(backend.submit_calls(), 0);
        assert_eq!(
            state.notice.as_deref(),
            Some("Please fix the highlighted fields.")
        );

        let mut terminal = Terminal::new(TestBackend::new(100, 32)).unwrap();
        terminal
            .draw(|f| draw(f.size(), f, &state, &wizard))
            .unwrap();
        assert!(buffer_text(terminal.backend()).contains("! Company name is required"));
    }

    #[test]
    fn space_toggles_yes_no_and_opens_the_gate() {
        let rt = runtime();
        let (_, mut wizard) = started(&rt);
        let dir = tempfile::tempdir().unwrap();
        rt.block_on(async {
            sample::fill_section(&mut wizard, SectionId::CompanyDetails, dir.path())
                .await
                .unwrap();
            wizard.save_and_next().await.unwrap();
        });
        let mut state = TuiState::new();

        focus_row(&mut state, &wizard, |r| {
            matches!(r, Row::Field(s) if s.name == "cashTransactionsAboveThreshold")
        });
        press(&mut state, &mut wizard, &rt, KeyCode::Char(' '));
        let data = wizard.current_hook().unwrap().data().clone();
        assert!(data.is_enabled("cashTransactionsDetails"));

        focus_row(&mut state, &wizard, |r| {
            matches!(r, Row::Field(s) if s.name == "cashTransactionsDetails")
        });
        type_text(&mut state, &mut wizard, &rt, "Retail");
        assert_eq!(
            wizard
                .current_hook()
                .unwrap()
                .data()
                .field("cashTransactionsDetails"),
            Some(FieldValue::text("Retail"))
        );
    }

    #[test]
    fn esc_goes_back_and_quit_button_exits() {
        let rt = runtime();
        let (_, mut wizard) = started(&rt);
        let dir = tempfile::tempdir().unwrap();
        rt.block_on(async {
            sample::fill_section(&mut wizard, SectionId::CompanyDetails, dir.path())
                .await
                .unwrap();
            wizard.save_and_next().await.unwrap();
        });
        let mut state = TuiState::new();

        press(&mut state, &mut wizard, &rt, KeyCode::Esc);
        assert_eq!(wizard.current_step(), 1);

        state.focus = Focus::Button(ButtonFocus::Quit);
        press(&mut state, &mut wizard, &rt, KeyCode::Enter);
        assert!(state.quit);
    }
}
