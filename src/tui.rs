use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::api::ApiClient;
use crate::auth::Session;
use crate::dashboard::{DashboardState, Effect, FormField, FormMode, MessageKind, Modal, OpOutcome};
use crate::models::Status;

const TICK: Duration = Duration::from_millis(200);

pub fn run_dashboard(client: ApiClient, session: Session) -> Result<()> {
    let mut state = DashboardState::new(session.email);
    let (tx, rx) = mpsc::channel();
    spawn_effect(&client, &tx, Effect::Refresh);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, &client, &tx, &rx);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

/// Run one API call on a worker thread and post the completion back, so the
/// UI keeps drawing while requests are in flight.
fn spawn_effect(client: &ApiClient, tx: &Sender<OpOutcome>, effect: Effect) {
    let client = client.clone();
    let tx = tx.clone();
    thread::spawn(move || {
        let outcome = match effect {
            Effect::Refresh => OpOutcome::Listed(client.list()),
            Effect::Create(draft) => OpOutcome::Created(client.create(&draft)),
            Effect::Update {
                application_id,
                draft,
            } => {
                let result = client.update(&application_id, &draft);
                OpOutcome::Updated {
                    application_id,
                    draft,
                    result,
                }
            }
            Effect::Delete { application_id } => {
                let result = client.delete(&application_id);
                OpOutcome::Deleted {
                    application_id,
                    result,
                }
            }
        };
        // The receiver is gone once the dashboard quits; nothing to do then.
        let _ = tx.send(outcome);
    });
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut DashboardState,
    client: &ApiClient,
    tx: &Sender<OpOutcome>,
    rx: &Receiver<OpOutcome>,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        while let Ok(outcome) = rx.try_recv() {
            if let Some(follow_up) = state.apply_outcome(outcome, Instant::now()) {
                spawn_effect(client, tx, follow_up);
            }
        }
        state.tick(Instant::now());

        list_state.select(if state.visible().is_empty() {
            None
        } else {
            Some(state.selected)
        });
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            break;
        }

        let effect = if matches!(state.modal, Modal::Form(_)) {
            handle_form_key(state, key.code)
        } else if matches!(state.modal, Modal::ConfirmDelete { .. }) {
            handle_confirm_key(state, key.code)
        } else if state.searching {
            handle_search_key(state, key.code);
            None
        } else if key.code == KeyCode::Char('q') {
            break;
        } else {
            handle_browse_key(state, key.code)
        };

        if let Some(effect) = effect {
            spawn_effect(client, tx, effect);
        }
    }
    Ok(())
}

fn handle_browse_key(state: &mut DashboardState, code: KeyCode) -> Option<Effect> {
    match code {
        KeyCode::Down | KeyCode::Char('j') => state.select_next(),
        KeyCode::Up | KeyCode::Char('k') => state.select_prev(),
        KeyCode::Char('J') | KeyCode::PageDown => state.scroll_detail_down(),
        KeyCode::Char('K') | KeyCode::PageUp => state.scroll_detail_up(),
        KeyCode::Char('/') => state.start_search(),
        KeyCode::Esc => state.clear_search(),
        KeyCode::Char('s') => state.cycle_filter(),
        KeyCode::Char('a') => state.open_create(),
        KeyCode::Char('e') | KeyCode::Enter => state.open_edit(),
        KeyCode::Char('d') => state.request_delete(),
        KeyCode::Char('r') => return Some(state.refresh()),
        _ => {}
    }
    None
}

fn handle_search_key(state: &mut DashboardState, code: KeyCode) {
    match code {
        KeyCode::Esc => state.clear_search(),
        KeyCode::Enter => state.end_search(),
        KeyCode::Backspace => state.search_backspace(),
        KeyCode::Char(c) => state.search_input(c),
        _ => {}
    }
}

fn handle_confirm_key(state: &mut DashboardState, code: KeyCode) -> Option<Effect> {
    match code {
        KeyCode::Char('y') | KeyCode::Char('Y') => state.confirm_delete(),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            state.close_modal();
            None
        }
        _ => None,
    }
}

fn handle_form_key(state: &mut DashboardState, code: KeyCode) -> Option<Effect> {
    match code {
        KeyCode::Esc => {
            state.close_modal();
            None
        }
        KeyCode::Enter => state.submit(),
        KeyCode::Tab | KeyCode::Down => {
            state.form.focus_next();
            None
        }
        KeyCode::BackTab | KeyCode::Up => {
            state.form.focus_prev();
            None
        }
        KeyCode::Left if state.form.focused() == FormField::Status => {
            state.form.cycle_status(false);
            None
        }
        KeyCode::Right if state.form.focused() == FormField::Status => {
            state.form.cycle_status(true);
            None
        }
        KeyCode::Backspace => {
            state.form.backspace();
            None
        }
        KeyCode::Char(c) => {
            state.form.input(c);
            None
        }
        _ => None,
    }
}

fn draw(frame: &mut Frame, state: &DashboardState, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(1), // stats
            Constraint::Length(1), // search + filter
            Constraint::Min(0),    // list + detail
            Constraint::Length(1), // transient message
            Constraint::Length(1), // help
        ])
        .split(frame.area());

    draw_title(frame, state, chunks[0]);
    draw_stats(frame, state, chunks[1]);
    draw_search(frame, state, chunks[2]);
    draw_main(frame, state, list_state, chunks[3]);
    draw_message(frame, state, chunks[4]);

    let help = match state.modal {
        Modal::Form(_) => {
            " Tab:next field  Shift-Tab:prev  Left/Right:status  Enter:save  Esc:cancel"
        }
        Modal::ConfirmDelete { .. } => " y:delete  n:keep",
        Modal::Closed if state.searching => " type to search  Enter:done  Esc:clear",
        Modal::Closed => {
            " j/k:move  J/K:scroll  /:search  s:filter  a:add  e:edit  d:delete  r:refresh  q:quit"
        }
    };
    let help = Paragraph::new(help).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[5]);

    match &state.modal {
        Modal::Closed => {}
        Modal::Form(mode) => draw_form_modal(frame, state, mode),
        Modal::ConfirmDelete { application_id } => {
            draw_confirm_modal(frame, state, application_id)
        }
    }
}

fn draw_title(frame: &mut Frame, state: &DashboardState, area: Rect) {
    let loading = if state.loading { "  (refreshing...)" } else { "" };
    let title = Line::from(vec![
        Span::styled(
            "Job Application Tracker",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  [{}]{}", state.user_email, loading)),
    ]);
    frame.render_widget(Paragraph::new(title), area);
}

fn draw_stats(frame: &mut Frame, state: &DashboardState, area: Rect) {
    let counts = state.counts();
    let mut parts = vec![
        format!("Total {}", counts.total),
        format!("Applied {}", counts.applied),
        format!("Interview {}", counts.interview),
        format!("Offer {}", counts.offer),
        format!("Rejected {}", counts.rejected),
    ];
    if counts.unknown > 0 {
        parts.push(format!("Other {}", counts.unknown));
    }
    let stats = Paragraph::new(parts.join("  |  ")).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(stats, area);
}

fn draw_search(frame: &mut Frame, state: &DashboardState, area: Rect) {
    let search_style = if state.searching {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let cursor = if state.searching { "_" } else { "" };
    let line = Line::from(vec![
        Span::styled(format!("Search: {}{}", state.search, cursor), search_style),
        Span::raw(format!("    Status: {}", state.filter.label())),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_main(frame: &mut Frame, state: &DashboardState, list_state: &mut ListState, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let rows = state.visible();
    if rows.is_empty() {
        let placeholder = Paragraph::new(state.empty_notice().unwrap_or_default())
            .block(Block::default().borders(Borders::ALL).title(" Applications "))
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(placeholder, halves[0]);
    } else {
        let items: Vec<ListItem> = rows
            .iter()
            .map(|record| {
                ListItem::new(format!(
                    "{} {:<10} {} | {}",
                    status_icon(&record.status),
                    record.date_applied,
                    truncate(&record.company_name, 18),
                    truncate(&record.job_title, 24),
                ))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(format!(
                " Applications ({}/{}) ",
                rows.len(),
                state.records.len()
            )))
            .highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, halves[0], list_state);
    }

    let detail = build_detail(state);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.detail_scroll, 0));
    frame.render_widget(detail_widget, halves[1]);
}

fn draw_message(frame: &mut Frame, state: &DashboardState, area: Rect) {
    let Some(message) = &state.message else { return };
    let style = match message.kind {
        MessageKind::Success => Style::default().fg(Color::Green),
        MessageKind::Error => Style::default().fg(Color::Red),
    };
    frame.render_widget(Paragraph::new(message.text.as_str()).style(style), area);
}

fn build_detail<'a>(state: &'a DashboardState) -> Text<'a> {
    let Some(record) = state.selected_record() else {
        return Text::raw("Nothing selected");
    };

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(Span::styled(
        &record.company_name,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(record.job_title.as_str()));
    lines.push(Line::from(Span::styled(
        format!("Status: {}", record.status),
        status_style(&record.status),
    )));
    lines.push(Line::from(format!("Applied: {}", record.date_applied)));
    if let Some(follow_up) = &record.follow_up_date {
        lines.push(Line::from(format!("Follow up: {}", follow_up)));
    }
    if let Some(url) = &record.job_post_url {
        lines.push(Line::from(format!("URL: {}", url)));
    }
    lines.push(Line::from(""));
    if let Some(notes) = &record.notes {
        lines.push(Line::from(Span::styled(
            "Notes",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(notes, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
        lines.push(Line::from(""));
    }
    lines.push(Line::from(Span::styled(
        format!("id: {}", record.application_id),
        Style::default().fg(Color::DarkGray),
    )));
    Text::from(lines)
}

fn status_icon(status: &Status) -> &'static str {
    match status {
        Status::Applied => "+",
        Status::Interview => "*",
        Status::Offer => "$",
        Status::Rejected => "x",
        Status::Other(_) => "?",
    }
}

fn status_style(status: &Status) -> Style {
    match status {
        Status::Applied => Style::default().fg(Color::Cyan),
        Status::Interview => Style::default().fg(Color::Yellow),
        Status::Offer => Style::default().fg(Color::Green),
        Status::Rejected => Style::default().fg(Color::Red),
        Status::Other(_) => Style::default().fg(Color::DarkGray),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn draw_form_modal(frame: &mut Frame, state: &DashboardState, mode: &FormMode) {
    let area = centered_rect(64, 78, frame.area());
    frame.render_widget(Clear, area);

    let title = match mode {
        FormMode::Creating => " Add Application ",
        FormMode::Editing { .. } => " Edit Application ",
    };

    let mut lines: Vec<Line> = Vec::new();
    for field in FormField::ORDER {
        let focused = state.form.focused() == field;
        let marker = if focused { "> " } else { "  " };
        let value = match field {
            FormField::CompanyName => state.form.company_name.clone(),
            FormField::JobTitle => state.form.job_title.clone(),
            FormField::JobPostUrl => state.form.job_post_url.clone(),
            FormField::Status => format!("< {} >", state.form.status),
            FormField::DateApplied => state.form.date_applied.clone(),
            FormField::FollowUpDate => state.form.follow_up_date.clone(),
            FormField::Notes => state.form.notes.clone(),
        };
        let cursor = if focused && field != FormField::Status { "_" } else { "" };
        let style = if focused {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!("{marker}{:<15} {value}{cursor}", format!("{}:", field.label())),
            style,
        )));
        if let Some(error) = state.form.error(field) {
            lines.push(Line::from(Span::styled(
                format!("  {:<15} {error}", ""),
                Style::default().fg(Color::Red),
            )));
        }
    }
    if state.submitting {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  Saving...",
            Style::default().fg(Color::Yellow),
        )));
    }

    let form = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    frame.render_widget(form, area);
}

fn draw_confirm_modal(frame: &mut Frame, state: &DashboardState, application_id: &str) {
    let area = centered_rect(50, 24, frame.area());
    frame.render_widget(Clear, area);

    let company = state
        .records
        .iter()
        .find(|r| r.application_id == application_id)
        .map(|r| r.company_name.as_str())
        .unwrap_or(application_id);

    let body = Text::from(vec![
        Line::from(""),
        Line::from(format!("Delete the application at {company}?")),
        Line::from(""),
        Line::from(Span::styled(
            "This cannot be undone.",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
        Line::from("  y: delete    n: keep"),
    ]);
    let dialog = Paragraph::new(body)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Confirm Delete "),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(dialog, area);
}

// Standard centered-overlay rect, sized as a percentage of the frame.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}
