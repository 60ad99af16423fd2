use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Terminal,
};
use screener_core::{
    Answer, Conversation, LocalDiscovery, ModelReply, ReplyOutcome, ScreenerError,
    SessionController, SessionStore, Settings, Turn,
};
use std::io;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::commands::{self, CommandResult};
use crate::markdown::MarkdownRenderer;
use crate::theme::Theme;

struct AppState {
    // Input
    input: String,
    /// Cursor position in chars, not bytes.
    cursor_pos: usize,
    input_history: Vec<String>,
    history_pos: Option<usize>,

    // Conversation panel
    scroll_offset: usize,
    notices: Vec<String>,

    // Status
    status_text: String,
    should_quit: bool,
    theme: Theme,

    settings: Settings,
    controller: SessionController,
    store: SessionStore,
    renderer: MarkdownRenderer,

    /// Background checks (/ping, /models) report here.
    notice_tx: mpsc::UnboundedSender<String>,
}

impl AppState {
    fn new(
        settings: Settings,
        controller: SessionController,
        store: SessionStore,
        notice_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        let status_text = if controller.is_busy() {
            "Waiting for the first answer...".to_string()
        } else {
            "Ready".to_string()
        };
        Self {
            input: String::new(),
            cursor_pos: 0,
            input_history: Vec::new(),
            history_pos: None,

            scroll_offset: 0,
            notices: Vec::new(),

            status_text,
            should_quit: false,
            theme: Theme::by_name(&settings.ui.theme),

            settings,
            controller,
            store,
            renderer: MarkdownRenderer::new(),
            notice_tx,
        }
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.notices.push(message.into());
        self.scroll_to_bottom();
    }

    /// Rejected actions are shown as they are; other failures are also logged.
    fn report_error(&mut self, err: ScreenerError) {
        if err.is_structural() {
            self.notify(err.to_string());
        } else {
            warn!(error = %err, "Action failed");
            self.notify(format!("Error: {err}"));
        }
    }

    fn scroll_to_bottom(&mut self) {
        // Resolved on next draw
        self.scroll_offset = usize::MAX;
    }

    /// Called after the current turn changed.
    fn turn_changed(&mut self) {
        self.notices.clear();
        self.scroll_offset = 0;
    }

    fn save_session(&mut self) {
        match self.controller.save(&self.store) {
            Ok(path) => info!(path = %path.display(), "Session saved"),
            Err(e) => {
                warn!(error = %e, "Could not save session");
                self.status_text = format!("Save failed: {e}");
            }
        }
    }

    fn push_history(&mut self, input: String) {
        if !input.is_empty() && self.input_history.last() != Some(&input) {
            self.input_history.push(input);
        }
        self.history_pos = None;
    }

    fn history_prev(&mut self) {
        if self.input_history.is_empty() {
            return;
        }
        let pos = match self.history_pos {
            None => self.input_history.len() - 1,
            Some(p) => p.saturating_sub(1),
        };
        self.history_pos = Some(pos);
        self.input = self.input_history[pos].clone();
        self.cursor_pos = self.input.chars().count();
    }

    fn history_next(&mut self) {
        let Some(pos) = self.history_pos else {
            return;
        };
        if pos + 1 >= self.input_history.len() {
            self.history_pos = None;
            self.input.clear();
            self.cursor_pos = 0;
        } else {
            self.history_pos = Some(pos + 1);
            self.input = self.input_history[pos + 1].clone();
            self.cursor_pos = self.input.chars().count();
        }
    }

    fn model_name(&self) -> String {
        self.controller.client().model_name().to_string()
    }
}

/// Runs the conversation window until the user quits. The session inside
/// `controller` is saved after every applied reply and once more on exit.
pub async fn run_tui(
    settings: Settings,
    controller: SessionController,
    mut replies: mpsc::UnboundedReceiver<ModelReply>,
    store: SessionStore,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<String>();
    let mut state = AppState::new(settings, controller, store, notice_tx);

    let result = event_loop(&mut terminal, &mut state, &mut replies, &mut notice_rx);

    state.save_session();
    if let Some(session) = state.controller.close() {
        info!(session = %session.id(), "Conversation window closed");
    }

    let restored = restore_terminal(&mut terminal);
    result.and(restored)
}

/// Attempts every restore step even when an earlier one fails.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    let raw = disable_raw_mode();
    let screen = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let cursor = terminal.show_cursor();
    raw?;
    screen?;
    cursor?;
    Ok(())
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    state: &mut AppState,
    replies: &mut mpsc::UnboundedReceiver<ModelReply>,
    notices: &mut mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    loop {
        terminal.draw(|f| draw_ui(f, state))?;

        // Model replies and background checks (non-blocking)
        while let Ok(reply) = replies.try_recv() {
            handle_reply(state, reply);
        }
        while let Ok(notice) = notices.try_recv() {
            state.notify(notice);
        }

        if event::poll(std::time::Duration::from_millis(33))? {
            if let Event::Key(key) = event::read()? {
                handle_key(state, key);
            }
        }

        if state.should_quit {
            return Ok(());
        }
    }
}

fn handle_reply(state: &mut AppState, reply: ModelReply) {
    match state.controller.apply_reply(reply) {
        ReplyOutcome::Applied { turn, answered } => {
            state.status_text = if answered {
                format!("Answer received for turn {turn}")
            } else {
                format!("Request for turn {turn} failed; /retry to send it again")
            };
            let is_current = state
                .controller
                .conversation()
                .map(|c| c.current_id() == turn)
                .unwrap_or(false);
            if is_current {
                state.scroll_offset = 0;
            }
            state.save_session();
        }
        ReplyOutcome::Stale => {}
    }
}

// ── Drawing ─────────────────────────────────────────────────────────────

fn draw_ui(f: &mut ratatui::Frame, state: &mut AppState) {
    f.render_widget(
        Block::default().style(Style::default().bg(state.theme.bg).fg(state.theme.fg)),
        f.area(),
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(5),    // conversation
            Constraint::Length(3), // input
            Constraint::Length(1), // status
        ])
        .split(f.area());

    draw_header(f, chunks[0], state);
    draw_conversation(f, chunks[1], state);
    draw_input(f, chunks[2], state);
    draw_status_bar(f, chunks[3], state);
}

fn draw_header(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    let theme = &state.theme;
    let spans = match state.controller.session() {
        Some(session) => {
            let conversation = session.conversation();
            let image = session.image();
            let current = conversation.current_id();
            let (branch, branches) = branch_position(conversation);
            vec![
                Span::styled(
                    " Screener ",
                    Style::default()
                        .fg(theme.accent)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("│ {} ", session.id()), Style::default().fg(theme.fg)),
                Span::styled(
                    format!("│ {}×{} ", image.width(), image.height()),
                    Style::default().fg(theme.muted),
                ),
                Span::styled(
                    format!(
                        "│ turn {} of depth {} ",
                        current,
                        conversation.depth(current)
                    ),
                    Style::default().fg(theme.fg),
                ),
                Span::styled(
                    format!("│ branch {branch}/{branches} "),
                    Style::default().fg(if branches > 1 {
                        theme.warning
                    } else {
                        theme.muted
                    }),
                ),
            ]
        }
        None => vec![Span::styled(
            " Screener │ no session ",
            Style::default().fg(theme.muted),
        )],
    };
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_conversation(f: &mut ratatui::Frame, area: Rect, state: &mut AppState) {
    let lines = build_conversation_lines(state);
    let theme = &state.theme;
    let total_lines = lines.len();
    let visible_height = area.height.saturating_sub(2) as usize;

    let max_scroll = total_lines.saturating_sub(visible_height);
    if state.scroll_offset > max_scroll {
        state.scroll_offset = max_scroll;
    }

    let panel = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Conversation ")
                .border_style(Style::default().fg(theme.border)),
        )
        .wrap(Wrap { trim: false })
        .scroll((to_u16(state.scroll_offset), 0));
    f.render_widget(panel, area);

    if total_lines > visible_height {
        let mut scrollbar_state = ScrollbarState::new(max_scroll).position(state.scroll_offset);
        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("^"))
                .end_symbol(Some("v")),
            area,
            &mut scrollbar_state,
        );
    }
}

fn build_conversation_lines(state: &AppState) -> Vec<Line<'static>> {
    let theme = &state.theme;
    let mut lines = Vec::new();

    let Some(session) = state.controller.session() else {
        lines.push(Line::from(Span::styled(
            "No active session.",
            Style::default().fg(theme.muted),
        )));
        return lines;
    };
    let conversation = session.conversation();
    let current = conversation.current();

    if let Some(trail) = path_trail(conversation) {
        lines.push(Line::from(Span::styled(
            trail,
            Style::default().fg(theme.muted),
        )));
        lines.push(Line::default());
    }

    let (label, question) = if current.is_root() {
        ("Prompt: ", session.initial_prompt())
    } else {
        ("Q: ", current.question.as_str())
    };
    let question_style = Style::default()
        .fg(theme.question_color)
        .add_modifier(Modifier::BOLD);
    lines.push(Line::from(vec![
        Span::styled(label, question_style),
        Span::styled(question.to_string(), question_style),
    ]));
    lines.push(Line::default());

    match &current.answer {
        Answer::Answered(text) => lines.extend(state.renderer.render(text, theme)),
        Answer::Pending => {
            let waiting = state
                .controller
                .in_flight()
                .map(|tag| tag.turn == current.id)
                .unwrap_or(false);
            let text = if waiting {
                format!("Waiting for {}...", state.model_name())
            } else {
                "No answer yet. Use /retry to send this question.".to_string()
            };
            lines.push(Line::from(Span::styled(
                text,
                Style::default()
                    .fg(theme.muted)
                    .add_modifier(Modifier::ITALIC),
            )));
        }
        Answer::Failed(err) => {
            lines.push(Line::from(Span::styled(
                format!("Request failed: {err}"),
                Style::default().fg(theme.error),
            )));
            lines.push(Line::from(Span::styled(
                "Use /retry to send it again.",
                Style::default().fg(theme.muted),
            )));
        }
    }

    let follow_ups = conversation.children(current.id).count();
    if follow_ups > 0 {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!(
                "↳ {} follow-up{} below; Alt+Right opens the newest",
                follow_ups,
                if follow_ups == 1 { "" } else { "s" }
            ),
            Style::default().fg(theme.muted),
        )));
    }

    if !state.notices.is_empty() {
        lines.push(Line::default());
        for notice in &state.notices {
            for line in notice.lines() {
                lines.push(Line::from(Span::styled(
                    line.to_string(),
                    Style::default().fg(theme.accent),
                )));
            }
        }
    }

    lines
}

fn draw_input(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    let theme = &state.theme;
    let is_command = state.input.starts_with('/');
    let title = if is_command {
        " Command "
    } else if state.controller.is_busy() {
        " Waiting for answer  (commands still work) "
    } else {
        " Ask a follow-up "
    };

    let input = Paragraph::new(state.input.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(if is_command {
                    theme.accent
                } else {
                    theme.border
                })),
        )
        .style(Style::default().fg(theme.fg));
    f.render_widget(input, area);

    f.set_cursor_position(input_cursor(area, state.cursor_pos));
}

/// Cursor cell inside the bordered input box, clamped to its last column.
fn input_cursor(area: Rect, cursor_pos: usize) -> (u16, u16) {
    let cursor_x = area
        .x
        .saturating_add(to_u16(cursor_pos))
        .saturating_add(1);
    let max_x = area.x.saturating_add(area.width.saturating_sub(2));
    (cursor_x.min(max_x), area.y.saturating_add(1))
}

fn draw_status_bar(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    let theme = &state.theme;
    let status_color = if state.controller.is_busy() {
        theme.warning
    } else if state
        .controller
        .conversation()
        .map(|c| c.current().answer.is_answered())
        .unwrap_or(false)
    {
        theme.success
    } else {
        theme.muted
    };
    let status_spans = vec![
        Span::styled(
            format!(" {} ", state.model_name()),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("| ", Style::default().fg(theme.muted)),
        Span::styled(
            state.status_text.clone(),
            Style::default().fg(status_color),
        ),
        Span::styled(
            "  Alt+←/→ navigate  /help  Ctrl+C quit ",
            Style::default().fg(theme.muted),
        ),
    ];
    f.render_widget(Paragraph::new(Line::from(status_spans)), area);
}

/// Terminal coordinates are u16; larger values pin to the edge.
fn to_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// 1-based position of the current turn among its siblings, and their count.
fn branch_position(conversation: &Conversation) -> (usize, usize) {
    let current = conversation.current_id();
    let siblings = conversation.siblings(current);
    let index = siblings
        .iter()
        .position(|t| t.id == current)
        .unwrap_or(0);
    (index + 1, siblings.len().max(1))
}

/// Questions above the current turn, e.g. `Initial prompt › q1 › q2`.
fn path_trail(conversation: &Conversation) -> Option<String> {
    let path = conversation.active_path();
    if path.len() < 2 {
        return None;
    }
    let steps: Vec<String> = path[..path.len() - 1]
        .iter()
        .map(|t| {
            if t.is_root() {
                "Initial prompt".to_string()
            } else {
                truncate(&t.question, 24)
            }
        })
        .collect();
    Some(steps.join(" › "))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

// ── Input handling ──────────────────────────────────────────────────────

fn handle_key(state: &mut AppState, key: KeyEvent) {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            state.should_quit = true;
        }

        // Save session
        (KeyModifiers::CONTROL, KeyCode::Char('s')) => {
            handle_command_result(state, CommandResult::Save);
        }

        (_, KeyCode::Enter) => {
            if state.input.trim().is_empty() {
                return;
            }
            let input = state.input.trim().to_string();

            if input.starts_with('/') {
                clear_input(state, input.clone());
                handle_command_result(state, commands::handle_command(&input));
                return;
            }

            // Keep the question in the box until it can be sent.
            if state.controller.is_busy() {
                state.status_text = "Still waiting for the current answer".into();
                return;
            }
            clear_input(state, input.clone());
            submit_question(state, &input);
        }

        // Turn navigation (Alt+arrows, must come before bare arrows)
        (m, KeyCode::Left) if m.contains(KeyModifiers::ALT) => {
            handle_command_result(state, CommandResult::Back);
        }
        (m, KeyCode::Right) if m.contains(KeyModifiers::ALT) => {
            handle_command_result(state, CommandResult::Forward);
        }

        // Input editing
        (_, KeyCode::Backspace) => {
            if state.cursor_pos > 0 {
                let at = byte_index(&state.input, state.cursor_pos - 1);
                state.input.remove(at);
                state.cursor_pos -= 1;
            }
        }
        (_, KeyCode::Delete) => {
            if state.cursor_pos < state.input.chars().count() {
                let at = byte_index(&state.input, state.cursor_pos);
                state.input.remove(at);
            }
        }
        (_, KeyCode::Left) => {
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                state.cursor_pos = word_boundary_left(&state.input, state.cursor_pos);
            } else {
                state.cursor_pos = state.cursor_pos.saturating_sub(1);
            }
        }
        (_, KeyCode::Right) => {
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                state.cursor_pos = word_boundary_right(&state.input, state.cursor_pos);
            } else if state.cursor_pos < state.input.chars().count() {
                state.cursor_pos += 1;
            }
        }
        (KeyModifiers::CONTROL, KeyCode::Char('a')) | (_, KeyCode::Home) => {
            state.cursor_pos = 0;
        }
        (KeyModifiers::CONTROL, KeyCode::Char('e')) | (_, KeyCode::End) => {
            state.cursor_pos = state.input.chars().count();
        }

        // Scroll
        (KeyModifiers::SHIFT, KeyCode::Up) => {
            state.scroll_offset = state.scroll_offset.saturating_sub(1);
        }
        (KeyModifiers::SHIFT, KeyCode::Down) => {
            state.scroll_offset = state.scroll_offset.saturating_add(1);
        }
        (_, KeyCode::PageUp) => {
            state.scroll_offset = state.scroll_offset.saturating_sub(20);
        }
        (_, KeyCode::PageDown) => {
            state.scroll_offset = state.scroll_offset.saturating_add(20);
        }

        // History
        (_, KeyCode::Up) => state.history_prev(),
        (_, KeyCode::Down) => state.history_next(),

        (KeyModifiers::CONTROL, KeyCode::Char('u')) => {
            let end = byte_index(&state.input, state.cursor_pos);
            state.input.drain(..end);
            state.cursor_pos = 0;
        }
        (KeyModifiers::CONTROL, KeyCode::Char('k')) => {
            let at = byte_index(&state.input, state.cursor_pos);
            state.input.truncate(at);
        }
        (KeyModifiers::CONTROL, KeyCode::Char('w')) => {
            let new_pos = word_boundary_left(&state.input, state.cursor_pos);
            let start = byte_index(&state.input, new_pos);
            let end = byte_index(&state.input, state.cursor_pos);
            state.input.drain(start..end);
            state.cursor_pos = new_pos;
        }

        // Clipboard paste (Ctrl+V)
        (KeyModifiers::CONTROL, KeyCode::Char('v')) => {
            if let Ok(mut cb) = arboard::Clipboard::new() {
                if let Ok(text) = cb.get_text() {
                    let text = text.replace(['\r', '\n'], " ");
                    let at = byte_index(&state.input, state.cursor_pos);
                    state.input.insert_str(at, &text);
                    state.cursor_pos += text.chars().count();
                }
            }
        }

        (_, KeyCode::Tab) => {
            if state.input.starts_with('/') {
                if let Some(completion) = commands::complete_command(&state.input) {
                    state.input = completion;
                    state.cursor_pos = state.input.chars().count();
                }
            }
        }

        (_, KeyCode::Char(c)) => {
            let at = byte_index(&state.input, state.cursor_pos);
            state.input.insert(at, c);
            state.cursor_pos += 1;
        }

        _ => {}
    }
}

fn clear_input(state: &mut AppState, submitted: String) {
    state.input.clear();
    state.cursor_pos = 0;
    state.push_history(submitted);
}

fn submit_question(state: &mut AppState, text: &str) {
    match state.controller.ask(text) {
        Ok(outcome) => {
            state.turn_changed();
            state.status_text = if outcome.needs_answer {
                format!("Asking {}...", state.model_name())
            } else {
                format!("Turn {} already answers this question", outcome.turn)
            };
        }
        Err(e) => state.report_error(e),
    }
}

fn handle_command_result(state: &mut AppState, result: CommandResult) {
    match result {
        CommandResult::Message(msg) => state.notify(msg),
        CommandResult::Quit => state.should_quit = true,

        CommandResult::Back | CommandResult::Forward => {
            let before = state.controller.conversation().map(|c| c.current_id());
            let moved = if result == CommandResult::Back {
                state.controller.go_back()
            } else {
                state.controller.go_forward()
            };
            match moved {
                Ok(turn) if Some(turn) != before => {
                    state.turn_changed();
                    state.status_text = format!("At turn {turn}");
                }
                Ok(_) => {
                    state.status_text = if result == CommandResult::Back {
                        "Already at the initial prompt".into()
                    } else {
                        "No follow-up below this turn".into()
                    };
                }
                Err(e) => state.report_error(e),
            }
        }

        CommandResult::Edit(text) => {
            let parent = state
                .controller
                .conversation()
                .map(|c| c.current().parent);
            match parent {
                Some(Some(parent)) => match state.controller.edit_and_fork(parent, &text) {
                    Ok(outcome) => {
                        state.turn_changed();
                        state.status_text = if outcome.created {
                            format!("New branch at turn {}", outcome.turn)
                        } else {
                            format!("Switched to existing branch {}", outcome.turn)
                        };
                    }
                    Err(e) => state.report_error(e),
                },
                Some(None) => state.notify(
                    "The initial prompt cannot be edited; capture again to use a different one.",
                ),
                None => state.notify("No active session."),
            }
        }

        CommandResult::ListBranches => {
            let listing = state
                .controller
                .conversation()
                .map(|c| describe_branches(c, &c.siblings(c.current_id())));
            match listing {
                Some(listing) => state.notify(listing),
                None => state.notify("No active session."),
            }
        }

        CommandResult::SwitchBranch(n) => {
            let target = state.controller.conversation().and_then(|c| {
                let index = n.checked_sub(1)?;
                c.siblings(c.current_id()).get(index).map(|t| t.id)
            });
            match target {
                Some(turn) => match state.controller.select(turn) {
                    Ok(turn) => {
                        state.turn_changed();
                        state.status_text = format!("Switched to branch {n} (turn {turn})");
                    }
                    Err(e) => state.report_error(e),
                },
                None => state.notify(format!("No branch {n}. See /branches.")),
            }
        }

        CommandResult::Retry => match state.controller.retry() {
            Ok(Some(tag)) => {
                state.status_text = format!("Re-sending turn {}...", tag.turn);
                state.scroll_offset = 0;
            }
            Ok(None) => state.notify("This turn already has an answer."),
            Err(e) => state.report_error(e),
        },

        CommandResult::Copy => {
            let answer = state
                .controller
                .conversation()
                .and_then(|c| c.current().answer.text().map(str::to_string));
            match answer {
                Some(text) => match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text)) {
                    Ok(()) => state.status_text = "Answer copied to clipboard".into(),
                    Err(e) => state.notify(format!("Clipboard unavailable: {e}")),
                },
                None => state.notify("Nothing to copy: this turn has no answer."),
            }
        }

        CommandResult::Save => match state.controller.save(&state.store) {
            Ok(path) => state.notify(format!("Saved to {}", path.display())),
            Err(e) => state.report_error(e),
        },

        CommandResult::Ping => {
            let base_url = state.settings.ollama.base_url.clone();
            let timeout = state.settings.ping_timeout();
            let tx = state.notice_tx.clone();
            state.status_text = format!("Pinging {base_url}...");
            tokio::spawn(async move {
                let status = LocalDiscovery::ping(&base_url, timeout).await;
                let _ = tx.send(format!("{status} ({base_url})"));
            });
        }

        CommandResult::ListModels => {
            let base_url = state.settings.ollama.base_url.clone();
            let timeout = state.settings.ping_timeout();
            let active = state.model_name();
            let tx = state.notice_tx.clone();
            tokio::spawn(async move {
                let message = match LocalDiscovery::list_models(&base_url, timeout).await {
                    Ok(models) if models.is_empty() => "No models installed.".to_string(),
                    Ok(models) => describe_models(&models, &active),
                    Err(e) => format!("Could not list models: {e}"),
                };
                let _ = tx.send(message);
            });
        }

        CommandResult::ModelChanged(model) => match state.settings.with_model(&model) {
            Ok(next) => {
                if let Err(e) = next.save() {
                    warn!(error = %e, "Could not persist settings");
                }
                state.controller.set_client(next.build_model_client());
                state.settings = next;
                state.notify(format!("Model set to {}", state.model_name()));
            }
            Err(e) => state.notify(e.to_string()),
        },

        CommandResult::ThemeChanged(name) => match state.settings.with_theme(&name) {
            Ok(next) => {
                if let Err(e) = next.save() {
                    warn!(error = %e, "Could not persist settings");
                }
                state.theme = Theme::by_name(&next.ui.theme);
                state.settings = next;
                state.notify(format!("Theme changed to: {name}"));
            }
            Err(e) => state.notify(e.to_string()),
        },

        CommandResult::NotACommand => {}
    }
}

fn describe_branches(conversation: &Conversation, siblings: &[&Turn]) -> String {
    let current = conversation.current_id();
    if siblings.len() <= 1 {
        return "This turn has no alternative branches.".to_string();
    }
    let mut out = String::from("Branches at this turn:");
    for (i, turn) in siblings.iter().enumerate() {
        let marker = if turn.id == current { "▸" } else { " " };
        let state = match &turn.answer {
            Answer::Answered(_) => "answered",
            Answer::Pending => "pending",
            Answer::Failed(_) => "failed",
        };
        out.push_str(&format!(
            "\n {} {}. {} ({})",
            marker,
            i + 1,
            truncate(&turn.question, 60),
            state
        ));
    }
    out
}

fn describe_models(models: &[String], active: &str) -> String {
    let mut out = String::from("Installed models:");
    for model in models {
        let marker = if model == active { "▸" } else { " " };
        out.push_str(&format!("\n {marker} {model}"));
    }
    out
}

/// Byte offset of the `char_idx`-th char, or the string length past the end.
fn byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn word_boundary_left(s: &str, pos: usize) -> usize {
    let chars: Vec<char> = s.chars().collect();
    let mut i = pos.min(chars.len());
    while i > 0 && chars[i - 1].is_whitespace() {
        i -= 1;
    }
    while i > 0 && !chars[i - 1].is_whitespace() {
        i -= 1;
    }
    i
}

fn word_boundary_right(s: &str, pos: usize) -> usize {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let mut i = pos.min(len);
    while i < len && !chars[i].is_whitespace() {
        i += 1;
    }
    while i < len && chars[i].is_whitespace() {
        i += 1;
    }
    i
}
