use crate::api::error::GENERIC_ERROR_TEXT;
use crate::api::stream::StreamParser;
use crate::api::{user_facing_message, ApiClient, ByteStream, ChatSession, ErrorContext,
    GREETING_TRIGGER};
use crate::config::Config;
use crate::math::{GlyphMathEngine, MathRenderer};
use crate::state::{printable_text, Command, SessionEvent, SessionState, Stage, WorkerUpdate};
use crate::types::{RigorLevel, LANGUAGES};
use crate::ui::render::{
    input_visual_rows, render_error_line, render_input, render_language_select, render_messages,
    render_rigor_select, render_status_line, render_worksheet_overlay,
};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use std::io::{IsTerminal, Write};
use std::process::{Command as ProcessCommand, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;

const TUI_TICK_INTERVAL: Duration = Duration::from_millis(120);

/// Spawns the worker task that owns the API client and the live chat
/// session. Commands are processed strictly in order; progress flows back as
/// epoch-tagged session events.
pub fn spawn_worker(
    client: ApiClient,
) -> (
    mpsc::UnboundedSender<Command>,
    mpsc::UnboundedReceiver<SessionEvent>,
) {
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Command>();
    let (update_tx, update_rx) = mpsc::unbounded_channel::<SessionEvent>();

    task::spawn(async move {
        let mut session: Option<ChatSession> = None;

        while let Some(command) = command_rx.recv().await {
            match command {
                Command::StartSession {
                    epoch,
                    level,
                    language,
                } => {
                    let validation = client.validate_credentials().await;
                    if !validation.valid {
                        let detail = validation
                            .error
                            .unwrap_or_else(|| GENERIC_ERROR_TEXT.to_string());
                        let message =
                            format!("{} {detail}", ErrorContext::Validation.prefix());
                        send(&update_tx, epoch, WorkerUpdate::ValidationFailed(message));
                        continue;
                    }

                    let mut opened = client.open_tutoring_session(level, &language);
                    opened.push_user(GREETING_TRIGGER);
                    match client.stream_reply(&opened).await {
                        Err(error) => {
                            let message =
                                user_facing_message(ErrorContext::Initialization, &error);
                            send(&update_tx, epoch, WorkerUpdate::InitFailed(message));
                        }
                        Ok(stream) => {
                            send(&update_tx, epoch, WorkerUpdate::GreetingStarted);
                            match drain_reply(stream, epoch, &update_tx).await {
                                Ok(reply) => {
                                    opened.push_assistant(reply);
                                    session = Some(opened);
                                    send(&update_tx, epoch, WorkerUpdate::TurnCompleted);
                                }
                                Err(error) => {
                                    let message = user_facing_message(
                                        ErrorContext::Initialization,
                                        &error,
                                    );
                                    send(&update_tx, epoch, WorkerUpdate::InitFailed(message));
                                }
                            }
                        }
                    }
                }
                Command::SendTurn { epoch, text } => {
                    let Some(active) = session.as_mut() else {
                        let message = format!(
                            "{} No active tutoring session.",
                            ErrorContext::Chat.prefix()
                        );
                        send(&update_tx, epoch, WorkerUpdate::TurnFailed(message));
                        continue;
                    };

                    active.push_user(text);
                    match client.stream_reply(active).await {
                        Err(error) => {
                            active.pop_unanswered_user();
                            let message = user_facing_message(ErrorContext::Chat, &error);
                            send(&update_tx, epoch, WorkerUpdate::TurnFailed(message));
                        }
                        Ok(stream) => {
                            send(&update_tx, epoch, WorkerUpdate::ReplyStarted);
                            match drain_reply(stream, epoch, &update_tx).await {
                                Ok(reply) => {
                                    active.push_assistant(reply);
                                    send(&update_tx, epoch, WorkerUpdate::TurnCompleted);
                                }
                                Err(error) => {
                                    active.pop_unanswered_user();
                                    let message =
                                        user_facing_message(ErrorContext::Chat, &error);
                                    send(&update_tx, epoch, WorkerUpdate::TurnFailed(message));
                                }
                            }
                        }
                    }
                }
                Command::BuildWorksheet {
                    epoch,
                    transcript,
                    level,
                    language,
                } => {
                    let topics = match client.extract_topics(&transcript, level, &language).await
                    {
                        Ok(topics) => topics,
                        Err(error) => {
                            let message = user_facing_message(ErrorContext::Worksheet, &error);
                            send(&update_tx, epoch, WorkerUpdate::WorksheetFailed(message));
                            continue;
                        }
                    };

                    if topics.is_empty() {
                        send(&update_tx, epoch, WorkerUpdate::NoTopics);
                        continue;
                    }

                    match client.generate_worksheet(&topics, level, &language).await {
                        Ok(worksheet) => {
                            send(&update_tx, epoch, WorkerUpdate::WorksheetReady(worksheet));
                        }
                        Err(error) => {
                            let message = user_facing_message(ErrorContext::Worksheet, &error);
                            send(&update_tx, epoch, WorkerUpdate::WorksheetFailed(message));
                        }
                    }
                }
                Command::DiscardSession => {
                    session = None;
                }
            }
        }
    });

    (command_tx, update_rx)
}

fn send(update_tx: &mpsc::UnboundedSender<SessionEvent>, epoch: u64, update: WorkerUpdate) {
    let _ = update_tx.send(SessionEvent::Worker { epoch, update });
}

async fn drain_reply(
    mut stream: ByteStream,
    epoch: u64,
    update_tx: &mpsc::UnboundedSender<SessionEvent>,
) -> Result<String> {
    let mut parser = StreamParser::new();
    let mut reply = String::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        for fragment in parser.process(&chunk)? {
            reply.push_str(&fragment);
            send(update_tx, epoch, WorkerUpdate::StreamFragment(fragment));
        }
    }

    Ok(reply)
}

pub struct App {
    state: SessionState,
    command_tx: mpsc::UnboundedSender<Command>,
    update_rx: mpsc::UnboundedReceiver<SessionEvent>,
    terminal: crate::terminal::TerminalType,
    math: MathRenderer,
    should_quit: bool,
    input_buffer: String,
    caret: usize,
    rigor_cursor: usize,
    language_cursor: usize,
    chat_scroll: usize,
    worksheet_scroll: usize,
    overlay_notice: Option<String>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        if !std::io::stdin().is_terminal() || !std::io::stdout().is_terminal() {
            anyhow::bail!("pam needs an interactive terminal");
        }

        let client = ApiClient::new(&config);
        let (command_tx, update_rx) = spawn_worker(client);
        let terminal = crate::terminal::setup()?;

        let math = if plain_math_enabled() {
            MathRenderer::unavailable()
        } else {
            MathRenderer::new(Arc::new(GlyphMathEngine))
        };

        Ok(Self {
            state: SessionState::new(),
            command_tx,
            update_rx,
            terminal,
            math,
            should_quit: false,
            input_buffer: String::new(),
            caret: 0,
            rigor_cursor: 0,
            language_cursor: 0,
            chat_scroll: 0,
            worksheet_scroll: 0,
            overlay_notice: None,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut tick = tokio::time::interval(TUI_TICK_INTERVAL);

        while !self.should_quit {
            self.draw_frame()?;
            self.process_terminal_events()?;

            tokio::select! {
                _ = tick.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    self.should_quit = true;
                }
                update = self.update_rx.recv() => {
                    match update {
                        Some(event) => self.dispatch(event),
                        None => self.should_quit = true,
                    }
                }
            }
        }

        crate::terminal::restore()?;
        Ok(())
    }

    fn dispatch(&mut self, event: SessionEvent) {
        if matches!(
            &event,
            SessionEvent::Worker {
                update: WorkerUpdate::StreamFragment(_) | WorkerUpdate::GreetingStarted
                    | WorkerUpdate::ReplyStarted,
                ..
            }
        ) {
            // Streaming output snaps the transcript back to following.
            self.chat_scroll = 0;
        }
        if matches!(
            &event,
            SessionEvent::Worker {
                update: WorkerUpdate::WorksheetReady(_),
                ..
            }
        ) {
            self.worksheet_scroll = 0;
            self.overlay_notice = None;
        }

        if let Some(command) = self.state.apply(event) {
            let _ = self.command_tx.send(command);
        }
    }

    fn draw_frame(&mut self) -> Result<()> {
        let status = self.status_line();
        let state = &self.state;
        let math = &self.math;
        let input = self.input_buffer.as_str();
        let caret = self.caret;
        let rigor_cursor = self.rigor_cursor;
        let language_cursor = self.language_cursor;
        let chat_scroll = self.chat_scroll;
        let worksheet_scroll = self.worksheet_scroll;
        let overlay_notice = self.overlay_notice.as_deref();

        self.terminal.draw(|frame| {
            let size = frame.area();
            let input_width = size.width.saturating_sub(2).max(1) as usize;

            match state.stage() {
                Stage::RigorSelect => {
                    render_status_line(frame, header_area(size), &status);
                    render_rigor_select(frame, body_area(size), rigor_cursor);
                }
                Stage::LanguageSelect => {
                    render_status_line(frame, header_area(size), &status);
                    render_language_select(
                        frame,
                        body_area(size),
                        language_cursor,
                        state.error.as_deref(),
                    );
                }
                Stage::Chat => {
                    let input_rows = input_visual_rows(input, input_width);
                    let max_input_height = size.height.saturating_sub(4).max(3);
                    let input_height = (input_rows as u16).clamp(1, max_input_height);
                    let error_height = if state.error.is_some() { 2 } else { 0 };

                    let layout = ratatui::layout::Layout::default()
                        .direction(ratatui::layout::Direction::Vertical)
                        .constraints([
                            ratatui::layout::Constraint::Length(1),
                            ratatui::layout::Constraint::Min(1),
                            ratatui::layout::Constraint::Length(error_height),
                            ratatui::layout::Constraint::Length(input_height),
                        ])
                        .split(size);

                    render_status_line(frame, layout[0], &status);
                    render_messages(
                        frame,
                        layout[1],
                        &state.messages,
                        state.streaming,
                        chat_scroll,
                        math,
                    );
                    if let Some(error) = state.error.as_deref() {
                        render_error_line(frame, layout[2], error);
                    }
                    render_input(frame, layout[3], input, caret, !state.request_pending);

                    if state.worksheet_visible {
                        if let Some(worksheet) = &state.worksheet {
                            render_worksheet_overlay(
                                frame,
                                worksheet,
                                math,
                                worksheet_scroll,
                                overlay_notice,
                            );
                        }
                    }
                }
            }
        })?;

        Ok(())
    }

    fn status_line(&self) -> String {
        let mut parts = vec!["P.A.M. — Socratic physics tutor".to_string()];

        if let Some(level) = self.state.rigor {
            parts.push(level.label().to_string());
        }
        if let Some(language) = self.state.language {
            parts.push(language.name.to_string());
        }
        if self.state.request_pending {
            parts.push(if self.state.streaming {
                "replying…".to_string()
            } else {
                "working…".to_string()
            });
        }

        match self.state.stage() {
            Stage::Chat => {
                parts.push("Ctrl+W worksheet · Ctrl+R start over · Ctrl+C quit".to_string())
            }
            _ => parts.push("Ctrl+C quit".to_string()),
        }

        parts.join("  ·  ")
    }

    fn process_terminal_events(&mut self) -> Result<()> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Paste(text) => {
                    if self.state.stage() == Stage::Chat
                        && !self.state.worksheet_visible
                        && !text.is_empty()
                    {
                        self.insert_str(&text);
                    }
                }
                Event::Key(key)
                    if key.kind == KeyEventKind::Press || key.kind == KeyEventKind::Repeat =>
                {
                    self.handle_key(key);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if self.state.worksheet_visible {
            self.handle_overlay_key(key);
            return;
        }

        match self.state.stage() {
            Stage::RigorSelect => self.handle_rigor_key(key),
            Stage::LanguageSelect => self.handle_language_key(key),
            Stage::Chat => self.handle_chat_key(key),
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => self.worksheet_scroll = self.worksheet_scroll.saturating_sub(1),
            KeyCode::Down => self.worksheet_scroll = self.worksheet_scroll.saturating_add(1),
            KeyCode::PageUp => self.worksheet_scroll = self.worksheet_scroll.saturating_sub(10),
            KeyCode::PageDown => self.worksheet_scroll = self.worksheet_scroll.saturating_add(10),
            KeyCode::Char('p') => self.print_worksheet(),
            KeyCode::Esc | KeyCode::Char('q') => {
                self.worksheet_scroll = 0;
                self.overlay_notice = None;
                self.dispatch(SessionEvent::WorksheetClosed);
            }
            _ => {}
        }
    }

    fn handle_rigor_key(&mut self, key: KeyEvent) {
        let count = RigorLevel::ALL.len();
        match key.code {
            KeyCode::Up => self.rigor_cursor = self.rigor_cursor.saturating_sub(1),
            KeyCode::Down => self.rigor_cursor = (self.rigor_cursor + 1).min(count - 1),
            KeyCode::Enter => {
                self.dispatch(SessionEvent::RigorChosen(RigorLevel::ALL[self.rigor_cursor]));
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => {
                let index = (ch as usize).wrapping_sub('1' as usize);
                if index < count {
                    self.rigor_cursor = index;
                    self.dispatch(SessionEvent::RigorChosen(RigorLevel::ALL[index]));
                }
            }
            _ => {}
        }
    }

    fn handle_language_key(&mut self, key: KeyEvent) {
        if self.state.request_pending {
            return;
        }
        let count = LANGUAGES.len();
        match key.code {
            KeyCode::Up => self.language_cursor = self.language_cursor.saturating_sub(1),
            KeyCode::Down => self.language_cursor = (self.language_cursor + 1).min(count - 1),
            KeyCode::Enter => {
                self.dispatch(SessionEvent::LanguageChosen(LANGUAGES[self.language_cursor]));
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => {
                let index = (ch as usize).wrapping_sub('1' as usize);
                if index < count.min(9) {
                    self.language_cursor = index;
                    self.dispatch(SessionEvent::LanguageChosen(LANGUAGES[index]));
                }
            }
            KeyCode::Esc => self.dispatch(SessionEvent::ResetRequested),
            _ => {}
        }
    }

    fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('w') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if self.state.can_request_worksheet() {
                    self.dispatch(SessionEvent::WorksheetRequested);
                }
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.input_buffer.clear();
                self.caret = 0;
                self.chat_scroll = 0;
                self.worksheet_scroll = 0;
                self.overlay_notice = None;
                self.rigor_cursor = 0;
                self.language_cursor = 0;
                self.dispatch(SessionEvent::ResetRequested);
            }
            KeyCode::PageUp => self.chat_scroll = self.chat_scroll.saturating_add(5),
            KeyCode::PageDown => self.chat_scroll = self.chat_scroll.saturating_sub(5),
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
                self.insert_str("\n");
            }
            KeyCode::Enter => {
                if self.state.can_submit() && !self.input_buffer.trim().is_empty() {
                    let text = std::mem::take(&mut self.input_buffer);
                    self.caret = 0;
                    self.chat_scroll = 0;
                    self.dispatch(SessionEvent::UserSubmitted(text));
                }
            }
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.caret = 0;
            }
            KeyCode::Home => self.caret = 0,
            KeyCode::End => self.caret = self.input_buffer.len(),
            KeyCode::Left => self.caret = self.prev_boundary(self.caret),
            KeyCode::Right => self.caret = self.next_boundary(self.caret),
            KeyCode::Backspace => {
                let end = self.clamp_caret(self.caret);
                if end > 0 {
                    let start = self.prev_boundary(end);
                    self.input_buffer.replace_range(start..end, "");
                    self.caret = start;
                }
            }
            KeyCode::Delete => {
                let start = self.clamp_caret(self.caret);
                if start < self.input_buffer.len() {
                    let end = self.next_boundary(start);
                    self.input_buffer.replace_range(start..end, "");
                    self.caret = start;
                }
            }
            KeyCode::Char(ch)
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT) =>
            {
                self.insert_str(&ch.to_string());
            }
            _ => {}
        }
    }

    fn clamp_caret(&self, index: usize) -> usize {
        crate::ui::input_metrics::floor_char_boundary(&self.input_buffer, index)
    }

    fn prev_boundary(&self, index: usize) -> usize {
        let clamped = self.clamp_caret(index);
        if clamped == 0 {
            return 0;
        }
        crate::ui::input_metrics::floor_char_boundary(&self.input_buffer, clamped - 1)
    }

    fn next_boundary(&self, index: usize) -> usize {
        let clamped = self.clamp_caret(index);
        match self.input_buffer[clamped..].chars().next() {
            Some(ch) => clamped + ch.len_utf8(),
            None => self.input_buffer.len(),
        }
    }

    fn insert_str(&mut self, value: &str) {
        let caret = self.clamp_caret(self.caret);
        self.input_buffer.insert_str(caret, value);
        self.caret = caret + value.len();
    }

    fn print_worksheet(&mut self) {
        let Some(worksheet) = &self.state.worksheet else {
            return;
        };
        let text = printable_text(worksheet);

        match send_to_spooler(&text) {
            Ok(()) => self.overlay_notice = Some("sent to printer".to_string()),
            Err(_) => match export_worksheet_file(&worksheet.title, &text) {
                Ok(path) => self.overlay_notice = Some(format!("saved to {path}")),
                Err(error) => self.overlay_notice = Some(format!("print failed: {error}")),
            },
        }
    }
}

fn header_area(size: ratatui::layout::Rect) -> ratatui::layout::Rect {
    ratatui::layout::Rect::new(size.x, size.y, size.width, 1.min(size.height))
}

fn body_area(size: ratatui::layout::Rect) -> ratatui::layout::Rect {
    ratatui::layout::Rect::new(
        size.x,
        size.y + 1.min(size.height),
        size.width,
        size.height.saturating_sub(1),
    )
}

fn plain_math_enabled() -> bool {
    std::env::var("PAM_PLAIN_MATH")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn send_to_spooler(text: &str) -> Result<()> {
    let mut child = ProcessCommand::new("lpr")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    child
        .stdin
        .as_mut()
        .ok_or_else(|| anyhow::anyhow!("lpr stdin unavailable"))?
        .write_all(text.as_bytes())?;
    let status = child.wait()?;
    if !status.success() {
        anyhow::bail!("lpr exited with {status}");
    }
    Ok(())
}

fn export_worksheet_file(title: &str, text: &str) -> Result<String> {
    let path = crate::state::worksheet::export_file_name(title);
    std::fs::write(&path, text)?;
    Ok(path)
}
