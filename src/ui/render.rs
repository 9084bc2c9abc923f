use crate::math::MathRenderer;
use crate::state::worksheet::sorted_answer_key;
use crate::types::{Message, RigorLevel, Sender, Worksheet, LANGUAGES};
use crate::ui::input_metrics::{clip_to_width, wrap_to_width, wrap_with_caret};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

pub fn input_visual_rows(input: &str, width: usize) -> usize {
    wrap_to_width(input, width.max(1)).len().max(1)
}

pub fn render_status_line(frame: &mut Frame<'_>, area: Rect, status: &str) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let text = clip_to_width(status, area.width as usize);
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn selection_panel(
    frame: &mut Frame<'_>,
    area: Rect,
    title: &str,
    subtitle: &str,
    entries: &[String],
    cursor: usize,
) {
    if area.height < 4 || area.width < 10 {
        return;
    }

    let mut lines = vec![
        Line::styled(
            title.to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Line::styled(subtitle.to_string(), Style::default().fg(Color::DarkGray)),
        Line::from(""),
    ];

    for (index, entry) in entries.iter().enumerate() {
        let marker = if index == cursor { "▶ " } else { "  " };
        let style = if index == cursor {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        lines.push(Line::styled(format!("{marker}{entry}"), style));
    }

    lines.push(Line::from(""));
    lines.push(Line::styled(
        "↑/↓ move · Enter select · digits jump",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false }),
        area,
    );
}

pub fn render_rigor_select(frame: &mut Frame<'_>, area: Rect, cursor: usize) {
    let entries: Vec<String> = RigorLevel::ALL
        .iter()
        .enumerate()
        .map(|(index, level)| format!("{}. {}", index + 1, level.label()))
        .collect();
    selection_panel(
        frame,
        area,
        "Welcome to Physicus Aurelius Maximus",
        "To get started, please select your current physics level.",
        &entries,
        cursor,
    );
}

pub fn render_language_select(
    frame: &mut Frame<'_>,
    area: Rect,
    cursor: usize,
    error: Option<&str>,
) {
    let entries: Vec<String> = LANGUAGES
        .iter()
        .enumerate()
        .map(|(index, language)| format!("{:>2}. {}", index + 1, language.name))
        .collect();

    let panel = if let Some(error) = error {
        let error_height = 2;
        let split = area.height.saturating_sub(error_height);
        let error_area = Rect::new(area.x, area.y + split, area.width, error_height.min(area.height));
        frame.render_widget(
            Paragraph::new(error.to_string())
                .style(Style::default().fg(Color::Red))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            error_area,
        );
        Rect::new(area.x, area.y, area.width, split)
    } else {
        area
    };

    selection_panel(
        frame,
        panel,
        "Select Language",
        "Please choose the language for your session.",
        &entries,
        cursor,
    );
}

/// Conversation transcript: user messages right-aligned, tutor messages
/// left-aligned. Finalized text goes through the math renderer; the single
/// in-flight streaming message stays raw so half-received LaTeX is never
/// typeset.
pub fn render_messages(
    frame: &mut Frame<'_>,
    area: Rect,
    messages: &[Message],
    streaming: bool,
    scroll: usize,
    math: &MathRenderer,
) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let wrap_width = (area.width as usize).saturating_sub(4).max(8);
    let mut lines: Vec<Line> = Vec::new();

    for (index, message) in messages.iter().enumerate() {
        let is_streaming_message =
            streaming && index == messages.len() - 1 && message.sender == Sender::Assistant;

        let text = if is_streaming_message {
            let mut raw = message.text.clone();
            raw.push('▌');
            raw
        } else {
            math.typeset(&message.text)
        };

        let (alignment, style) = match message.sender {
            Sender::User => (
                Alignment::Right,
                Style::default().fg(Color::Cyan),
            ),
            Sender::Assistant => (Alignment::Left, Style::default().fg(Color::White)),
        };

        for source_line in text.lines() {
            if source_line.is_empty() {
                lines.push(Line::from(""));
                continue;
            }
            for wrapped in wrap_to_width(source_line, wrap_width) {
                lines.push(Line::styled(wrapped, style).alignment(alignment));
            }
        }
        if text.is_empty() {
            lines.push(Line::styled(String::new(), style).alignment(alignment));
        }
        lines.push(Line::from(""));
    }

    // Follow the newest line unless the user scrolled back.
    let visible = area.height as usize;
    let bottom_start = lines.len().saturating_sub(visible);
    let offset = bottom_start.saturating_sub(scroll);

    frame.render_widget(
        Paragraph::new(Text::from(lines)).scroll((offset as u16, 0)),
        area,
    );
}

pub fn render_error_line(frame: &mut Frame<'_>, area: Rect, error: &str) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    frame.render_widget(
        Paragraph::new(error.to_string())
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        area,
    );
}

pub fn render_input(
    frame: &mut Frame<'_>,
    area: Rect,
    input: &str,
    caret_byte: usize,
    enabled: bool,
) {
    if area.height == 0 || area.width <= 2 {
        return;
    }

    let input_width = area.width.saturating_sub(2).max(1) as usize;
    let wrapped = wrap_with_caret(input, caret_byte, input_width);
    let visible_rows = area.height as usize;
    let window_start = wrapped.caret_row.saturating_add(1).saturating_sub(visible_rows);

    let mut rendered = Vec::with_capacity(visible_rows);
    for offset in 0..visible_rows {
        let row_index = window_start + offset;
        let prefix = if row_index == 0 { "> " } else { "  " };
        let line = wrapped.lines.get(row_index).cloned().unwrap_or_default();
        rendered.push(Line::from(format!("{prefix}{line}")));
    }

    let style = if enabled {
        Style::default().fg(Color::Gray).bg(Color::Rgb(24, 24, 24))
    } else {
        Style::default()
            .fg(Color::DarkGray)
            .bg(Color::Rgb(24, 24, 24))
            .add_modifier(Modifier::DIM)
    };

    frame.render_widget(
        Paragraph::new(rendered).style(style).wrap(Wrap { trim: false }),
        area,
    );

    if enabled {
        let caret_y = area
            .y
            .saturating_add(wrapped.caret_row.saturating_sub(window_start) as u16);
        let caret_x = area
            .x
            .saturating_add(2 + wrapped.caret_col as u16)
            .min(area.x.saturating_add(area.width.saturating_sub(1)));
        frame.set_cursor_position((caret_x, caret_y));
    }
}

/// Builds the overlay body shown for a generated worksheet: questions in
/// generator order, then the answer key sorted by question number. Returned
/// as plain lines so the overlay can scroll them.
pub fn worksheet_overlay_lines(
    worksheet: &Worksheet,
    math: &MathRenderer,
    width: usize,
) -> Vec<Line<'static>> {
    let wrap_width = width.max(8);
    let mut lines: Vec<Line<'static>> = Vec::new();

    let mut push_wrapped = |text: &str, style: Style, lines: &mut Vec<Line<'static>>| {
        for source_line in text.lines() {
            if source_line.is_empty() {
                lines.push(Line::from(""));
                continue;
            }
            for wrapped in wrap_to_width(source_line, wrap_width) {
                lines.push(Line::styled(wrapped, style));
            }
        }
    };

    lines.push(Line::styled(
        worksheet.title.clone(),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ));
    lines.push(Line::from(""));

    for question in &worksheet.questions {
        let body = math.typeset(&question.question_text);
        push_wrapped(
            &format!("{}. {}", question.question_number, body),
            Style::default().fg(Color::White),
            &mut lines,
        );
        lines.push(Line::from(""));
    }

    lines.push(Line::styled(
        "┄".repeat(wrap_width.min(48)),
        Style::default().fg(Color::DarkGray),
    ));
    lines.push(Line::styled(
        "Answer Key",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ));
    lines.push(Line::from(""));

    for answer in sorted_answer_key(worksheet) {
        let body = math.typeset(&answer.answer_text);
        push_wrapped(
            &format!("{}. {}", answer.question_number, body),
            Style::default().fg(Color::White),
            &mut lines,
        );
    }

    lines
}

pub fn render_worksheet_overlay(
    frame: &mut Frame<'_>,
    worksheet: &Worksheet,
    math: &MathRenderer,
    scroll: usize,
    notice: Option<&str>,
) {
    let size = frame.area();
    let width = size.width.saturating_mul(9) / 10;
    let height = size.height.saturating_mul(9) / 10;
    let width = width.clamp(20, size.width);
    let height = height.clamp(8, size.height);
    let x = size.x + (size.width.saturating_sub(width)) / 2;
    let y = size.y + (size.height.saturating_sub(height)) / 2;
    let area = Rect::new(x, y, width, height);
    frame.render_widget(Clear, area);

    let footer = match notice {
        Some(notice) => notice.to_string(),
        None => "↑/↓ scroll · p print · Esc close".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(clip_to_width(&worksheet.title, width.saturating_sub(4) as usize))
        .title_bottom(Line::styled(footer, Style::default().fg(Color::DarkGray)))
        .style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = worksheet_overlay_lines(worksheet, math, inner.width.saturating_sub(2) as usize);
    let max_scroll = lines.len().saturating_sub(inner.height as usize);
    let scroll = scroll.min(max_scroll);

    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(Color::White))
            .scroll((scroll as u16, 0)),
        inner,
    );
}
