//! Custom TUI widgets

use super::theme::ThemeColors;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Severity of one status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Ok,
    Warning,
    Error,
    Info,
}

/// One labelled value in a status panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub label: String,
    pub value: String,
    pub status: RowStatus,
}

impl StatusRow {
    pub fn new(label: impl Into<String>, value: impl Into<String>, status: RowStatus) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            status,
        }
    }

    pub fn info(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(label, value, RowStatus::Info)
    }

    /// Ok when `good`, otherwise warning
    pub fn check(label: impl Into<String>, value: impl Into<String>, good: bool) -> Self {
        let status = if good { RowStatus::Ok } else { RowStatus::Warning };
        Self::new(label, value, status)
    }
}

/// Widget for displaying status rows
pub struct StatusPanel<'a> {
    rows: &'a [StatusRow],
    title: &'a str,
    colors: ThemeColors,
}

impl<'a> StatusPanel<'a> {
    pub fn new(rows: &'a [StatusRow], title: &'a str, colors: ThemeColors) -> Self {
        Self {
            rows,
            title,
            colors,
        }
    }

    fn status_symbol(status: RowStatus) -> &'static str {
        match status {
            RowStatus::Ok => "[OK]",
            RowStatus::Warning => "[!!]",
            RowStatus::Error => "[XX]",
            RowStatus::Info => "[--]",
        }
    }
}

impl<'a> Widget for StatusPanel<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(self.title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.colors.dim));

        let inner = block.inner(area);
        block.render(area, buf);

        for (row, y) in self.rows.iter().zip(inner.y..inner.y + inner.height) {
            let color = self.colors.status(row.status);
            let line = Line::from(vec![
                Span::styled(
                    format!("{} ", Self::status_symbol(row.status)),
                    Style::default().fg(color),
                ),
                Span::styled(
                    format!("{:<18}", format!("{}:", row.label)),
                    Style::default()
                        .fg(self.colors.fg)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(&row.value, Style::default().fg(color)),
            ]);
            buf.set_line(inner.x, y, &line, inner.width);
        }
    }
}

/// Widget for the help screen
pub struct HelpPanel {
    colors: ThemeColors,
}

impl HelpPanel {
    pub fn new(colors: ThemeColors) -> Self {
        Self { colors }
    }
}

impl Widget for HelpPanel {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title("Help - Touchpad Keyboard")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.colors.accent));

        let inner = block.inner(area);
        block.render(area, buf);

        let help_text = [
            "",
            " NAVIGATION",
            " -----------",
            " Tab / Shift+Tab  : Switch between views",
            " q / Esc          : Quit (held modifiers are released)",
            "",
            " CONTROLS",
            " -----------",
            " Space            : Pause/Resume listening",
            " b                : Toggle preferred backend",
            " c                : Check the privileged backend now",
            " e                : Export session report to JSON",
            " ?                : Show this help",
            "",
            " TOUCHES",
            " -----------",
            " Tap a key region : Key down and up",
            " Hold Space       : Enter (Backspace: Delete)",
            " Rest on Shift    : Shift held until lifted",
        ];

        for (line, y) in help_text.iter().zip(inner.y..inner.y + inner.height) {
            let style = if line.contains("---") {
                Style::default().fg(self.colors.dim)
            } else if line.trim_start().starts_with(|c: char| c.is_ascii_uppercase())
                && line.trim() == line.trim().to_ascii_uppercase()
            {
                Style::default()
                    .fg(self.colors.warning)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.colors.fg)
            };
            buf.set_string(inner.x, y, line, style);
        }
    }
}

/// Status bar widget
pub struct StatusBar<'a> {
    state: &'a str,
    view: &'a str,
    elapsed: &'a str,
    frames: u64,
    message: Option<&'a str>,
    colors: ThemeColors,
}

impl<'a> StatusBar<'a> {
    pub fn new(
        state: &'a str,
        view: &'a str,
        elapsed: &'a str,
        frames: u64,
        colors: ThemeColors,
    ) -> Self {
        Self {
            state,
            view,
            elapsed,
            frames,
            message: None,
            colors,
        }
    }

    pub fn message(mut self, message: Option<&'a str>) -> Self {
        self.message = message;
        self
    }
}

impl<'a> Widget for StatusBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bg_style = Style::default().bg(self.colors.bar_bg).fg(self.colors.fg);
        for x in area.x..area.x + area.width {
            buf.set_string(x, area.y, " ", bg_style);
        }

        let left = format!(" {} | {} ", self.state, self.view);
        buf.set_string(area.x, area.y, &left, bg_style.add_modifier(Modifier::BOLD));

        if let Some(msg) = self.message {
            let msg_style = bg_style.fg(self.colors.warning);
            let msg_x = area.x + (area.width / 2).saturating_sub(msg.len() as u16 / 2);
            buf.set_string(msg_x, area.y, msg, msg_style);
        }

        let right = format!(" {} | Frames: {} ", self.elapsed, self.frames);
        let right_x = area.x + area.width.saturating_sub(right.len() as u16);
        buf.set_string(right_x, area.y, &right, bg_style);
    }
}

/// Tab bar widget
pub struct TabBar<'a> {
    tabs: &'a [&'a str],
    selected: usize,
    colors: ThemeColors,
}

impl<'a> TabBar<'a> {
    pub fn new(tabs: &'a [&'a str], selected: usize, colors: ThemeColors) -> Self {
        Self {
            tabs,
            selected,
            colors,
        }
    }
}

impl<'a> Widget for TabBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let end = area.x + area.width;
        let mut x = area.x;

        for (i, tab) in self.tabs.iter().enumerate() {
            let style = if i == self.selected {
                Style::default()
                    .fg(self.colors.on_accent)
                    .bg(self.colors.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.colors.fg).bg(self.colors.bar_bg)
            };

            let label = format!(" {} ", tab);
            let width = label.len() as u16;
            if x + width > end {
                break;
            }
            buf.set_string(x, area.y, &label, style);
            x += width;

            if i + 1 < self.tabs.len() && x < end {
                buf.set_string(x, area.y, "|", Style::default().fg(self.colors.dim));
                x += 1;
            }
        }

        for fill_x in x..end {
            buf.set_string(fill_x, area.y, " ", Style::default().bg(self.colors.bar_bg));
        }
    }
}
