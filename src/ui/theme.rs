//! Theme color definitions for the UI
//!
//! Dark and light palettes, selected from the config.

use super::widgets::RowStatus;
use crate::config::Theme;
use ratatui::style::Color;

/// Color palette for the status readout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeColors {
    pub fg: Color,
    /// Borders, separators
    pub dim: Color,
    /// Headings, selected tab, informational rows
    pub accent: Color,
    pub ok: Color,
    pub warning: Color,
    pub error: Color,
    /// Status and tab bar background
    pub bar_bg: Color,
    /// Text on the accent color
    pub on_accent: Color,
}

impl ThemeColors {
    pub fn from_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self::dark(),
            Theme::Light => Self::light(),
        }
    }

    pub fn dark() -> Self {
        Self {
            fg: Color::Rgb(205, 205, 215),
            dim: Color::Rgb(85, 88, 105),
            accent: Color::Rgb(95, 175, 235),
            ok: Color::Rgb(90, 205, 125),
            warning: Color::Rgb(235, 185, 85),
            error: Color::Rgb(235, 95, 105),
            bar_bg: Color::Rgb(38, 40, 52),
            on_accent: Color::Rgb(18, 18, 24),
        }
    }

    /// High contrast for bright terminals
    pub fn light() -> Self {
        Self {
            fg: Color::Rgb(28, 28, 36),
            dim: Color::Rgb(135, 135, 150),
            accent: Color::Rgb(20, 110, 180),
            ok: Color::Rgb(25, 140, 65),
            warning: Color::Rgb(175, 115, 0),
            error: Color::Rgb(195, 45, 55),
            bar_bg: Color::Rgb(218, 220, 228),
            on_accent: Color::Rgb(250, 250, 252),
        }
    }

    /// Color for a row of the given severity
    pub fn status(&self, status: RowStatus) -> Color {
        match status {
            RowStatus::Ok => self.ok,
            RowStatus::Warning => self.warning,
            RowStatus::Error => self.error,
            RowStatus::Info => self.accent,
        }
    }
}
