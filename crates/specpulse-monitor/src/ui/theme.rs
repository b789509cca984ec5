use ratatui::style::{Color, Modifier, Style};
use specpulse_core::protocol::LogLevel;

#[derive(Clone, Copy)]
pub struct Theme {
    pub border: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    pub info: Color,
}

pub fn dashboard_theme() -> Theme {
    Theme {
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

impl Theme {
    pub fn title_style(&self) -> Style {
        Style::default().fg(self.title).add_modifier(Modifier::BOLD)
    }

    pub fn header_style(&self) -> Style {
        Style::default().fg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn worker_id_style(&self) -> Style {
        Style::default().fg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn file_style(&self) -> Style {
        Style::default().fg(self.muted).add_modifier(Modifier::ITALIC)
    }

    pub fn level_style(&self, level: LogLevel) -> Style {
        let color = match level {
            LogLevel::Error => self.critical,
            LogLevel::Warning => self.warn,
            LogLevel::Debug => self.muted,
            _ => self.info,
        };
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    }
}
