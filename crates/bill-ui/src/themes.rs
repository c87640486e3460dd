use bill_core::calculations::CostTrend;
use ratatui::style::{Color, Modifier, Style};

/// Terminal background type detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackgroundType {
    Dark,
    Light,
}

/// Detect the terminal background from `COLORFGBG` (`"fg;bg"`).
///
/// Background values 0–6 are dark, 7–15 light. Anything else is treated as
/// dark.
pub fn detect_background() -> BackgroundType {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|val| val.split(';').next_back()?.parse::<u8>().ok())
        .map(|bg| {
            if bg <= 6 {
                BackgroundType::Dark
            } else {
                BackgroundType::Light
            }
        })
        .unwrap_or(BackgroundType::Dark)
}

/// Styles used by the bill views.
#[derive(Debug, Clone)]
pub struct Theme {
    // ── Header ───────────────────────────────────────────────────────────────
    pub header: Style,
    pub separator: Style,

    // ── Text ─────────────────────────────────────────────────────────────────
    pub text: Style,
    pub dim: Style,
    pub label: Style,
    pub value: Style,

    // ── Status ───────────────────────────────────────────────────────────────
    pub info: Style,
    pub warning: Style,

    // ── Table ────────────────────────────────────────────────────────────────
    pub table_header: Style,
    pub table_border: Style,
    pub table_row: Style,
    pub table_row_alt: Style,
    /// Rows produced by merging several bills.
    pub merged_row: Style,

    // ── Comparison ───────────────────────────────────────────────────────────
    pub trend_improved: Style,
    pub trend_worse: Style,
}

impl Theme {
    /// Dark-background terminal theme (default).
    pub fn dark() -> Self {
        Self {
            header: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            separator: Style::default().fg(Color::DarkGray),

            text: Style::default().fg(Color::White),
            dim: Style::default().fg(Color::DarkGray),
            label: Style::default().fg(Color::Gray),
            value: Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),

            info: Style::default().fg(Color::Cyan),
            warning: Style::default().fg(Color::Yellow),

            table_header: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            table_border: Style::default().fg(Color::DarkGray),
            table_row: Style::default().fg(Color::White),
            table_row_alt: Style::default().fg(Color::Gray),
            merged_row: Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),

            trend_improved: Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
            trend_worse: Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD),
        }
    }

    /// Light-background terminal theme.
    pub fn light() -> Self {
        Self {
            header: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            separator: Style::default().fg(Color::Gray),

            text: Style::default().fg(Color::Black),
            dim: Style::default().fg(Color::Gray),
            label: Style::default().fg(Color::DarkGray),
            value: Style::default()
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),

            info: Style::default().fg(Color::Blue),
            warning: Style::default().fg(Color::Yellow),

            table_header: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            table_border: Style::default().fg(Color::Gray),
            table_row: Style::default().fg(Color::Black),
            table_row_alt: Style::default().fg(Color::DarkGray),
            merged_row: Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),

            trend_improved: Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
            trend_worse: Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD),
        }
    }

    /// Basic 8-colour ANSI palette, no bold.
    pub fn classic() -> Self {
        Self {
            header: Style::default().fg(Color::Cyan),
            separator: Style::default().fg(Color::DarkGray),

            text: Style::default().fg(Color::White),
            dim: Style::default().fg(Color::DarkGray),
            label: Style::default().fg(Color::Gray),
            value: Style::default().fg(Color::White),

            info: Style::default().fg(Color::Cyan),
            warning: Style::default().fg(Color::Yellow),

            table_header: Style::default().fg(Color::Cyan),
            table_border: Style::default().fg(Color::DarkGray),
            table_row: Style::default().fg(Color::White),
            table_row_alt: Style::default().fg(Color::Gray),
            merged_row: Style::default().fg(Color::Magenta),

            trend_improved: Style::default().fg(Color::Green),
            trend_worse: Style::default().fg(Color::Red),
        }
    }

    /// Choose a theme from the detected terminal background.
    pub fn auto_detect() -> Self {
        match detect_background() {
            BackgroundType::Light => Self::light(),
            BackgroundType::Dark => Self::dark(),
        }
    }

    /// Construct a theme by name. Unknown names (and `auto`) detect.
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            "dark" => Self::dark(),
            "classic" => Self::classic(),
            _ => Self::auto_detect(),
        }
    }

    // ── Style helpers ────────────────────────────────────────────────────────

    pub fn trend_style(&self, trend: CostTrend) -> Style {
        match trend {
            CostTrend::Improved => self.trend_improved,
            CostTrend::Worse => self.trend_worse,
        }
    }

    /// Style of table row `index`; merged rows stand out.
    pub fn row_style(&self, index: usize, merged: bool) -> Style {
        if merged {
            self.merged_row
        } else if index % 2 == 0 {
            self.table_row
        } else {
            self.table_row_alt
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dark_theme_creation() {
        let t = Theme::dark();
        assert_eq!(t.header.fg, Some(Color::Cyan));
        assert_eq!(t.trend_improved.fg, Some(Color::Green));
        assert_eq!(t.trend_worse.fg, Some(Color::Red));
    }

    #[test]
    fn test_light_theme_creation() {
        let t = Theme::light();
        assert_eq!(t.header.fg, Some(Color::Blue));
        assert_eq!(t.text.fg, Some(Color::Black));
        assert_eq!(t.table_row.fg, Some(Color::Black));
    }

    #[test]
    fn test_classic_theme_has_no_bold() {
        let t = Theme::classic();
        assert!(!t.header.add_modifier.contains(Modifier::BOLD));
        assert!(!t.trend_worse.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Theme::from_name("light").header.fg, Some(Color::Blue));
        assert_eq!(Theme::from_name("classic").value.fg, Some(Color::White));
        assert!(Theme::from_name("does-not-exist").header.fg.is_some());
    }

    #[test]
    fn test_trend_style() {
        let t = Theme::dark();
        assert_eq!(t.trend_style(CostTrend::Improved).fg, Some(Color::Green));
        assert_eq!(t.trend_style(CostTrend::Worse).fg, Some(Color::Red));
    }

    #[test]
    fn test_row_style_alternates_and_highlights_merged() {
        let t = Theme::dark();
        assert_eq!(t.row_style(0, false), t.table_row);
        assert_eq!(t.row_style(1, false), t.table_row_alt);
        assert_eq!(t.row_style(1, true), t.merged_row);
    }
}
