//! Bill table for the tracker TUI.
//!
//! Renders one row per projected bill, newest first, inside a bordered
//! [`ratatui::widgets::Table`]. Merged rows are highlighted and the newest
//! row is bold.

use bill_core::formatting::{format_fixed, format_number};
use bill_core::models::DerivedBillRecord;
use bill_core::time_utils::format_record_date;
use chrono_tz::Tz;
use ratatui::{
    layout::{Constraint, Rect},
    style::Modifier,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::themes::Theme;

/// Shown for empty recorder or contract names.
pub const UNSET_LABEL: &str = "未設定";

/// Column titles of the bill table.
pub const COLUMN_TITLES: [&str; 9] = [
    "記録者名",
    "契約種別",
    "料金年月分",
    "日数",
    "使用量",
    "合計料金",
    "日平均使用量",
    "日平均料金",
    "メモ",
];

/// Display strings for one bill.
#[derive(Debug, Clone, PartialEq)]
pub struct BillRow {
    pub id: String,
    pub recorder: String,
    pub contract: String,
    /// Billing period, or the record date when the period is blank.
    pub period: String,
    pub days: String,
    pub usage: String,
    pub cost: String,
    pub daily_usage: String,
    pub daily_cost: String,
    pub notes: String,
    /// `true` for rows merged from several bills.
    pub merged: bool,
}

impl BillRow {
    pub fn from_derived(derived: &DerivedBillRecord, tz: Tz) -> Self {
        let r = &derived.record;
        let or_unset = |s: &str| {
            if s.trim().is_empty() {
                UNSET_LABEL.to_string()
            } else {
                s.to_string()
            }
        };
        Self {
            id: r.id.clone(),
            recorder: or_unset(&r.recorder_name),
            contract: or_unset(&r.contract_type),
            period: if r.billing_date.is_empty() {
                format_record_date(r.timestamp, tz)
            } else {
                r.billing_date.clone()
            },
            days: r.period_days.to_string(),
            usage: format_fixed(r.usage_kwh, 2),
            cost: format_number(r.total_cost, 0),
            daily_usage: format_fixed(derived.daily_usage, 2),
            daily_cost: format_fixed(derived.daily_cost, 2),
            notes: if r.notes.is_empty() {
                "-".to_string()
            } else {
                r.notes.clone()
            },
            merged: derived.is_merged(),
        }
    }

    /// Cell values in [`COLUMN_TITLES`] order.
    pub fn cells(&self) -> [&str; 9] {
        [
            self.recorder.as_str(),
            self.contract.as_str(),
            self.period.as_str(),
            self.days.as_str(),
            self.usage.as_str(),
            self.cost.as_str(),
            self.daily_usage.as_str(),
            self.daily_cost.as_str(),
            self.notes.as_str(),
        ]
    }
}

/// Build display rows for a projection.
pub fn build_rows(records: &[DerivedBillRecord], tz: Tz) -> Vec<BillRow> {
    records.iter().map(|d| BillRow::from_derived(d, tz)).collect()
}

/// Render the bill table into `area`, titled `title`.
pub fn render_table_view(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    rows: &[BillRow],
    state: &mut TableState,
    theme: &Theme,
) {
    let header = Row::new(
        COLUMN_TITLES
            .iter()
            .map(|h| Cell::from(*h).style(theme.table_header)),
    )
    .height(1);

    let data_rows: Vec<Row> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut style = theme.row_style(i, row.merged);
            if i == 0 {
                style = style.add_modifier(Modifier::BOLD);
            }
            Row::new(row.cells().map(|c| Cell::from(c.to_string()))).style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(12),
        Constraint::Min(16),
        Constraint::Length(12),
        Constraint::Length(5),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Min(10),
    ];

    let table = Table::new(data_rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.table_border)
                .title(format!(" {} ", title)),
        )
        .row_highlight_style(theme.value.add_modifier(Modifier::REVERSED))
        .style(theme.text);

    frame.render_stateful_widget(table, area, state);
}

/// Render a placeholder when the view has no bills.
pub fn render_no_data(frame: &mut Frame, area: Rect, title: &str, theme: &Theme) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled("該当するデータはありません。", theme.warning)),
        Line::from(""),
        Line::from(Span::styled(
            "Add a bill with `bill-tracker add` or `bill-tracker scan <IMAGE>`.",
            theme.dim,
        )),
        Line::from(Span::styled(
            "Press 'v' to change the view, 'q' or Ctrl+C to exit",
            theme.dim,
        )),
    ];
    frame.render_widget(
        Paragraph::new(Text::from(text)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", title)),
        ),
        area,
    );
}

// ── Tests ──────────────────────────────────────────────────────────────────────
