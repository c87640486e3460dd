//! Latest-bill comparison panel.

use bill_core::calculations::{ComparisonResult, CostTrend};
use bill_core::formatting::format_fixed;
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::themes::Theme;

/// Headline verdict for a trend.
pub fn verdict(trend: CostTrend) -> &'static str {
    match trend {
        CostTrend::Improved => "節約達成!",
        CostTrend::Worse => "要改善",
    }
}

/// Text lines describing `result` for the view labelled `view_label`.
///
/// The first line is the headline; plain-text output prints them as is.
pub fn summary_lines(result: Option<&ComparisonResult>, view_label: &str) -> Vec<String> {
    let Some(result) = result else {
        return vec![format!(
            "現在選択されている記録（{view_label}）のデータが2件未満のため、比較できません。"
        )];
    };

    let (arrow, direction) = match result.trend {
        CostTrend::Improved => ("↓", "安い"),
        CostTrend::Worse => ("↑", "高い"),
    };
    vec![
        format!("{view_label} の最新データ比較結果: {}", verdict(result.trend)),
        format!("最新の日平均料金: {} 円/日", format_fixed(result.latest, 2)),
        format!(
            "過去の平均日料金: {} 円/日",
            format_fixed(result.historical_average, 2)
        ),
        format!(
            "最新の請求は過去平均より: {arrow} {} 円/日 ({}%) {direction}",
            format_fixed(result.difference.abs(), 2),
            format_fixed(result.percent_change.abs(), 1)
        ),
    ]
}

/// Render the comparison panel into `area`.
pub fn render_comparison(
    frame: &mut Frame,
    area: Rect,
    result: Option<&ComparisonResult>,
    view_label: &str,
    theme: &Theme,
) {
    let lines = summary_lines(result, view_label);
    let (headline_style, detail_style): (Style, Style) = match result {
        Some(r) => (theme.trend_style(r.trend), theme.text),
        None => (theme.warning, theme.dim),
    };
    let last = lines.len().saturating_sub(1);

    let text: Vec<Line> = lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let style = if i == 0 || (i == last && result.is_some()) {
                headline_style
            } else {
                detail_style
            };
            Line::from(Span::styled(line, style))
        })
        .collect();

    frame.render_widget(
        Paragraph::new(Text::from(text)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.separator)
                .title(" 比較 "),
        ),
        area,
    );
}
