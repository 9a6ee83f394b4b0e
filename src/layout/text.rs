use crate::config::LayoutConfig;
use crate::ir::PlanNode;
use crate::theme::Theme;

use super::TextBlock;

/// Fixed-advance approximation; no font is ever consulted so layouts are
/// identical across machines.
pub(super) fn char_width(font_size: f32, config: &LayoutConfig) -> f32 {
    font_size * config.char_width_ratio
}

pub(super) fn measure_lines(
    lines: Vec<String>,
    font_size: f32,
    config: &LayoutConfig,
) -> TextBlock {
    let max_chars = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
    TextBlock {
        width: max_chars as f32 * char_width(font_size, config),
        height: lines.len() as f32 * font_size * config.label_line_height,
        lines,
    }
}

pub(super) fn title_block(node: &PlanNode, theme: &Theme, config: &LayoutConfig) -> TextBlock {
    measure_lines(vec![node.kind.title().to_string()], theme.font_size, config)
}

pub(super) fn label_block(node: &PlanNode, theme: &Theme, config: &LayoutConfig) -> TextBlock {
    let lines = wrap_text(&node.label, config.max_label_width_chars, config.max_label_lines);
    measure_lines(lines, theme.font_size, config)
}

pub(super) fn details_block(node: &PlanNode, theme: &Theme, config: &LayoutConfig) -> TextBlock {
    let width = config.max_label_width_chars;
    let mut lines = Vec::new();
    if let Some(rows) = node.estimated_rows {
        lines.push(format!("rows: {}", format_metric("rows", rows)));
    }
    for (name, value) in &node.metrics {
        lines.push(truncate(&format!("{name}: {}", format_metric(name, *value)), width));
    }
    for name in &config.detail_attributes {
        if let Some(value) = node.attributes.get(name) {
            lines.push(truncate(&format!("{name}: {value}"), width));
        }
    }
    measure_lines(lines, theme.font_size * config.metric_font_scale, config)
}

/// Greedy word wrap. Words longer than a line are split; text beyond
/// `max_lines` is cut with an ellipsis.
pub(super) fn wrap_text(text: &str, max_chars: usize, max_lines: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }
        let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
        if needed > max_chars {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }
    if current_len > 0 {
        lines.push(current);
    }

    if lines.len() > max_lines.max(1) {
        lines.truncate(max_lines.max(1));
        if let Some(last) = lines.last_mut() {
            let mut chars: Vec<char> = last.chars().collect();
            if chars.len() >= max_chars {
                chars.truncate(max_chars.saturating_sub(1));
            }
            chars.push('…');
            *last = chars.into_iter().collect();
        }
    }
    lines
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn format_metric(name: &str, value: f64) -> String {
    if name == "data_read" {
        return format_bytes(value);
    }
    if name.contains("filtered") {
        return format!("{}%", trim_decimals(value));
    }
    if name == "rows" || name.contains("rows") || name == "loops" {
        return format_count(value);
    }
    trim_decimals(value)
}

fn trim_decimals(value: f64) -> String {
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn format_count(value: f64) -> String {
    if value >= 1e9 {
        format!("{}G", trim_decimals(value / 1e9))
    } else if value >= 1e6 {
        format!("{}M", trim_decimals(value / 1e6))
    } else if value >= 1e4 {
        format!("{}K", trim_decimals(value / 1e3))
    } else {
        trim_decimals(value)
    }
}

fn format_bytes(value: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = value;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", trim_decimals(value), UNITS[unit])
}
