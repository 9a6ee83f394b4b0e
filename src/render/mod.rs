mod html;
mod svg;

pub use html::render_html;
pub use svg::render_svg;

use crate::config::{Config, RenderConfig};
use crate::error::RenderError;
use crate::ir::PlanNode;
use crate::layout::LayoutTree;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Absolutely positioned vector drawing.
    #[default]
    Svg,
    /// Nested blocks in normal document flow.
    Html,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Html => "html",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = RenderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "html" => Ok(Self::Html),
            _ => Err(RenderError::UnsupportedFormat(value.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub fn render(layout: &LayoutTree<'_>, format: OutputFormat, config: &Config) -> String {
    match format {
        OutputFormat::Svg => render_svg(layout, config),
        OutputFormat::Html => render_html(layout, config),
    }
}

/// Maps a cost onto a stroke width on a logarithmic scale clamped to
/// `[min_stroke_width, max_stroke_width]`. Non-decreasing in `cost`.
pub fn cost_weight(cost: Option<f64>, config: &RenderConfig) -> f32 {
    let min = config.min_stroke_width;
    let max = config.max_stroke_width.max(min);
    let Some(cost) = cost.filter(|cost| !cost.is_nan()) else {
        return min;
    };
    let ceiling = config.cost_ceiling.max(1.0);
    let t = ((1.0 + cost.max(0.0)).ln() / (1.0 + ceiling).ln()).clamp(0.0, 1.0);
    min + (max - min) * t as f32
}

/// Weight of a node: its cost, or its row estimate when no cost is known.
pub(crate) fn node_weight(node: &PlanNode, config: &RenderConfig) -> f32 {
    cost_weight(node.estimated_cost().or(node.estimated_rows), config)
}

pub(crate) fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\t' | '\n' | '\r' => out.push(ch),
            // Not allowed in XML 1.0, not even as character references.
            '\u{0}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}' => out.push('\u{fffd}'),
            _ => out.push(ch),
        }
    }
    out
}
