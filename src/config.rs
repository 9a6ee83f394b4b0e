use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeRouting {
    Straight,
    Elbow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Horizontal gap between sibling subtrees.
    pub node_spacing: f32,
    /// Vertical gap between a node and its children.
    pub rank_spacing: f32,
    pub node_padding_x: f32,
    pub node_padding_y: f32,
    pub margin: f32,
    pub min_node_width: f32,
    /// Monospace advance as a fraction of the font size.
    pub char_width_ratio: f32,
    pub label_line_height: f32,
    pub metric_font_scale: f32,
    pub max_label_width_chars: usize,
    pub max_label_lines: usize,
    pub edge_routing: EdgeRouting,
    /// Attributes listed under the metrics, in this order.
    pub detail_attributes: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_spacing: 24.0,
            rank_spacing: 36.0,
            node_padding_x: 10.0,
            node_padding_y: 8.0,
            margin: 16.0,
            min_node_width: 96.0,
            char_width_ratio: 0.6,
            label_line_height: 1.4,
            metric_font_scale: 0.85,
            max_label_width_chars: 32,
            max_label_lines: 4,
            edge_routing: EdgeRouting::Elbow,
            detail_attributes: [
                "access_type",
                "key",
                "condition",
                "join_buffer",
                "using_filesort",
                "using_temporary",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub min_stroke_width: f32,
    pub max_stroke_width: f32,
    /// Cost at which the stroke reaches `max_stroke_width`.
    pub cost_ceiling: f64,
    pub corner_radius: f32,
    pub title: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_stroke_width: 1.0,
            max_stroke_width: 6.0,
            cost_ceiling: 1_000_000.0,
            corner_radius: 4.0,
            title: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub render: RenderConfig,
    /// Plans larger than this still render, with a warning.
    pub max_nodes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: Theme::classic(),
            layout: LayoutConfig::default(),
            render: RenderConfig::default(),
            max_nodes: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    font_size: Option<f32>,
    primary_text_color: Option<String>,
    secondary_text_color: Option<String>,
    primary_border_color: Option<String>,
    line_color: Option<String>,
    background: Option<String>,
    node_fill: Option<String>,
    scan_color: Option<String>,
    lookup_color: Option<String>,
    join_color: Option<String>,
    staging_color: Option<String>,
    subquery_color: Option<String>,
    unknown_color: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    node_spacing: Option<f32>,
    rank_spacing: Option<f32>,
    node_padding_x: Option<f32>,
    node_padding_y: Option<f32>,
    margin: Option<f32>,
    min_node_width: Option<f32>,
    char_width_ratio: Option<f32>,
    label_line_height: Option<f32>,
    metric_font_scale: Option<f32>,
    max_label_width_chars: Option<usize>,
    max_label_lines: Option<usize>,
    edge_routing: Option<EdgeRouting>,
    detail_attributes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RenderConfigFile {
    min_stroke_width: Option<f32>,
    max_stroke_width: Option<f32>,
    cost_ceiling: Option<f64>,
    corner_radius: Option<f32>,
    title: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    layout: Option<LayoutConfigFile>,
    render: Option<RenderConfigFile>,
    max_nodes: Option<usize>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Theme values end up inside CSS declarations and an inline `<style>`, so
/// anything that could end either is refused.
fn css_value(name: &str, value: String) -> anyhow::Result<String> {
    if let Some(ch) = value.chars().find(|ch| matches!(ch, '<' | '>' | ';' | '{' | '}')) {
        anyhow::bail!("themeVariables.{name} must not contain {ch:?}");
    }
    Ok(value)
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = serde_json::from_str(contents)?;

    if let Some(theme_name) = parsed.theme.as_deref() {
        config.theme = Theme::by_name(theme_name)
            .ok_or_else(|| anyhow::anyhow!("unknown theme {theme_name:?}"))?;
    }

    if let Some(vars) = parsed.theme_variables {
        let theme = &mut config.theme;
        if let Some(v) = vars.font_family {
            theme.font_family = css_value("fontFamily", v)?;
        }
        if let Some(v) = vars.font_size {
            theme.font_size = v;
        }
        if let Some(v) = vars.primary_text_color {
            theme.primary_text_color = css_value("primaryTextColor", v)?;
        }
        if let Some(v) = vars.secondary_text_color {
            theme.secondary_text_color = css_value("secondaryTextColor", v)?;
        }
        if let Some(v) = vars.primary_border_color {
            theme.primary_border_color = css_value("primaryBorderColor", v)?;
        }
        if let Some(v) = vars.line_color {
            theme.line_color = css_value("lineColor", v)?;
        }
        if let Some(v) = vars.background {
            theme.background = css_value("background", v)?;
        }
        if let Some(v) = vars.node_fill {
            theme.node_fill = css_value("nodeFill", v)?;
        }
        if let Some(v) = vars.scan_color {
            theme.scan_color = css_value("scanColor", v)?;
        }
        if let Some(v) = vars.lookup_color {
            theme.lookup_color = css_value("lookupColor", v)?;
        }
        if let Some(v) = vars.join_color {
            theme.join_color = css_value("joinColor", v)?;
        }
        if let Some(v) = vars.staging_color {
            theme.staging_color = css_value("stagingColor", v)?;
        }
        if let Some(v) = vars.subquery_color {
            theme.subquery_color = css_value("subqueryColor", v)?;
        }
        if let Some(v) = vars.unknown_color {
            theme.unknown_color = css_value("unknownColor", v)?;
        }
    }

    if let Some(layout) = parsed.layout {
        let target = &mut config.layout;
        if let Some(v) = layout.node_spacing {
            target.node_spacing = v.max(0.0);
        }
        if let Some(v) = layout.rank_spacing {
            target.rank_spacing = v.max(0.0);
        }
        if let Some(v) = layout.node_padding_x {
            target.node_padding_x = v.max(0.0);
        }
        if let Some(v) = layout.node_padding_y {
            target.node_padding_y = v.max(0.0);
        }
        if let Some(v) = layout.margin {
            target.margin = v.max(0.0);
        }
        if let Some(v) = layout.min_node_width {
            target.min_node_width = v.max(0.0);
        }
        if let Some(v) = layout.char_width_ratio {
            target.char_width_ratio = v.max(0.1);
        }
        if let Some(v) = layout.label_line_height {
            target.label_line_height = v.max(1.0);
        }
        if let Some(v) = layout.metric_font_scale {
            target.metric_font_scale = v.max(0.1);
        }
        if let Some(v) = layout.max_label_width_chars {
            target.max_label_width_chars = v.max(4);
        }
        if let Some(v) = layout.max_label_lines {
            target.max_label_lines = v.max(1);
        }
        if let Some(v) = layout.edge_routing {
            target.edge_routing = v;
        }
        if let Some(v) = layout.detail_attributes {
            target.detail_attributes = v;
        }
    }

    if let Some(render) = parsed.render {
        let target = &mut config.render;
        if let Some(v) = render.min_stroke_width {
            target.min_stroke_width = v.max(0.0);
        }
        if let Some(v) = render.max_stroke_width {
            target.max_stroke_width = v;
        }
        if let Some(v) = render.cost_ceiling {
            target.cost_ceiling = v;
        }
        if let Some(v) = render.corner_radius {
            target.corner_radius = v.max(0.0);
        }
        if render.title.is_some() {
            target.title = render.title;
        }
        target.max_stroke_width = target.max_stroke_width.max(target.min_stroke_width);
        target.cost_ceiling = target.cost_ceiling.max(1.0);
    }

    if let Some(v) = parsed.max_nodes {
        config.max_nodes = v;
    }

    Ok(config)
}
