use super::{escape_xml, node_weight};
use crate::config::Config;
use crate::layout::{LayoutNode, LayoutTree, TextBlock};

// Vertical offset that visually centers a glyph in its line box.
const BASELINE_SHIFT: f32 = 0.35;
const HEADER_GAP: f32 = 4.0;

pub fn render_svg(layout: &LayoutTree<'_>, config: &Config) -> String {
    let theme = &config.theme;
    let mut svg = String::new();
    let width = layout.width.max(1.0);
    let height = layout.height.max(1.0);
    let line_color = escape_xml(&theme.line_color);

    svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width:.2}\" height=\"{height:.2}\" viewBox=\"0 0 {width:.2} {height:.2}\" font-family=\"{}\" font-size=\"{}\">",
        escape_xml(&theme.font_family),
        theme.font_size
    ));
    if let Some(title) = &config.render.title {
        svg.push_str(&format!("<title>{}</title>", escape_xml(title)));
    }
    svg.push_str(&format!(
        "<rect class=\"background\" width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        escape_xml(&theme.background)
    ));
    svg.push_str(&format!(
        "<defs><marker id=\"arrow\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"6\" markerHeight=\"6\" orient=\"auto-start-reverse\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{line_color}\"/></marker></defs>",
    ));

    // Edges go first so boxes paint over their ends.
    let nodes = layout.nodes();
    for node in &nodes {
        for edge in &node.edges {
            svg.push_str(&format!(
                "<path class=\"plan-edge\" d=\"{}\" fill=\"none\" stroke=\"{line_color}\" stroke-width=\"1.2\" marker-end=\"url(#arrow)\"/>",
                points_to_path(&edge.points),
            ));
        }
    }
    for node in &nodes {
        node_svg(&mut svg, node, config);
    }

    svg.push_str("</svg>\n");
    svg
}

fn node_svg(svg: &mut String, node: &LayoutNode<'_>, config: &Config) {
    let theme = &config.theme;
    let layout = &config.layout;
    let frame = node.frame;
    let plan = node.plan;
    let weight = node_weight(plan, &config.render);
    let text_color = escape_xml(&theme.primary_text_color);

    svg.push_str(&format!(
        "<g class=\"plan-node-group kind-{}\">",
        plan.kind.css_class()
    ));
    svg.push_str(&format!(
        "<title>{}: {}</title>",
        plan.kind.title(),
        escape_xml(&plan.label)
    ));
    svg.push_str(&format!(
        "<rect class=\"plan-node\" x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"{r}\" ry=\"{r}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{weight:.2}\"/>",
        frame.x,
        frame.y,
        frame.width,
        frame.height,
        escape_xml(theme.accent(plan.kind)),
        escape_xml(&theme.primary_border_color),
        r = config.render.corner_radius,
    ));

    let center_x = frame.center_x();
    let mut top = frame.y + layout.node_padding_y;
    top = text_block_svg(
        svg,
        &node.title,
        TextPlacement {
            x: center_x,
            top,
            font_size: theme.font_size,
            anchor: "middle",
            fill: &text_color,
            weight: "bold",
        },
        layout.label_line_height,
    );
    top = text_block_svg(
        svg,
        &node.label,
        TextPlacement {
            x: center_x,
            top,
            font_size: theme.font_size,
            anchor: "middle",
            fill: &text_color,
            weight: "normal",
        },
        layout.label_line_height,
    );
    if !node.details.lines.is_empty() {
        let detail_color = escape_xml(&theme.secondary_text_color);
        text_block_svg(
            svg,
            &node.details,
            TextPlacement {
                x: frame.x + layout.node_padding_x,
                top: top + HEADER_GAP,
                font_size: theme.font_size * layout.metric_font_scale,
                anchor: "start",
                fill: &detail_color,
                weight: "normal",
            },
            layout.label_line_height,
        );
    }
    svg.push_str("</g>");
}

struct TextPlacement<'t> {
    x: f32,
    top: f32,
    font_size: f32,
    anchor: &'t str,
    /// Already escaped for attribute use.
    fill: &'t str,
    weight: &'t str,
}

/// Writes one `<text>` with a `<tspan>` per line and returns the y just
/// below the block.
fn text_block_svg(
    svg: &mut String,
    block: &TextBlock,
    at: TextPlacement<'_>,
    line_height: f32,
) -> f32 {
    if block.lines.is_empty() {
        return at.top;
    }
    let advance = at.font_size * line_height;
    let first_baseline = at.top + advance / 2.0 + at.font_size * BASELINE_SHIFT;
    svg.push_str(&format!(
        "<text x=\"{:.2}\" y=\"{first_baseline:.2}\" text-anchor=\"{}\" font-size=\"{:.2}\" font-weight=\"{}\" fill=\"{}\">",
        at.x, at.anchor, at.font_size, at.weight, at.fill
    ));
    for (idx, line) in block.lines.iter().enumerate() {
        let dy = if idx == 0 { 0.0 } else { advance };
        svg.push_str(&format!(
            "<tspan x=\"{:.2}\" dy=\"{dy:.2}\">{}</tspan>",
            at.x,
            escape_xml(line)
        ));
    }
    svg.push_str("</text>");
    at.top + block.lines.len() as f32 * advance
}

fn points_to_path(points: &[(f32, f32)]) -> String {
    let mut d = String::new();
    for (idx, (x, y)) in points.iter().enumerate() {
        let cmd = if idx == 0 { "M" } else { " L" };
        d.push_str(&format!("{cmd} {x:.2} {y:.2}"));
    }
    d
}
