use super::{escape_xml, node_weight};
use crate::config::Config;
use crate::ir::OperationKind;
use crate::layout::{LayoutNode, LayoutTree};

const INDENT: &str = "  ";

/// Self-contained HTML rendering. Nesting mirrors the plan tree; the layout
/// only decides sibling order.
pub fn render_html(layout: &LayoutTree<'_>, config: &Config) -> String {
    let title = config.render.title.as_deref().unwrap_or("Query plan");
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_xml(title)));
    html.push_str("<style>\n");
    html.push_str(&stylesheet(config));
    html.push_str("</style>\n</head>\n<body>\n<div class=\"plan\">\n");
    node_html(&mut html, &layout.root, 1, config);
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

fn node_html(html: &mut String, node: &LayoutNode<'_>, depth: usize, config: &Config) {
    let pad = INDENT.repeat(depth);
    let plan = node.plan;
    let weight = node_weight(plan, &config.render);
    html.push_str(&format!(
        "{pad}<div class=\"plan-node kind-{}\" style=\"border-width: {weight:.2}px\">\n",
        plan.kind.css_class()
    ));
    html.push_str(&format!(
        "{pad}{INDENT}<div class=\"header\"><span class=\"kind\">{}</span>",
        plan.kind.title()
    ));
    if !plan.label.is_empty() {
        html.push_str(&format!(
            " <span class=\"label\">{}</span>",
            escape_xml(&plan.label)
        ));
    }
    html.push_str("</div>\n");

    if !node.details.lines.is_empty() {
        html.push_str(&format!("{pad}{INDENT}<ul class=\"details\">\n"));
        for line in &node.details.lines {
            html.push_str(&format!("{pad}{INDENT}{INDENT}<li>{}</li>\n", escape_xml(line)));
        }
        html.push_str(&format!("{pad}{INDENT}</ul>\n"));
    }

    if !node.children.is_empty() {
        html.push_str(&format!("{pad}{INDENT}<div class=\"children\">\n"));
        for child in node.children_by_x() {
            node_html(html, child, depth + 2, config);
        }
        html.push_str(&format!("{pad}{INDENT}</div>\n"));
    }
    html.push_str(&format!("{pad}</div>\n"));
}

/// Theme values are rejected by `parse_config` when they could close a
/// declaration or the `<style>` element, so they are written as is.
fn stylesheet(config: &Config) -> String {
    let theme = &config.theme;
    let mut css = String::new();
    css.push_str(&format!(
        "body {{ font-family: {}; font-size: {}px; color: {}; background: {}; }}\n",
        theme.font_family, theme.font_size, theme.primary_text_color, theme.background
    ));
    css.push_str(&format!(
        ".plan-node {{ display: inline-block; vertical-align: top; margin: 6px 4px; border-style: solid; border-color: {}; border-radius: {}px; background: {}; }}\n",
        theme.primary_border_color, config.render.corner_radius, theme.node_fill
    ));
    css.push_str(".plan-node > .header { padding: 4px 8px; }\n");
    css.push_str(".plan-node > .header .kind { font-weight: bold; }\n");
    css.push_str(&format!(
        ".plan-node > .details {{ margin: 0; padding: 2px 8px 4px 24px; color: {}; font-size: 0.85em; }}\n",
        theme.secondary_text_color
    ));
    css.push_str(&format!(
        ".plan-node > .children {{ display: block; margin-left: 24px; padding-left: 8px; border-left: 1px dashed {}; }}\n",
        theme.line_color
    ));
    css.push_str(".plan-node > .children > .plan-node { display: block; }\n");
    for kind in OperationKind::ALL {
        css.push_str(&format!(
            ".kind-{} > .header {{ background: {}; }}\n",
            kind.css_class(),
            theme.accent(kind)
        ));
    }
    css
}
