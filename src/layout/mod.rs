//! Tidy top-down tree layout.
//!
//! Two linear passes: a bottom-up pass sizes every box and subtree, and a
//! top-down pass assigns coordinates. Plan depth maps to vertical rank and
//! children keep their input order left to right, packed contiguously and
//! centered under their parent. The result is deterministic for a given
//! tree and configuration.

mod text;
pub(crate) mod types;
pub use text::format_metric;
pub use types::*;
use text::*;

use crate::config::{EdgeRouting, LayoutConfig};
use crate::ir::PlanNode;
use crate::theme::Theme;
use tracing::debug;

// Gap between the header (title + label) and the detail lines.
const HEADER_GAP: f32 = 4.0;

struct SizedNode<'a> {
    plan: &'a PlanNode,
    title: TextBlock,
    label: TextBlock,
    details: TextBlock,
    width: f32,
    height: f32,
    subtree_width: f32,
    children: Vec<SizedNode<'a>>,
}

pub fn compute_layout<'a>(
    plan: &'a PlanNode,
    theme: &Theme,
    config: &LayoutConfig,
) -> LayoutTree<'a> {
    let sized = size_subtree(plan, theme, config);
    let root = place_subtree(sized, config.margin, config.margin, config);
    let width = root.bounds.width + config.margin * 2.0;
    let height = root.bounds.height + config.margin * 2.0;
    debug!(
        nodes = root.node_count(),
        depth = plan.depth(),
        width,
        height,
        "computed layout"
    );
    LayoutTree {
        root,
        width,
        height,
    }
}

/// Bottom-up: own box size from text, subtree width from children.
fn size_subtree<'a>(plan: &'a PlanNode, theme: &Theme, config: &LayoutConfig) -> SizedNode<'a> {
    let title = title_block(plan, theme, config);
    let label = label_block(plan, theme, config);
    let details = details_block(plan, theme, config);

    let content_width = title.width.max(label.width).max(details.width);
    let width = (content_width + config.node_padding_x * 2.0).max(config.min_node_width);
    let mut height = title.height + label.height + config.node_padding_y * 2.0;
    if !details.lines.is_empty() {
        height += HEADER_GAP + details.height;
    }

    let children: Vec<SizedNode<'a>> = plan
        .children
        .iter()
        .map(|child| size_subtree(child, theme, config))
        .collect();
    let subtree_width = width.max(children_span(&children, config.node_spacing));

    SizedNode {
        plan,
        title,
        label,
        details,
        width,
        height,
        subtree_width,
        children,
    }
}

fn children_span(children: &[SizedNode<'_>], spacing: f32) -> f32 {
    if children.is_empty() {
        return 0.0;
    }
    let widths: f32 = children.iter().map(|child| child.subtree_width).sum();
    widths + spacing * (children.len() - 1) as f32
}

/// Top-down: `left` is the left edge of the subtree's span, `top` the top
/// of this node's box.
fn place_subtree<'a>(
    sized: SizedNode<'a>,
    left: f32,
    top: f32,
    config: &LayoutConfig,
) -> LayoutNode<'a> {
    let frame = Rect::new(
        left + (sized.subtree_width - sized.width) / 2.0,
        top,
        sized.width,
        sized.height,
    );

    let spacing = config.node_spacing;
    let span = children_span(&sized.children, spacing);
    let child_top = frame.bottom() + config.rank_spacing;
    let mut cursor = left + (sized.subtree_width - span) / 2.0;
    let mut children = Vec::with_capacity(sized.children.len());
    for child in sized.children {
        let placed = place_subtree(child, cursor, child_top, config);
        cursor = placed.bounds.right() + spacing;
        children.push(placed);
    }

    let bottom = children
        .iter()
        .map(|child| child.bounds.bottom())
        .fold(frame.bottom(), f32::max);
    let bounds = Rect::new(left, top, sized.subtree_width, bottom - top);
    let edges = children
        .iter()
        .enumerate()
        .map(|(idx, child)| EdgeLayout {
            child: idx,
            points: route_edge(&frame, &child.frame, config),
        })
        .collect();

    LayoutNode {
        plan: sized.plan,
        bounds,
        frame,
        title: sized.title,
        label: sized.label,
        details: sized.details,
        edges,
        children,
    }
}

/// Parent bottom-center to child top-center.
fn route_edge(parent: &Rect, child: &Rect, config: &LayoutConfig) -> Vec<(f32, f32)> {
    let start = (parent.center_x(), parent.bottom());
    let end = (child.center_x(), child.y);
    if config.edge_routing == EdgeRouting::Straight || (start.0 - end.0).abs() < 0.5 {
        return vec![start, end];
    }
    let mid_y = start.1 + (end.1 - start.1) / 2.0;
    vec![start, (start.0, mid_y), (end.0, mid_y), end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::OperationKind;

    fn scan(name: &str) -> PlanNode {
        PlanNode::new(OperationKind::TableScan, name).with_rows(10.0)
    }

    fn sample_tree() -> PlanNode {
        PlanNode::new(OperationKind::Ordering, "ORDER BY").with_child(
            PlanNode::new(OperationKind::HashJoin, "")
                .with_child(
                    PlanNode::new(OperationKind::NestedLoopJoin, "")
                        .with_child(scan("customer_with_a_rather_long_table_name"))
                        .with_child(scan("o")),
                )
                .with_child(scan("lineitem"))
                .with_child(
                    PlanNode::new(OperationKind::Subquery, "attached")
                        .with_child(scan("nation").with_metric("prefix_cost", 3.0)),
                ),
        )
    }

    fn check_invariants(node: &LayoutNode<'_>) {
        assert!(node.bounds.contains(&node.frame));
        for child in &node.children {
            assert!(node.bounds.contains(&child.bounds));
            assert!(child.frame.y > node.frame.bottom());
            check_invariants(child);
        }
        for (i, a) in node.children.iter().enumerate() {
            for b in node.children.iter().skip(i + 1) {
                assert!(!a.bounds.intersects(&b.bounds));
                assert!(a.bounds.right() <= b.bounds.x);
            }
        }
    }

    #[test]
    fn single_node_has_no_edges() {
        let plan = scan("t1");
        let layout = compute_layout(&plan, &Theme::classic(), &LayoutConfig::default());
        assert_eq!(layout.node_count(), 1);
        assert!(layout.root.edges.is_empty());
        let margin = LayoutConfig::default().margin;
        assert_eq!(layout.root.frame.x, margin);
        assert_eq!(layout.width, layout.root.frame.width + margin * 2.0);
    }

    #[test]
    fn layout_keeps_invariants() {
        let plan = sample_tree();
        let layout = compute_layout(&plan, &Theme::classic(), &LayoutConfig::default());
        assert_eq!(layout.node_count(), plan.node_count());
        check_invariants(&layout.root);
    }

    #[test]
    fn invariants_hold_without_spacing() {
        let plan = sample_tree();
        let config = LayoutConfig {
            node_spacing: 0.0,
            rank_spacing: 0.0,
            ..LayoutConfig::default()
        };
        let layout = compute_layout(&plan, &Theme::modern(), &config);
        for node in layout.nodes() {
            for (i, a) in node.children.iter().enumerate() {
                for b in node.children.iter().skip(i + 1) {
                    assert!(!a.bounds.intersects(&b.bounds));
                }
            }
        }
    }

    #[test]
    fn children_follow_input_order() {
        let plan = PlanNode::new(OperationKind::NestedLoopJoin, "")
            .with_child(scan("t1"))
            .with_child(scan("t2"));
        let layout = compute_layout(&plan, &Theme::classic(), &LayoutConfig::default());
        let root = &layout.root;
        assert_eq!(root.edges.len(), 2);
        assert!(root.children[0].frame.x < root.children[1].frame.x);
        assert_eq!(root.children[0].plan.label, "t1");
        let ordered: Vec<_> = root.children_by_x().iter().map(|c| c.plan.label.as_str()).collect();
        assert_eq!(ordered, ["t1", "t2"]);
    }

    #[test]
    fn parent_is_centered_over_children() {
        let plan = PlanNode::new(OperationKind::Union, "")
            .with_child(scan("a"))
            .with_child(scan("b"));
        let layout = compute_layout(&plan, &Theme::classic(), &LayoutConfig::default());
        let root = &layout.root;
        let first = root.children[0].bounds.x;
        let last = root.children[1].bounds.right();
        assert!((root.frame.center_x() - (first + last) / 2.0).abs() < 1e-3);
    }

    #[test]
    fn edges_anchor_on_box_centers() {
        let plan = PlanNode::new(OperationKind::HashJoin, "")
            .with_child(scan("a"))
            .with_child(scan("b"));
        let layout = compute_layout(&plan, &Theme::classic(), &LayoutConfig::default());
        let root = &layout.root;
        for edge in &root.edges {
            let child = &root.children[edge.child];
            let first = edge.points[0];
            let last = *edge.points.last().unwrap();
            assert_eq!(first, (root.frame.center_x(), root.frame.bottom()));
            assert_eq!(last, (child.frame.center_x(), child.frame.y));
            assert_eq!(edge.points.len(), 4);
            assert_eq!(edge.segments().count(), 3);
        }
    }

    #[test]
    fn straight_routing_uses_two_points() {
        let plan = PlanNode::new(OperationKind::HashJoin, "")
            .with_child(scan("a"))
            .with_child(scan("b"));
        let config = LayoutConfig {
            edge_routing: EdgeRouting::Straight,
            ..LayoutConfig::default()
        };
        let layout = compute_layout(&plan, &Theme::classic(), &config);
        assert!(layout.root.edges.iter().all(|edge| edge.points.len() == 2));
    }

    #[test]
    fn identical_labels_are_laid_out_separately() {
        let plan = PlanNode::new(OperationKind::Union, "")
            .with_child(scan("same"))
            .with_child(scan("same"));
        let layout = compute_layout(&plan, &Theme::classic(), &LayoutConfig::default());
        let [a, b] = [&layout.root.children[0], &layout.root.children[1]];
        assert_ne!(a.frame.x, b.frame.x);
    }

    #[test]
    fn details_list_metrics() {
        let plan = scan("t").with_metric("read_cost", 1.5);
        let layout = compute_layout(&plan, &Theme::classic(), &LayoutConfig::default());
        assert_eq!(layout.root.details.lines, ["rows: 10", "read_cost: 1.5"]);
    }
}
