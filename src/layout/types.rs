use serde::Serialize;

use crate::ir::PlanNode;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Touching edges do not count as an intersection.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeLayout {
    /// Index of the child this edge leads to.
    pub child: usize,
    pub points: Vec<(f32, f32)>,
}

impl EdgeLayout {
    pub fn segments(&self) -> impl Iterator<Item = ((f32, f32), (f32, f32))> + '_ {
        self.points.windows(2).map(|pair| (pair[0], pair[1]))
    }
}

#[derive(Debug, Clone)]
pub struct LayoutNode<'a> {
    pub plan: &'a PlanNode,
    /// Box enclosing this node and its whole subtree.
    pub bounds: Rect,
    /// The node's own box.
    pub frame: Rect,
    pub title: TextBlock,
    pub label: TextBlock,
    pub details: TextBlock,
    pub edges: Vec<EdgeLayout>,
    pub children: Vec<LayoutNode<'a>>,
}

impl<'a> LayoutNode<'a> {
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(LayoutNode::node_count).sum::<usize>()
    }

    /// Children sorted by horizontal position.
    pub fn children_by_x(&self) -> Vec<&LayoutNode<'a>> {
        let mut children: Vec<&LayoutNode<'a>> = self.children.iter().collect();
        children.sort_by(|a, b| a.frame.x.total_cmp(&b.frame.x));
        children
    }
}

#[derive(Debug, Clone)]
pub struct LayoutTree<'a> {
    pub root: LayoutNode<'a>,
    pub width: f32,
    pub height: f32,
}

impl<'a> LayoutTree<'a> {
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Pre-order list of every node.
    pub fn nodes(&self) -> Vec<&LayoutNode<'a>> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}
