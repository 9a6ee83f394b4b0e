use crate::layout::{LayoutNode, LayoutTree, Rect};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Flattened, serializable view of a [`LayoutTree`]. Nodes are addressed by
/// their child-index path from the root ("0" is the root, "0.1" its second
/// child).
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub path: String,
    pub kind: String,
    pub label: String,
    pub frame: Rect,
    pub bounds: Rect,
    pub label_lines: Vec<String>,
    pub details: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub points: Vec<[f32; 2]>,
}

impl LayoutDump {
    pub fn from_layout(layout: &LayoutTree<'_>) -> Self {
        let mut dump = LayoutDump {
            width: layout.width,
            height: layout.height,
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        dump.collect(&layout.root, "0".to_string());
        dump
    }

    fn collect(&mut self, node: &LayoutNode<'_>, path: String) {
        self.nodes.push(NodeDump {
            path: path.clone(),
            kind: format!("{:?}", node.plan.kind),
            label: node.plan.label.clone(),
            frame: node.frame,
            bounds: node.bounds,
            label_lines: node.label.lines.clone(),
            details: node.details.lines.clone(),
        });
        for edge in &node.edges {
            self.edges.push(EdgeDump {
                from: path.clone(),
                to: format!("{path}.{}", edge.child),
                points: edge.points.iter().map(|(x, y)| [*x, *y]).collect(),
            });
        }
        for (idx, child) in node.children.iter().enumerate() {
            self.collect(child, format!("{path}.{idx}"));
        }
    }
}

pub fn write_layout_dump(path: &Path, layout: &LayoutTree<'_>) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_layout(layout);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
