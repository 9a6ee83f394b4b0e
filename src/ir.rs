use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub const METRIC_PREFIX_COST: &str = "prefix_cost";
pub const METRIC_QUERY_COST: &str = "query_cost";
pub const METRIC_TOTAL_COST: &str = "total_cost";
pub const METRIC_READ_COST: &str = "read_cost";
pub const METRIC_EVAL_COST: &str = "eval_cost";
pub const METRIC_COST: &str = "cost";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    TableScan,
    IndexLookup,
    NestedLoopJoin,
    HashJoin,
    Materialization,
    Grouping,
    Ordering,
    Union,
    Subquery,
    Filter,
    Unknown,
}

impl OperationKind {
    pub const ALL: [OperationKind; 11] = [
        OperationKind::TableScan,
        OperationKind::IndexLookup,
        OperationKind::NestedLoopJoin,
        OperationKind::HashJoin,
        OperationKind::Materialization,
        OperationKind::Grouping,
        OperationKind::Ordering,
        OperationKind::Union,
        OperationKind::Subquery,
        OperationKind::Filter,
        OperationKind::Unknown,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::TableScan => "Table scan",
            Self::IndexLookup => "Index lookup",
            Self::NestedLoopJoin => "Nested loop",
            Self::HashJoin => "Hash join",
            Self::Materialization => "Materialize",
            Self::Grouping => "Group",
            Self::Ordering => "Order",
            Self::Union => "Union",
            Self::Subquery => "Subquery",
            Self::Filter => "Filter",
            Self::Unknown => "Unknown",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Self::TableScan => "table-scan",
            Self::IndexLookup => "index-lookup",
            Self::NestedLoopJoin => "nested-loop-join",
            Self::HashJoin => "hash-join",
            Self::Materialization => "materialization",
            Self::Grouping => "grouping",
            Self::Ordering => "ordering",
            Self::Union => "union",
            Self::Subquery => "subquery",
            Self::Filter => "filter",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_join(self) -> bool {
        matches!(self, Self::NestedLoopJoin | Self::HashJoin)
    }
}

/// One execution-plan operation and the operations feeding it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanNode {
    pub kind: OperationKind,
    pub label: String,
    pub estimated_rows: Option<f64>,
    pub metrics: BTreeMap<String, f64>,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(kind: OperationKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            estimated_rows: None,
            metrics: BTreeMap::new(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_rows(mut self, rows: f64) -> Self {
        self.estimated_rows = Some(rows.max(0.0));
        self
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.set_metric(name, value);
        self
    }

    /// Negative values are clamped to zero.
    pub fn set_metric(&mut self, name: &str, value: f64) {
        self.metrics.insert(name.to_string(), value.max(0.0));
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Levels on the longest root-to-leaf path; a lone node has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(PlanNode::depth).max().unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PlanNode::node_count).sum::<usize>()
    }

    /// Best available cost figure for visual weighting.
    pub fn estimated_cost(&self) -> Option<f64> {
        for name in [METRIC_PREFIX_COST, METRIC_QUERY_COST, METRIC_TOTAL_COST] {
            if let Some(value) = self.metric(name) {
                return Some(value);
            }
        }
        match (self.metric(METRIC_READ_COST), self.metric(METRIC_EVAL_COST)) {
            (Some(read), Some(eval)) => return Some(read + eval),
            (Some(read), None) => return Some(read),
            (None, Some(eval)) => return Some(eval),
            (None, None) => {}
        }
        self.metric(METRIC_COST)
    }

    /// Pre-order traversal.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a PlanNode, usize)) {
        fn go<'a>(node: &'a PlanNode, depth: usize, visit: &mut impl FnMut(&'a PlanNode, usize)) {
            visit(node, depth);
            for child in &node.children {
                go(child, depth + 1, visit);
            }
        }
        go(self, 0, visit);
    }

    /// Builds a tree out of a flat arena where each entry lists its
    /// children by index. Every index must be reachable at most once from
    /// `root`.
    pub fn assemble(parts: Vec<NodeParts>, root: usize) -> Result<PlanNode, ModelError> {
        if root >= parts.len() {
            return Err(ModelError::MissingNode { index: root });
        }
        let mut visited = vec![false; parts.len()];
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                return Err(ModelError::CyclicStructure { index: idx });
            }
            visited[idx] = true;
            for &child in &parts[idx].children {
                if child >= parts.len() {
                    return Err(ModelError::MissingNode { index: child });
                }
                stack.push(child);
            }
        }

        let mut slots: Vec<Option<NodeParts>> = parts.into_iter().map(Some).collect();
        Ok(build_from_slots(&mut slots, root))
    }
}

fn build_from_slots(slots: &mut [Option<NodeParts>], idx: usize) -> PlanNode {
    // Reachability was checked by the caller, so each slot is taken once.
    let Some(parts) = slots[idx].take() else {
        return PlanNode::new(OperationKind::Unknown, "");
    };
    let children = parts
        .children
        .iter()
        .map(|&child| build_from_slots(slots, child))
        .collect();
    PlanNode {
        children,
        ..parts.node
    }
}

/// Arena entry for [`PlanNode::assemble`]. `node.children` is ignored.
#[derive(Debug, Clone)]
pub struct NodeParts {
    pub node: PlanNode,
    pub children: Vec<usize>,
}

impl NodeParts {
    pub fn new(node: PlanNode, children: Vec<usize>) -> Self {
        Self { node, children }
    }
}
