use serde::{Deserialize, Serialize};

use crate::ir::OperationKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub font_size: f32,
    pub primary_text_color: String,
    pub secondary_text_color: String,
    pub primary_border_color: String,
    pub line_color: String,
    pub background: String,
    pub node_fill: String,
    pub scan_color: String,
    pub lookup_color: String,
    pub join_color: String,
    pub staging_color: String,
    pub subquery_color: String,
    pub unknown_color: String,
}

impl Theme {
    /// Close to the palette of common visual-explain tools: full scans in
    /// red, index access in green.
    pub fn classic() -> Self {
        Self {
            font_family: "Menlo, Consolas, \"DejaVu Sans Mono\", monospace".to_string(),
            font_size: 12.0,
            primary_text_color: "#1F2328".to_string(),
            secondary_text_color: "#57606A".to_string(),
            primary_border_color: "#57606A".to_string(),
            line_color: "#57606A".to_string(),
            background: "#FFFFFF".to_string(),
            node_fill: "#FFFFFF".to_string(),
            scan_color: "#F2B8B5".to_string(),
            lookup_color: "#B7E1C1".to_string(),
            join_color: "#C9D7F2".to_string(),
            staging_color: "#F5E0A3".to_string(),
            subquery_color: "#DCCCF0".to_string(),
            unknown_color: "#E1E4E8".to_string(),
        }
    }

    pub fn modern() -> Self {
        Self {
            font_family: "\"JetBrains Mono\", \"SF Mono\", ui-monospace, monospace".to_string(),
            font_size: 12.0,
            primary_text_color: "#1C2430".to_string(),
            secondary_text_color: "#5B6B82".to_string(),
            primary_border_color: "#C7D2E5".to_string(),
            line_color: "#7A8AA6".to_string(),
            background: "#FFFFFF".to_string(),
            node_fill: "#F8FAFF".to_string(),
            scan_color: "#FDE2E1".to_string(),
            lookup_color: "#DDF4E4".to_string(),
            join_color: "#E3ECFB".to_string(),
            staging_color: "#FFF3D6".to_string(),
            subquery_color: "#EFE6FA".to_string(),
            unknown_color: "#EEF2F8".to_string(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "classic" | "default" | "base" => Some(Self::classic()),
            "modern" => Some(Self::modern()),
            _ => None,
        }
    }

    /// Header band color for a node of the given kind.
    pub fn accent(&self, kind: OperationKind) -> &str {
        match kind {
            OperationKind::TableScan => &self.scan_color,
            OperationKind::IndexLookup => &self.lookup_color,
            OperationKind::NestedLoopJoin | OperationKind::HashJoin | OperationKind::Union => {
                &self.join_color
            }
            OperationKind::Materialization
            | OperationKind::Grouping
            | OperationKind::Ordering
            | OperationKind::Filter => &self.staging_color,
            OperationKind::Subquery => &self.subquery_color,
            OperationKind::Unknown => &self.unknown_color,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::classic()
    }
}
