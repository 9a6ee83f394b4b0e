//! Field-name mapping for `EXPLAIN FORMAT=JSON` dialects.
//!
//! The parser never hardcodes a vendor key. Every operation key, metric
//! source, and access-type refinement lives in a [`FieldMapping`], which is
//! versioned and can be swapped wholesale by loading a JSON document with the
//! same shape as the built-in table. Supporting a renamed field means adding
//! a source path here, not touching the parser.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::ir::OperationKind;

/// Version of the built-in mapping table.
pub const LATEST_SCHEMA_VERSION: &str = "1.2";

pub(crate) static BUILTIN_MAPPING: Lazy<FieldMapping> = Lazy::new(FieldMapping::builtin);

/// How the parser descends into the value stored under an operation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Descent {
    /// Object describing one table access; nested operation keys inside it
    /// become children.
    Table,
    /// Array of operations joined left to right.
    JoinList,
    /// Object wrapping exactly one nested operation.
    Wrapper,
    /// Object holding a `query_block`.
    QueryBlock,
    /// Object with a `query_specifications` array.
    UnionSpecs,
    /// Join-buffer object around a single inner table.
    JoinBuffer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRule {
    pub key: String,
    pub kind: OperationKind,
    pub descent: Descent,
    /// Fields tried in order for the node label.
    #[serde(default)]
    pub label_sources: Vec<String>,
    /// Label used when no source is present.
    #[serde(default)]
    pub label: Option<String>,
}

impl OperationRule {
    fn new(key: &str, kind: OperationKind, descent: Descent) -> Self {
        Self {
            key: key.to_string(),
            kind,
            descent,
            label_sources: Vec::new(),
            label: None,
        }
    }

    fn labeled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    fn label_from(mut self, sources: &[&str]) -> Self {
        self.label_sources = strings(sources);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    #[default]
    Plain,
    /// Accepts a trailing `%`.
    Percent,
    /// Accepts K/M/G/T suffixes (binary multiples), e.g. `"16K"` or `"256Kb"`.
    Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    pub name: String,
    /// Dotted paths relative to the operation object; first present wins.
    pub sources: Vec<String>,
    #[serde(default)]
    pub unit: MetricUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub name: String,
    pub sources: Vec<String>,
}

/// Refinements for the iterator-tree format (`explain_json_format_version=2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorMapping {
    pub plan_key: String,
    pub kind_key: String,
    pub children_key: String,
    pub label_sources: Vec<String>,
    pub kinds: BTreeMap<String, OperationKind>,
    pub join_algorithm_key: String,
    pub subquery_flag: String,
    pub subquery_label_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub version: String,
    pub query_block_key: String,
    pub union_specs_key: String,
    /// Operation keys in priority order.
    pub operations: Vec<OperationRule>,
    /// `access_type` values that turn a table access into another kind.
    pub access_kinds: BTreeMap<String, OperationKind>,
    pub access_type_key: String,
    pub rows_sources: Vec<String>,
    pub metrics: Vec<MetricRule>,
    pub attributes: Vec<AttributeRule>,
    /// Arrays of subquery specifications, attached in this order.
    pub subquery_keys: Vec<String>,
    /// Paths inside a join input that describe its join buffer.
    pub join_hint_sources: Vec<String>,
    /// Case-insensitive substrings marking a hash join.
    pub hash_join_markers: Vec<String>,
    /// Object-valued keys that carry metadata, never operations.
    pub passive_keys: Vec<String>,
    pub message_key: String,
    pub max_unknown_label_chars: usize,
    pub iterator: IteratorMapping,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FieldMapping {
    pub fn builtin() -> Self {
        use Descent::*;
        use OperationKind::*;

        let operations = vec![
            OperationRule::new("union_result", Union, UnionSpecs).label_from(&["table_name"]),
            OperationRule::new("ordering_operation", Ordering, Wrapper).labeled("ORDER BY"),
            OperationRule::new("grouping_operation", Grouping, Wrapper).labeled("GROUP BY"),
            OperationRule::new("windowing", Grouping, Wrapper).labeled("window"),
            OperationRule::new("duplicates_removal", Grouping, Wrapper)
                .labeled("duplicates removal"),
            OperationRule::new("buffer_result", Materialization, Wrapper).labeled("buffer result"),
            OperationRule::new("materialized_from_subquery", Materialization, QueryBlock)
                .labeled("derived"),
            OperationRule::new("temporary_table", Materialization, Wrapper)
                .labeled("temporary table"),
            OperationRule::new("read_sorted_file", Ordering, Wrapper).labeled("sorted file"),
            OperationRule::new("filesort", Ordering, Wrapper)
                .label_from(&["sort_key"])
                .labeled("filesort"),
            OperationRule::new("nested_loop", NestedLoopJoin, JoinList),
            OperationRule::new("block-nl-join", NestedLoopJoin, JoinBuffer),
            OperationRule::new("table", TableScan, Table).label_from(&["table_name", "alias"]),
        ];

        let access_kinds = [
            "system",
            "const",
            "eq_ref",
            "ref",
            "fulltext",
            "ref_or_null",
            "index_merge",
            "unique_subquery",
            "index_subquery",
            "range",
        ]
        .into_iter()
        .map(|access| (access.to_string(), IndexLookup))
        .collect();

        let metrics = vec![
            metric("prefix_cost", &["cost_info.prefix_cost"], MetricUnit::Plain),
            metric("query_cost", &["cost_info.query_cost"], MetricUnit::Plain),
            metric("read_cost", &["cost_info.read_cost"], MetricUnit::Plain),
            metric("eval_cost", &["cost_info.eval_cost"], MetricUnit::Plain),
            metric("sort_cost", &["cost_info.sort_cost"], MetricUnit::Plain),
            metric("total_cost", &["estimated_total_cost"], MetricUnit::Plain),
            metric("first_row_cost", &["estimated_first_row_cost"], MetricUnit::Plain),
            metric("cost", &["cost"], MetricUnit::Plain),
            metric("rows_produced", &["rows_produced_per_join"], MetricUnit::Plain),
            metric("filtered", &["filtered"], MetricUnit::Percent),
            metric("data_read", &["cost_info.data_read_per_join"], MetricUnit::Bytes),
            metric("actual_rows", &["r_rows", "actual_rows"], MetricUnit::Plain),
            metric("actual_filtered", &["r_filtered"], MetricUnit::Percent),
            metric("loops", &["r_loops", "actual_loops"], MetricUnit::Plain),
        ];

        let attributes = vec![
            attribute("select_id", &["select_id"]),
            attribute("access_type", &["access_type"]),
            attribute("key", &["key", "index_name"]),
            attribute("ref", &["ref"]),
            attribute("condition", &["attached_condition", "condition", "having_condition"]),
            attribute("index_condition", &["index_condition"]),
            attribute("sort_key", &["sort_key"]),
            attribute("join_buffer", &["using_join_buffer", "buffer_type"]),
            attribute("join_type", &["join_type"]),
            attribute("using_index", &["using_index", "covering"]),
            attribute("using_filesort", &["using_filesort"]),
            attribute("using_temporary", &["using_temporary_table", "using_temporary"]),
            attribute("dependent", &["dependent"]),
            attribute("cacheable", &["cacheable"]),
        ];

        let iterator_kinds = [
            ("table", TableScan),
            ("index", IndexLookup),
            ("join", NestedLoopJoin),
            ("filter", Filter),
            ("sort", Ordering),
            ("aggregate", Grouping),
            ("materialize", Materialization),
            ("temp_table_aggregate", Grouping),
            ("union", Union),
            ("subquery", Subquery),
        ]
        .into_iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();

        Self {
            version: LATEST_SCHEMA_VERSION.to_string(),
            query_block_key: "query_block".to_string(),
            union_specs_key: "query_specifications".to_string(),
            operations,
            access_kinds,
            access_type_key: "access_type".to_string(),
            rows_sources: strings(&["rows_examined_per_scan", "rows", "estimated_rows"]),
            metrics,
            attributes,
            subquery_keys: strings(&[
                "attached_subqueries",
                "optimized_away_subqueries",
                "having_subqueries",
                "order_by_subqueries",
                "group_by_subqueries",
                "select_list_subqueries",
                "update_value_subqueries",
                "subqueries",
            ]),
            join_hint_sources: strings(&["table.using_join_buffer", "block-nl-join.join_type"]),
            hash_join_markers: strings(&["hash", "bnlh"]),
            passive_keys: strings(&[
                "cost_info",
                "range-checked-for-each-record",
                "r_keys",
                "rowid_filter",
                "index_merge",
                "r_engine_stats",
            ]),
            message_key: "message".to_string(),
            max_unknown_label_chars: 120,
            iterator: IteratorMapping {
                plan_key: "query_plan".to_string(),
                kind_key: "access_type".to_string(),
                children_key: "inputs".to_string(),
                label_sources: strings(&["operation", "table_name"]),
                kinds: iterator_kinds,
                join_algorithm_key: "join_algorithm".to_string(),
                subquery_flag: "subquery".to_string(),
                subquery_label_key: "subquery_location".to_string(),
            },
        }
    }

    pub fn from_json_str(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn rule(&self, key: &str) -> Option<&OperationRule> {
        self.operations.iter().find(|rule| rule.key == key)
    }

    pub(crate) fn is_hash_join_hint(&self, hint: &str) -> bool {
        let lower = hint.to_ascii_lowercase();
        self.hash_join_markers
            .iter()
            .any(|marker| lower.contains(&marker.to_ascii_lowercase()))
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn metric(name: &str, sources: &[&str], unit: MetricUnit) -> MetricRule {
    MetricRule {
        name: name.to_string(),
        sources: strings(sources),
        unit,
    }
}

fn attribute(name: &str, sources: &[&str]) -> AttributeRule {
    AttributeRule {
        name: name.to_string(),
        sources: strings(sources),
    }
}
