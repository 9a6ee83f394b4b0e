use crate::error::ParseError;
use crate::ir::{OperationKind, PlanNode};
use crate::mapping::{BUILTIN_MAPPING, Descent, FieldMapping, MetricUnit, OperationRule};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static BYTE_SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<num>[-+]?(?:\d+(?:\.\d*)?|\.\d+))\s*(?P<unit>[kmgt])?(?:i?b)?$").unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPlan {
    pub root: PlanNode,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// JSON-pointer style location, e.g. `/query_block/nested_loop/1`.
    pub path: String,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    VersionMismatch { expected: String, actual: String },
    ConflictingOperations { chosen: String, ignored: Vec<String> },
    UnknownOperation { keys: Vec<String> },
    NegativeValue { field: String, value: f64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { self.path.as_str() };
        match &self.kind {
            DiagnosticKind::VersionMismatch { expected, actual } => write!(
                f,
                "{path}: expected schema version {expected}, mapping table is {actual}"
            ),
            DiagnosticKind::ConflictingOperations { chosen, ignored } => write!(
                f,
                "{path}: multiple operations present; using `{chosen}`, ignoring {}",
                ignored.join(", ")
            ),
            DiagnosticKind::UnknownOperation { keys } => {
                write!(f, "{path}: unrecognized operation {}", keys.join(", "))
            }
            DiagnosticKind::NegativeValue { field, value } => {
                write!(f, "{path}: negative value {value} for `{field}` clamped to 0")
            }
        }
    }
}

/// Parses a plan with the built-in mapping table.
pub fn parse_plan(input: &str, expected_version: &str) -> Result<ParsedPlan, ParseError> {
    PlanParser::new(&BUILTIN_MAPPING).parse(input, expected_version)
}

pub struct PlanParser<'m> {
    mapping: &'m FieldMapping,
}

impl<'m> PlanParser<'m> {
    pub fn new(mapping: &'m FieldMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &FieldMapping {
        self.mapping
    }

    pub fn parse(&self, input: &str, expected_version: &str) -> Result<ParsedPlan, ParseError> {
        let document: Value = serde_json::from_str(input).map_err(ParseError::from_json)?;
        let mut ctx = ParseContext {
            mapping: self.mapping,
            diagnostics: Vec::new(),
        };
        if expected_version != self.mapping.version {
            ctx.record(
                "",
                DiagnosticKind::VersionMismatch {
                    expected: expected_version.to_string(),
                    actual: self.mapping.version.clone(),
                },
            );
        }

        let Some(top) = document.as_object() else {
            return Err(ParseError::UnrecognizedTopLevelShape { keys: Vec::new() });
        };
        let iterator = &self.mapping.iterator;
        let block = top
            .get(&self.mapping.query_block_key)
            .and_then(Value::as_object);
        let root = if let Some(block) = block {
            let path = format!("/{}", self.mapping.query_block_key);
            ctx.parse_object(block, &path)?
        } else if let Some(plan) = top.get(&iterator.plan_key).and_then(Value::as_object) {
            let path = format!("/{}", iterator.plan_key);
            ctx.parse_iterator(plan, &path)?
        } else if top.contains_key(&iterator.kind_key) || top.contains_key(&iterator.children_key) {
            ctx.parse_iterator(top, "")?
        } else {
            return Err(ParseError::UnrecognizedTopLevelShape {
                keys: top.keys().cloned().collect(),
            });
        };

        debug!(
            nodes = root.node_count(),
            depth = root.depth(),
            diagnostics = ctx.diagnostics.len(),
            "parsed plan"
        );
        Ok(ParsedPlan {
            root,
            diagnostics: ctx.diagnostics,
        })
    }
}

struct ParseContext<'m> {
    mapping: &'m FieldMapping,
    diagnostics: Vec<Diagnostic>,
}

impl<'m> ParseContext<'m> {
    fn record(&mut self, path: &str, kind: DiagnosticKind) {
        let diagnostic = Diagnostic {
            path: path.to_string(),
            kind,
        };
        warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    /// Resolves an object holding an operation, then folds the object's own
    /// metadata and subqueries into the resulting node.
    fn parse_object(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        let mut node = match self.resolve_inner(obj, path)? {
            Some(node) => node,
            None => self.empty_node(obj),
        };
        self.attach_subqueries(&mut node, obj, path)?;
        self.merge_scalars(&mut node, obj, path)?;
        Ok(node)
    }

    /// Finds the single operation inside `obj`, ignoring its scalar fields.
    fn resolve_inner(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<Option<PlanNode>, ParseError> {
        let mapping = self.mapping;
        if let Some(rule) = self.select_rule(obj, path) {
            let child_path = format!("{path}/{}", rule.key);
            let mut node = self.parse_rule(rule, &obj[&rule.key], &child_path)?;
            node.children.extend(self.unknown_siblings(obj, path));
            return Ok(Some(node));
        }
        if let Some(block) = obj.get(&mapping.query_block_key).and_then(Value::as_object) {
            let child_path = format!("{path}/{}", mapping.query_block_key);
            let mut node = self.parse_object(block, &child_path)?;
            node.children.extend(self.unknown_siblings(obj, path));
            return Ok(Some(node));
        }

        let unknown: Map<String, Value> = obj
            .iter()
            .filter(|(key, value)| value.is_object() && !self.is_passive(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if unknown.is_empty() {
            return Ok(None);
        }
        self.record(
            path,
            DiagnosticKind::UnknownOperation {
                keys: unknown.keys().cloned().collect(),
            },
        );
        Ok(Some(self.unknown_node(&Value::Object(unknown))))
    }

    /// Object-valued keys next to a recognized operation that nothing in the
    /// mapping describes; each becomes its own Unknown node.
    fn unknown_siblings(&mut self, obj: &Map<String, Value>, path: &str) -> Vec<PlanNode> {
        let keys: Vec<String> = obj
            .iter()
            .filter(|(key, value)| value.is_object() && !self.is_passive(key))
            .map(|(key, _)| key.clone())
            .collect();
        if keys.is_empty() {
            return Vec::new();
        }
        self.record(path, DiagnosticKind::UnknownOperation { keys: keys.clone() });
        keys.into_iter()
            .map(|key| {
                let value = obj[&key].clone();
                let mut fragment = Map::new();
                fragment.insert(key, value);
                self.unknown_node(&Value::Object(fragment))
            })
            .collect()
    }

    fn present_rules(&self, obj: &Map<String, Value>) -> Vec<&'m OperationRule> {
        let mapping = self.mapping;
        mapping
            .operations
            .iter()
            .filter(|rule| {
                obj.get(&rule.key)
                    .is_some_and(|value| value.is_object() || value.is_array())
            })
            .collect()
    }

    /// First present operation in priority order; the rest are reported.
    fn select_rule(&mut self, obj: &Map<String, Value>, path: &str) -> Option<&'m OperationRule> {
        let present = self.present_rules(obj);
        let (&chosen, rest) = present.split_first()?;
        if !rest.is_empty() {
            self.record(
                path,
                DiagnosticKind::ConflictingOperations {
                    chosen: chosen.key.clone(),
                    ignored: rest.iter().map(|rule| rule.key.clone()).collect(),
                },
            );
        }
        Some(chosen)
    }

    fn parse_rule(
        &mut self,
        rule: &OperationRule,
        value: &Value,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        if rule.descent == Descent::JoinList {
            return self.parse_join_list(rule, value, path);
        }
        let Some(obj) = value.as_object() else {
            return Ok(self.unknown_node(value));
        };
        match rule.descent {
            Descent::Table => self.parse_table(rule, obj, path),
            Descent::Wrapper => self.parse_wrapper(rule, obj, path),
            Descent::QueryBlock => self.parse_query_block_holder(rule, obj, path),
            Descent::UnionSpecs => self.parse_union(rule, obj, path),
            Descent::JoinBuffer => self.parse_join_buffer(rule, obj, path),
            Descent::JoinList => self.parse_join_list(rule, value, path),
        }
    }

    fn parse_table(
        &mut self,
        rule: &OperationRule,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        let mapping = self.mapping;
        let kind = obj
            .get(&mapping.access_type_key)
            .and_then(Value::as_str)
            .and_then(|access| mapping.access_kinds.get(access))
            .copied()
            .unwrap_or(rule.kind);
        let mut node = PlanNode::new(kind, rule_label(rule, obj));
        self.apply_scalars(&mut node, obj, path)?;

        // Derived tables and similar nest further operations inside the
        // table object itself.
        for nested in &mapping.operations {
            if nested.descent == Descent::Table {
                continue;
            }
            if let Some(value) = obj.get(&nested.key)
                && (value.is_object() || value.is_array())
            {
                let child_path = format!("{path}/{}", nested.key);
                let child = self.parse_rule(nested, value, &child_path)?;
                node.children.push(child);
            }
        }
        let unknown = self.unknown_siblings(obj, path);
        node.children.extend(unknown);
        self.attach_subqueries(&mut node, obj, path)?;
        Ok(node)
    }

    fn parse_wrapper(
        &mut self,
        rule: &OperationRule,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        let mut node = PlanNode::new(rule.kind, rule_label(rule, obj));
        self.apply_scalars(&mut node, obj, path)?;
        if let Some(child) = self.resolve_inner(obj, path)? {
            node.children.push(child);
        }
        self.attach_subqueries(&mut node, obj, path)?;
        Ok(node)
    }

    fn parse_query_block_holder(
        &mut self,
        rule: &OperationRule,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        let mut node = PlanNode::new(rule.kind, rule_label(rule, obj));
        self.apply_scalars(&mut node, obj, path)?;
        if let Some(child) = self.resolve_inner(obj, path)? {
            node.children.push(child);
        }
        Ok(node)
    }

    fn parse_union(
        &mut self,
        rule: &OperationRule,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        let mut node = PlanNode::new(rule.kind, rule_label(rule, obj));
        self.apply_scalars(&mut node, obj, path)?;
        let mapping = self.mapping;
        let specs_key = &mapping.union_specs_key;
        if let Some(specs) = obj.get(specs_key).and_then(Value::as_array) {
            for (idx, spec) in specs.iter().enumerate() {
                let spec_path = format!("{path}/{specs_key}/{idx}");
                let child = match spec.as_object() {
                    Some(spec) => self.parse_object(spec, &spec_path)?,
                    None => self.unknown_node(spec),
                };
                node.children.push(child);
            }
        }
        Ok(node)
    }

    fn parse_join_buffer(
        &mut self,
        rule: &OperationRule,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        let inner = match self.resolve_inner(obj, path)? {
            Some(inner) => inner,
            None => self.empty_node(obj),
        };
        let kind = match join_hint_of_buffer(obj) {
            Some(hint) if self.mapping.is_hash_join_hint(&hint) => OperationKind::HashJoin,
            _ => rule.kind,
        };
        let mut node = PlanNode::new(kind, rule_label(rule, obj));
        self.apply_scalars(&mut node, obj, path)?;
        node.children.push(inner);
        Ok(node)
    }

    /// Decomposes `[a, b, c]` into `join(join(a, b), c)`. Each join takes
    /// its algorithm and cumulative figures from its inner input.
    fn parse_join_list(
        &mut self,
        rule: &OperationRule,
        value: &Value,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        let Some(items) = value.as_array() else {
            return Ok(self.unknown_node(value));
        };
        let mut inputs = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let item_path = format!("{path}/{idx}");
            inputs.push(self.parse_join_input(item, &item_path)?);
        }

        let mut iter = inputs.into_iter();
        let Some((first, _)) = iter.next() else {
            return Ok(PlanNode::new(rule.kind, rule_label(rule, &Map::new())));
        };
        let mut acc = first;
        for (inner, hint) in iter {
            let kind = match &hint {
                Some(hint) if self.mapping.is_hash_join_hint(hint) => OperationKind::HashJoin,
                _ => rule.kind,
            };
            let mut join = PlanNode::new(kind, rule.label.clone().unwrap_or_default());
            if let Some(cost) = inner.metric(crate::ir::METRIC_PREFIX_COST) {
                join.set_metric(crate::ir::METRIC_PREFIX_COST, cost);
            }
            if let Some(rows) = inner.metric("rows_produced") {
                join.estimated_rows = Some(rows);
            }
            if let Some(hint) = hint {
                join.attributes.insert("join_buffer".to_string(), hint);
            }
            join.children.push(acc);
            join.children.push(inner);
            acc = join;
        }
        Ok(acc)
    }

    fn parse_join_input(
        &mut self,
        item: &Value,
        path: &str,
    ) -> Result<(PlanNode, Option<String>), ParseError> {
        let Some(obj) = item.as_object() else {
            return Ok((self.unknown_node(item), None));
        };
        let hint = self
            .mapping
            .join_hint_sources
            .iter()
            .find_map(|source| lookup_path(obj, source).and_then(scalar_text));

        // A join buffer inside a join list only describes how its inner table
        // joins the rows to its left; the join node itself comes from the list.
        let buffer_rule = self
            .present_rules(obj)
            .first()
            .copied()
            .filter(|rule| rule.descent == Descent::JoinBuffer);
        if let Some(rule) = buffer_rule
            && let Some(buffer) = obj[&rule.key].as_object()
        {
            let buffer_path = format!("{path}/{}", rule.key);
            let mut inner = match self.resolve_inner(buffer, &buffer_path)? {
                Some(inner) => inner,
                None => self.empty_node(buffer),
            };
            self.merge_scalars(&mut inner, buffer, &buffer_path)?;
            return Ok((inner, hint));
        }
        Ok((self.parse_object(obj, path)?, hint))
    }

    fn parse_iterator(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<PlanNode, ParseError> {
        let mapping = self.mapping;
        let iterator = &mapping.iterator;
        let access = obj.get(&iterator.kind_key).and_then(Value::as_str);
        let mut kind = access
            .and_then(|access| iterator.kinds.get(access))
            .copied()
            .unwrap_or(OperationKind::Unknown);
        if kind.is_join()
            && obj
                .get(&iterator.join_algorithm_key)
                .and_then(Value::as_str)
                .is_some_and(|algorithm| mapping.is_hash_join_hint(algorithm))
        {
            kind = OperationKind::HashJoin;
        }
        let label = iterator
            .label_sources
            .iter()
            .find_map(|source| obj.get(source).and_then(scalar_text));
        let mut node = match label {
            Some(label) => PlanNode::new(kind, label),
            None => {
                let mut node = self.unknown_node(&Value::Object(obj.clone()));
                node.kind = kind;
                node
            }
        };
        if kind == OperationKind::Unknown {
            self.record(
                path,
                DiagnosticKind::UnknownOperation {
                    keys: access.map(str::to_string).into_iter().collect(),
                },
            );
        }
        self.apply_scalars(&mut node, obj, path)?;

        if let Some(inputs) = obj.get(&iterator.children_key).and_then(Value::as_array) {
            for (idx, input) in inputs.iter().enumerate() {
                let input_path = format!("{path}/{}/{idx}", iterator.children_key);
                let Some(input_obj) = input.as_object() else {
                    node.children.push(self.unknown_node(input));
                    continue;
                };
                let child = self.parse_iterator(input_obj, &input_path)?;
                let is_subquery = input_obj
                    .get(&iterator.subquery_flag)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if is_subquery {
                    let location = input_obj
                        .get(&iterator.subquery_label_key)
                        .and_then(scalar_text)
                        .unwrap_or_default();
                    let wrapper =
                        PlanNode::new(OperationKind::Subquery, location).with_child(child);
                    node.children.push(wrapper);
                } else {
                    node.children.push(child);
                }
            }
        }
        Ok(node)
    }

    fn attach_subqueries(
        &mut self,
        node: &mut PlanNode,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<(), ParseError> {
        let mapping = self.mapping;
        for key in &mapping.subquery_keys {
            let Some(entries) = obj.get(key).and_then(Value::as_array) else {
                continue;
            };
            for (idx, entry) in entries.iter().enumerate() {
                let entry_path = format!("{path}/{key}/{idx}");
                let Some(entry) = entry.as_object() else {
                    node.children.push(self.unknown_node(entry));
                    continue;
                };
                let mut subquery = PlanNode::new(OperationKind::Subquery, subquery_label(key));
                self.apply_scalars(&mut subquery, entry, &entry_path)?;
                let inner = match entry.get(&mapping.query_block_key).and_then(Value::as_object) {
                    Some(block) => {
                        let block_path = format!("{entry_path}/{}", mapping.query_block_key);
                        Some(self.parse_object(block, &block_path)?)
                    }
                    None => self.resolve_inner(entry, &entry_path)?,
                };
                if let Some(inner) = inner {
                    subquery.children.push(inner);
                }
                node.children.push(subquery);
            }
        }
        Ok(())
    }

    /// Node for an object with no operation at all, e.g. a query block that
    /// only carries `"message": "No tables used"`.
    fn empty_node(&self, obj: &Map<String, Value>) -> PlanNode {
        match obj.get(&self.mapping.message_key).and_then(scalar_text) {
            Some(message) => PlanNode::new(OperationKind::Unknown, message),
            None => self.unknown_node(&Value::Object(obj.clone())),
        }
    }

    fn unknown_node(&self, fragment: &Value) -> PlanNode {
        let raw = serde_json::to_string(fragment).unwrap_or_default();
        PlanNode::new(
            OperationKind::Unknown,
            truncate_chars(&raw, self.mapping.max_unknown_label_chars),
        )
    }

    fn is_passive(&self, key: &str) -> bool {
        let mapping = self.mapping;
        key == mapping.query_block_key
            || mapping.passive_keys.iter().any(|passive| passive == key)
            || mapping.operations.iter().any(|rule| rule.key == key)
    }

    /// Reads rows, metrics, and attributes from `obj` into `node`.
    fn apply_scalars(
        &mut self,
        node: &mut PlanNode,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<(), ParseError> {
        self.read_scalars(node, obj, path, true)
    }

    /// Like `apply_scalars`, but never overwrites values already set.
    fn merge_scalars(
        &mut self,
        node: &mut PlanNode,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<(), ParseError> {
        self.read_scalars(node, obj, path, false)
    }

    fn read_scalars(
        &mut self,
        node: &mut PlanNode,
        obj: &Map<String, Value>,
        path: &str,
        overwrite: bool,
    ) -> Result<(), ParseError> {
        let mapping = self.mapping;
        if overwrite || node.estimated_rows.is_none() {
            for source in &mapping.rows_sources {
                if let Some(value) = lookup_path(obj, source)
                    && let Some(rows) = self.number(value, source, MetricUnit::Plain, path)?
                {
                    node.estimated_rows = Some(rows);
                    break;
                }
            }
        }
        for rule in &mapping.metrics {
            if !overwrite && node.metrics.contains_key(&rule.name) {
                continue;
            }
            for source in &rule.sources {
                if let Some(value) = lookup_path(obj, source)
                    && let Some(number) = self.number(value, source, rule.unit, path)?
                {
                    node.metrics.insert(rule.name.clone(), number);
                    break;
                }
            }
        }
        for rule in &mapping.attributes {
            if !overwrite && node.attributes.contains_key(&rule.name) {
                continue;
            }
            if let Some(text) = rule
                .sources
                .iter()
                .find_map(|source| lookup_path(obj, source).and_then(attribute_text))
            {
                node.attributes.insert(rule.name.clone(), text);
            }
        }
        Ok(())
    }

    fn number(
        &mut self,
        value: &Value,
        field: &str,
        unit: MetricUnit,
        path: &str,
    ) -> Result<Option<f64>, ParseError> {
        let Some(number) = parse_number(value, field, unit)? else {
            return Ok(None);
        };
        if number < 0.0 {
            self.record(
                path,
                DiagnosticKind::NegativeValue {
                    field: field.to_string(),
                    value: number,
                },
            );
            return Ok(Some(0.0));
        }
        Ok(Some(number))
    }
}

/// Accepts JSON numbers and numeric strings. `null` counts as absent.
pub(crate) fn parse_number(
    value: &Value,
    field: &str,
    unit: MetricUnit,
) -> Result<Option<f64>, ParseError> {
    let invalid = || ParseError::InvalidNumeric {
        field: field.to_string(),
        value: value.to_string(),
    };
    let number = match value {
        Value::Null => return Ok(None),
        Value::Number(number) => number.as_f64().ok_or_else(invalid)?,
        Value::String(text) => {
            let trimmed = text.trim();
            match unit {
                MetricUnit::Plain => trimmed.parse::<f64>().map_err(|_| invalid())?,
                MetricUnit::Percent => trimmed
                    .trim_end_matches('%')
                    .trim_end()
                    .parse::<f64>()
                    .map_err(|_| invalid())?,
                MetricUnit::Bytes => parse_byte_size(trimmed).ok_or_else(invalid)?,
            }
        }
        _ => return Err(invalid()),
    };
    if !number.is_finite() {
        return Err(invalid());
    }
    Ok(Some(number))
}

fn parse_byte_size(text: &str) -> Option<f64> {
    let caps = BYTE_SIZE_RE.captures(text)?;
    let number: f64 = caps.name("num")?.as_str().parse().ok()?;
    let exponent = match caps.name("unit").map(|unit| unit.as_str().to_ascii_lowercase()) {
        None => 0,
        Some(unit) => match unit.as_str() {
            "k" => 1,
            "m" => 2,
            "g" => 3,
            _ => 4,
        },
    };
    Some(number * 1024f64.powi(exponent))
}

/// Dotted lookup, e.g. `cost_info.read_cost`.
fn lookup_path<'v>(obj: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut parts = path.split('.');
    let mut current = obj.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let collapsed = WHITESPACE_RE.replace_all(text.trim(), " ");
            if collapsed.is_empty() {
                None
            } else {
                Some(collapsed.into_owned())
            }
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Bool(true) => Some("yes".to_string()),
        Value::Bool(false) | Value::Null | Value::Object(_) => None,
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        other => scalar_text(other),
    }
}

fn join_hint_of_buffer(obj: &Map<String, Value>) -> Option<String> {
    ["join_type", "buffer_type"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(scalar_text))
}

fn rule_label(rule: &OperationRule, obj: &Map<String, Value>) -> String {
    rule.label_sources
        .iter()
        .find_map(|source| lookup_path(obj, source).and_then(scalar_text))
        .or_else(|| rule.label.clone())
        .unwrap_or_default()
}

fn subquery_label(key: &str) -> String {
    key.trim_end_matches("subqueries")
        .trim_end_matches('_')
        .replace('_', " ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::LATEST_SCHEMA_VERSION;

    fn parse(input: &str) -> ParsedPlan {
        parse_plan(input, LATEST_SCHEMA_VERSION).unwrap()
    }

    #[test]
    fn parse_single_table() {
        let parsed = parse(
            r#"{"query_block":{"select_id":1,"cost_info":{"query_cost":"10.25"},
                "table":{"table_name":"t1","access_type":"ALL","rows_examined_per_scan":100,
                "filtered":"100.00","cost_info":{"read_cost":"0.25","eval_cost":"10.00",
                    "prefix_cost":"10.25","data_read_per_join":"16K"}}}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.kind, OperationKind::TableScan);
        assert_eq!(root.label, "t1");
        assert!(root.is_leaf());
        assert_eq!(root.estimated_rows, Some(100.0));
        assert_eq!(root.metric("filtered"), Some(100.0));
        assert_eq!(root.metric("data_read"), Some(16.0 * 1024.0));
        assert_eq!(root.metric("query_cost"), Some(10.25));
        assert_eq!(root.attributes.get("select_id").map(String::as_str), Some("1"));
        assert_eq!(root.attributes.get("access_type").map(String::as_str), Some("ALL"));
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn parse_nested_loop_left_deep() {
        let parsed = parse(
            r#"{"query_block":{"nested_loop":[
                {"table":{"table_name":"a","access_type":"ALL"}},
                {"table":{"table_name":"b","access_type":"eq_ref","key":"PRIMARY",
                    "rows_produced_per_join":5,"cost_info":{"prefix_cost":"3.5"}}},
                {"table":{"table_name":"c","access_type":"ALL","using_join_buffer":"hash join"}}
            ]}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.kind, OperationKind::HashJoin);
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].label, "c");
        let inner = &root.children[0];
        assert_eq!(inner.kind, OperationKind::NestedLoopJoin);
        assert_eq!(inner.metric("prefix_cost"), Some(3.5));
        assert_eq!(inner.estimated_rows, Some(5.0));
        assert_eq!(inner.children[0].label, "a");
        assert_eq!(inner.children[1].kind, OperationKind::IndexLookup);
        assert_eq!(
            inner.children[1].attributes.get("key").map(String::as_str),
            Some("PRIMARY")
        );
        assert_eq!(root.node_count(), 5);
    }

    #[test]
    fn single_element_join_list_resolves_to_element() {
        let parsed = parse(r#"{"query_block":{"nested_loop":[{"table":{"table_name":"only"}}]}}"#);
        assert_eq!(parsed.root.kind, OperationKind::TableScan);
        assert_eq!(parsed.root.label, "only");
    }

    #[test]
    fn wrappers_nest_in_order() {
        let parsed = parse(
            r#"{"query_block":{"ordering_operation":{"using_filesort":true,
                "grouping_operation":{"using_temporary_table":true,
                    "table":{"table_name":"film","access_type":"index","key":"idx_title"}}}}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.kind, OperationKind::Ordering);
        assert_eq!(root.attributes.get("using_filesort").map(String::as_str), Some("yes"));
        let group = &root.children[0];
        assert_eq!(group.kind, OperationKind::Grouping);
        assert_eq!(group.attributes.get("using_temporary").map(String::as_str), Some("yes"));
        assert_eq!(group.children[0].kind, OperationKind::TableScan);
    }

    #[test]
    fn derived_table_and_attached_subquery() {
        let parsed = parse(
            r#"{"query_block":{"table":{"table_name":"<derived2>","access_type":"ALL",
                "materialized_from_subquery":{"using_temporary_table":true,"dependent":false,
                    "query_block":{"select_id":2,"table":{"table_name":"inner_t"}}},
                "attached_subqueries":[{"dependent":true,"cacheable":false,
                    "query_block":{"select_id":3,
                        "table":{"table_name":"sub_t","access_type":"ref"}}}]}}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.label, "<derived2>");
        assert_eq!(root.children.len(), 2);
        let materialized = &root.children[0];
        assert_eq!(materialized.kind, OperationKind::Materialization);
        assert_eq!(materialized.children[0].label, "inner_t");
        assert_eq!(
            materialized.children[0].attributes.get("select_id").map(String::as_str),
            Some("2")
        );
        let subquery = &root.children[1];
        assert_eq!(subquery.kind, OperationKind::Subquery);
        assert_eq!(subquery.label, "attached");
        assert_eq!(subquery.attributes.get("dependent").map(String::as_str), Some("yes"));
        assert_eq!(subquery.children[0].kind, OperationKind::IndexLookup);
    }

    #[test]
    fn union_specifications_become_children() {
        let parsed = parse(
            r#"{"query_block":{"union_result":{"using_temporary_table":true,
                "table_name":"<union1,2>","access_type":"ALL","query_specifications":[
                    {"dependent":false,
                        "query_block":{"select_id":1,"table":{"table_name":"a"}}},
                    {"dependent":false,
                        "query_block":{"select_id":2,"table":{"table_name":"b"}}}]}}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.kind, OperationKind::Union);
        assert_eq!(root.label, "<union1,2>");
        let labels: Vec<_> = root.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["a", "b"]);
    }

    #[test]
    fn mariadb_block_nl_join() {
        let parsed = parse(
            r#"{"query_block":{"select_id":1,"nested_loop":[
                {"table":{"table_name":"t1","access_type":"ALL","rows":10,"filtered":100}},
                {"block-nl-join":{"table":{"table_name":"t2","access_type":"hash_ALL","rows":10},
                    "buffer_type":"flat","join_type":"BNLH",
                    "attached_condition":"t2.a = t1.a"}}]}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.kind, OperationKind::HashJoin);
        assert_eq!(root.attributes.get("join_buffer").map(String::as_str), Some("BNLH"));
        let inner = &root.children[1];
        assert_eq!(inner.label, "t2");
        assert_eq!(inner.estimated_rows, Some(10.0));
        assert_eq!(inner.attributes.get("condition").map(String::as_str), Some("t2.a = t1.a"));
    }

    #[test]
    fn standalone_join_buffer_wraps_table() {
        let parsed = parse(
            r#"{"query_block":{"block-nl-join":{"table":{"table_name":"t2"},"join_type":"BNL"}}}"#,
        );
        assert_eq!(parsed.root.kind, OperationKind::NestedLoopJoin);
        assert_eq!(parsed.root.children[0].label, "t2");
    }

    #[test]
    fn unknown_key_degrades_to_placeholder() {
        let parsed = parse(
            r#"{"query_block":{"nested_loop":[{"table":{"table_name":"t1"}},
                {"window_function":{"frame":"rows"}}]}}"#,
        );
        let unknown = &parsed.root.children[1];
        assert_eq!(unknown.kind, OperationKind::Unknown);
        assert_eq!(unknown.label, r#"{"window_function":{"frame":"rows"}}"#);
        assert!(parsed.diagnostics.iter().any(|d| matches!(
            &d.kind,
            DiagnosticKind::UnknownOperation { keys } if keys == &["window_function".to_string()]
        )));
    }

    #[test]
    fn unknown_key_beside_operation_is_kept() {
        let parsed = parse(
            r#"{"query_block":{"window_function":{"frame":"rows"},"table":{"table_name":"t1"}}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.kind, OperationKind::TableScan);
        assert_eq!(root.node_count(), 2);
        assert_eq!(root.children[0].kind, OperationKind::Unknown);
        assert_eq!(root.children[0].label, r#"{"window_function":{"frame":"rows"}}"#);
        assert!(matches!(
            &parsed.diagnostics[..],
            [Diagnostic { path, kind: DiagnosticKind::UnknownOperation { keys } }]
                if path == "/query_block" && keys == &["window_function".to_string()]
        ));
    }

    #[test]
    fn unknown_key_inside_table_is_kept() {
        let parsed = parse(
            r#"{"query_block":{"table":{"table_name":"t1","cost_info":{"read_cost":"1"},
                "window_function":{"frame":"rows"},"pushed_join":{"tables":2}}}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.label, "t1");
        let labels: Vec<_> = root.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            [r#"{"window_function":{"frame":"rows"}}"#, r#"{"pushed_join":{"tables":2}}"#]
        );
        assert!(root.children.iter().all(|c| c.kind == OperationKind::Unknown));
        assert!(matches!(
            &parsed.diagnostics[..],
            [Diagnostic { path, kind: DiagnosticKind::UnknownOperation { keys } }]
                if path == "/query_block/table" && keys.len() == 2
        ));
    }

    #[test]
    fn unknown_key_in_join_input_stays_with_its_table() {
        let parsed = parse(
            r#"{"query_block":{"nested_loop":[{"table":{"table_name":"t1"}},
                {"table":{"table_name":"t2"},"window_function":{"frame":"rows"}}]}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.kind, OperationKind::NestedLoopJoin);
        let t2 = &root.children[1];
        assert_eq!(t2.label, "t2");
        assert_eq!(t2.children[0].kind, OperationKind::Unknown);
        assert_eq!(parsed.diagnostics[0].path, "/query_block/nested_loop/1");
    }

    #[test]
    fn unknown_label_is_truncated() {
        let long = "x".repeat(400);
        let input = format!(r#"{{"query_block":{{"mystery":{{"text":"{long}"}}}}}}"#);
        let parsed = parse(&input);
        assert_eq!(parsed.root.kind, OperationKind::Unknown);
        assert_eq!(parsed.root.label.chars().count(), 121);
        assert!(parsed.root.label.ends_with('…'));
    }

    #[test]
    fn message_only_query_block() {
        let parsed = parse(r#"{"query_block":{"select_id":1,"message":"No tables used"}}"#);
        assert_eq!(parsed.root.kind, OperationKind::Unknown);
        assert_eq!(parsed.root.label, "No tables used");
    }

    #[test]
    fn conflicting_operations_take_priority_order() {
        let parsed = parse(
            r#"{"query_block":{"table":{"table_name":"late"},
                "grouping_operation":{"table":{"table_name":"early"}}}}"#,
        );
        assert_eq!(parsed.root.kind, OperationKind::Grouping);
        assert!(parsed.diagnostics.iter().any(|d| matches!(
            &d.kind,
            DiagnosticKind::ConflictingOperations { chosen, ignored }
                if chosen == "grouping_operation" && ignored == &["table".to_string()]
        )));
    }

    #[test]
    fn malformed_json_reports_position() {
        let err = parse_plan(r#"{"query_block":{"table":"#, LATEST_SCHEMA_VERSION).unwrap_err();
        assert!(matches!(err, ParseError::MalformedInput { line: 1, .. }));
    }

    #[test]
    fn invalid_numeric_fails() {
        let err = parse_plan(
            r#"{"query_block":{"table":{"table_name":"t","rows_examined_per_scan":"lots"}}}"#,
            LATEST_SCHEMA_VERSION,
        )
        .unwrap_err();
        match err {
            ParseError::InvalidNumeric { field, value } => {
                assert_eq!(field, "rows_examined_per_scan");
                assert_eq!(value, "\"lots\"");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn negative_values_clamp_with_diagnostic() {
        let parsed =
            parse(r#"{"query_block":{"table":{"table_name":"t","cost_info":{"read_cost":"-1"}}}}"#);
        assert_eq!(parsed.root.metric("read_cost"), Some(0.0));
        assert!(parsed
            .diagnostics
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::NegativeValue { .. })));
    }

    #[test]
    fn unrecognized_top_level() {
        let err = parse_plan(r#"{"plan":{}}"#, LATEST_SCHEMA_VERSION).unwrap_err();
        match err {
            ParseError::UnrecognizedTopLevelShape { keys } => assert_eq!(keys, ["plan"]),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            parse_plan("[1, 2]", LATEST_SCHEMA_VERSION),
            Err(ParseError::UnrecognizedTopLevelShape { .. })
        ));
    }

    #[test]
    fn version_mismatch_is_a_diagnostic_only() {
        let parsed = parse_plan(r#"{"query_block":{"table":{"table_name":"t"}}}"#, "0.1").unwrap();
        assert_eq!(parsed.root.label, "t");
        assert!(matches!(
            &parsed.diagnostics[0].kind,
            DiagnosticKind::VersionMismatch { expected, .. } if expected == "0.1"
        ));
    }

    #[test]
    fn iterator_format_plan() {
        let parsed = parse(
            r#"{"query":"select ...","query_plan":{"operation":"Inner hash join (t2.a = t1.a)",
                "access_type":"join","join_algorithm":"hash","estimated_rows":10,
                "estimated_total_cost":4.5,
                "inputs":[
                    {"operation":"Table scan on t1","access_type":"table","table_name":"t1",
                        "estimated_rows":10},
                    {"operation":"Filter: (t2.b > 3)","access_type":"filter","inputs":[
                        {"operation":"Index lookup on t2 using idx_b","access_type":"index",
                            "index_name":"idx_b"}]},
                    {"operation":"Select #2 (subquery in condition; run only once)",
                        "access_type":"materialize",
                        "subquery":true,"subquery_location":"condition"}]}}"#,
        );
        let root = &parsed.root;
        assert_eq!(root.kind, OperationKind::HashJoin);
        assert_eq!(root.metric("total_cost"), Some(4.5));
        assert_eq!(root.children[0].kind, OperationKind::TableScan);
        assert_eq!(root.children[1].kind, OperationKind::Filter);
        assert_eq!(root.children[1].children[0].kind, OperationKind::IndexLookup);
        assert_eq!(root.children[2].kind, OperationKind::Subquery);
        assert_eq!(root.children[2].label, "condition");
        assert_eq!(root.children[2].children[0].kind, OperationKind::Materialization);
    }

    #[test]
    fn custom_mapping_adds_a_shape() {
        let mut mapping = FieldMapping::builtin();
        mapping.version = "9.9".to_string();
        mapping.operations.insert(
            0,
            OperationRule {
                key: "window_function".to_string(),
                kind: OperationKind::Ordering,
                descent: Descent::Wrapper,
                label_sources: Vec::new(),
                label: Some("window".to_string()),
            },
        );
        let parsed = PlanParser::new(&mapping)
            .parse(
                r#"{"query_block":{"window_function":{"table":{"table_name":"w"}}}}"#,
                "9.9",
            )
            .unwrap();
        assert_eq!(parsed.root.kind, OperationKind::Ordering);
        assert_eq!(parsed.root.children[0].label, "w");
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn numbers_accept_strings_and_units() {
        let num = |v: Value, unit| parse_number(&v, "f", unit).unwrap();
        assert_eq!(num(Value::from(3), MetricUnit::Plain), Some(3.0));
        assert_eq!(num(Value::from(" 2.50 "), MetricUnit::Plain), Some(2.5));
        assert_eq!(num(Value::from("33.33%"), MetricUnit::Percent), Some(33.33));
        assert_eq!(num(Value::from("1M"), MetricUnit::Bytes), Some(1024.0 * 1024.0));
        assert_eq!(num(Value::from("256Kb"), MetricUnit::Bytes), Some(256.0 * 1024.0));
        assert_eq!(num(Value::from("512"), MetricUnit::Bytes), Some(512.0));
        assert_eq!(num(Value::Null, MetricUnit::Plain), None);
        assert!(parse_number(&Value::from(true), "f", MetricUnit::Plain).is_err());
        assert!(parse_number(&Value::from("12X"), "f", MetricUnit::Bytes).is_err());
    }

    #[test]
    fn conditions_collapse_whitespace() {
        let parsed = parse(
            r#"{"query_block":{"table":{"table_name":"t",
                "attached_condition":"(`t`.`a` >\n    3)"}}}"#,
        );
        assert_eq!(
            parsed.root.attributes.get("condition").map(String::as_str),
            Some("(`t`.`a` > 3)")
        );
    }
}
