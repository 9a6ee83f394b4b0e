#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod mapping;
pub mod parser;
pub mod render;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, EdgeRouting, LayoutConfig, RenderConfig, load_config};
pub use error::{Error, ModelError, ParseError, RenderError};
pub use ir::{OperationKind, PlanNode};
pub use layout::{LayoutNode, LayoutTree, compute_layout};
pub use mapping::{FieldMapping, LATEST_SCHEMA_VERSION};
pub use parser::{Diagnostic, DiagnosticKind, ParsedPlan, PlanParser, parse_plan};
pub use render::{OutputFormat, render, render_html, render_svg};
pub use theme::Theme;

use mapping::BUILTIN_MAPPING;
use std::io::{Read, Write};
use tracing::{debug, warn};

/// Options for one conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub format: OutputFormat,
    /// Schema version the caller expects the plan to follow.
    pub schema_version: String,
    pub config: Config,
    /// Replaces the built-in mapping table when set.
    pub mapping: Option<FieldMapping>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Svg,
            schema_version: LATEST_SCHEMA_VERSION.to_string(),
            config: Config::default(),
            mapping: None,
        }
    }
}

/// Parses `input` with the mapping and schema version from `options`. Plans
/// over `config.max_nodes` are logged and still returned.
pub fn parse_with_options(input: &str, options: &ConvertOptions) -> Result<ParsedPlan, Error> {
    let mapping = options.mapping.as_ref().unwrap_or(&*BUILTIN_MAPPING);
    let parsed = PlanParser::new(mapping).parse(input, &options.schema_version)?;
    let nodes = parsed.root.node_count();
    if nodes > options.config.max_nodes {
        warn!(
            nodes,
            limit = options.config.max_nodes,
            "plan is larger than the configured node limit; rendering anyway"
        );
    }
    debug!(
        nodes,
        diagnostics = parsed.diagnostics.len(),
        format = %options.format,
        "parsed plan"
    );
    Ok(parsed)
}

/// Parses `input`, lays it out and renders the requested document.
pub fn convert(input: &str, options: &ConvertOptions) -> Result<String, Error> {
    let parsed = parse_with_options(input, options)?;
    let layout = compute_layout(&parsed.root, &options.config.theme, &options.config.layout);
    Ok(render(&layout, options.format, &options.config))
}

/// Reads the whole of `input`, converts it, and writes the document to
/// `output`. Nothing is written when any stage fails.
pub fn convert_stream<R: Read, W: Write>(
    mut input: R,
    mut output: W,
    options: &ConvertOptions,
) -> Result<(), Error> {
    let mut buf = String::new();
    input.read_to_string(&mut buf)?;
    let document = convert(&buf, options)?;
    output.write_all(document.as_bytes())?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_single_table() {
        let input = r#"{"query_block":{"select_id":1,"table":{
            "table_name":"t1","access_type":"ALL","rows_examined_per_scan":10}}}"#;
        let svg = convert(input, &ConvertOptions::default()).unwrap();
        assert_eq!(svg.matches("<rect class=\"plan-node\"").count(), 1);
        assert!(svg.contains(">t1<"));
    }

    #[test]
    fn stream_writes_nothing_on_failure() {
        let mut out = Vec::new();
        let input = "{\"query_block\": ".as_bytes();
        let err = convert_stream(input, &mut out, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MalformedInput { .. })));
        assert!(err.to_string().starts_with("parse error:"));
        assert!(out.is_empty());
    }

    #[test]
    fn custom_mapping_is_used() {
        let mut mapping = FieldMapping::builtin();
        mapping.version = "9.9".to_string();
        let options = ConvertOptions {
            format: OutputFormat::Html,
            schema_version: "9.9".to_string(),
            mapping: Some(mapping),
            ..ConvertOptions::default()
        };
        let html = convert(r#"{"query_block":{"table":{"table_name":"t"}}}"#, &options).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn oversized_plans_still_parse_and_render() {
        let mut options = ConvertOptions::default();
        options.config.max_nodes = 1;
        let input = r#"{"query_block":{"nested_loop":[
            {"table":{"table_name":"t1"}},{"table":{"table_name":"t2"}}]}}"#;
        let parsed = parse_with_options(input, &options).unwrap();
        assert_eq!(parsed.root.node_count(), 3);
        let svg = convert(input, &options).unwrap();
        assert_eq!(svg.matches("<rect class=\"plan-node\"").count(), 3);
    }
}
