use crate::config::load_config;
use crate::layout::compute_layout;
use crate::layout_dump::write_layout_dump;
use crate::mapping::{FieldMapping, LATEST_SCHEMA_VERSION};
use crate::render::{OutputFormat, render};
use crate::{ConvertOptions, parse_with_options};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "exdr",
    version,
    about = "Render MySQL/MariaDB EXPLAIN FORMAT=JSON plans as SVG or HTML diagrams"
)]
pub struct Args {
    /// EXPLAIN JSON file or '-' for stdin
    #[arg(short = 'i', long = "infile")]
    pub infile: Option<PathBuf>,

    /// Output file or '-' for stdout
    #[arg(short = 'o', long = "outfile")]
    pub outfile: Option<PathBuf>,

    /// Output format (svg or html)
    #[arg(short = 'f', long = "format", default_value = "svg", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Config JSON file (themeVariables, layout, render)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Field mapping JSON file replacing the built-in table
    #[arg(short = 'm', long = "mappingFile")]
    pub mapping: Option<PathBuf>,

    /// Schema version the plan is expected to follow
    #[arg(long = "schemaVersion", default_value = LATEST_SCHEMA_VERSION)]
    pub schema_version: String,

    /// Also write the computed layout as JSON to this path
    #[arg(long = "dumpLayout")]
    pub dump_layout: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_format(value: &str) -> std::result::Result<OutputFormat, String> {
    value.parse().map_err(|err: crate::error::RenderError| err.to_string())
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = convert_options(&args)?;
    let input = read_input(args.infile.as_deref())?;
    let parsed = parse_with_options(&input, &options)?;

    let config = &options.config;
    let layout = compute_layout(&parsed.root, &config.theme, &config.layout);
    if let Some(path) = args.dump_layout.as_deref() {
        write_layout_dump(path, &layout)
            .with_context(|| format!("failed to write layout dump to {}", path.display()))?;
    }
    let document = render(&layout, options.format, config);
    write_output(&document, args.outfile.as_deref())
}

fn convert_options(args: &Args) -> Result<ConvertOptions> {
    let mapping = args
        .mapping
        .as_deref()
        .map(FieldMapping::from_json_file)
        .transpose()?;
    Ok(ConvertOptions {
        format: args.format,
        schema_version: args.schema_version.clone(),
        config: load_config(args.config.as_deref())?,
        mapping,
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output(document: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::write(path, document)
            .with_context(|| format!("failed to write {}", path.display())),
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(document.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}
