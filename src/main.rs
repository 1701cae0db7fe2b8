//! Siteproof command line driver.
//!
//! ```bash
//! # Assemble a quick check from M1.html … M6.html in ./fragments
//! siteproof generate --report-type quick_check --fragments ./fragments --format html
//!
//! # List configured report types
//! siteproof report-types
//! ```
//!
//! Exits with status 2 when the produced document is blocking.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;
use uuid::Uuid;

use siteproof::config;
use siteproof::{
    AssemblyError, AuditSink, ConfigError, FragmentSet, JsonLinesAuditSink, KpiSchemaRegistry,
    ReportAssembler, TracingAuditSink,
};

/// Exit status for a blocked report.
const EXIT_BLOCKED: u8 = 2;

#[derive(Parser)]
#[command(name = "siteproof")]
#[command(version)]
#[command(about = "Assemble site feasibility reports from module fragments")]
#[command(long_about = None)]
struct Cli {
    /// KPI schema file replacing the embedded one
    #[arg(long, global = true, env = config::SCHEMA_PATH_ENV)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Html,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one report
    Generate {
        /// Report type, e.g. all_in_one or quick_check
        #[arg(long, short = 't')]
        report_type: String,

        /// Directory holding M1.html … M6.html
        #[arg(long, short = 'f')]
        fragments: PathBuf,

        /// Append audit records as JSON lines to this file
        #[arg(long)]
        audit_log: Option<PathBuf>,

        /// Request context id (random when omitted)
        #[arg(long)]
        context_id: Option<Uuid>,

        #[arg(long, default_value = "json", value_enum)]
        format: OutputFormat,
    },

    /// List the configured report types
    ReportTypes,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    siteproof::init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "siteproof failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let registry = match &cli.schema {
        Some(path) => KpiSchemaRegistry::from_path(path)?,
        None => KpiSchemaRegistry::load()?,
    };

    match cli.command {
        Commands::Generate {
            report_type,
            fragments,
            audit_log,
            context_id,
            format,
        } => cmd_generate(registry, &report_type, fragments, audit_log, context_id, format),
        Commands::ReportTypes => cmd_report_types(&registry),
    }
}

fn cmd_generate(
    registry: KpiSchemaRegistry,
    report_type: &str,
    fragments_dir: PathBuf,
    audit_log: Option<PathBuf>,
    context_id: Option<Uuid>,
    format: OutputFormat,
) -> Result<ExitCode, CliError> {
    let fragments = FragmentSet::load_dir(&fragments_dir).map_err(|source| CliError::Io {
        path: fragments_dir.clone(),
        source,
    })?;

    let audit: Arc<dyn AuditSink> = match audit_log {
        Some(path) => Arc::new(JsonLinesAuditSink::open(&path).map_err(|source| CliError::Io { path, source })?),
        None => Arc::new(TracingAuditSink),
    };

    let assembler = ReportAssembler::new(Arc::new(registry), audit);
    let context_id = context_id.unwrap_or_else(Uuid::new_v4);
    let document = assembler.generate_named(report_type, context_id, &fragments)?;

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&document)?,
        OutputFormat::Html => document.to_html(),
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(|source| CliError::Io {
        path: PathBuf::from("<stdout>"),
        source,
    })?;

    if document.is_blocking() {
        eprintln!(
            "blocked: missing critical KPIs {}",
            document.validation.critical_missing_names().join(", ")
        );
        return Ok(ExitCode::from(EXIT_BLOCKED));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_report_types(registry: &KpiSchemaRegistry) -> Result<ExitCode, CliError> {
    let digest = registry.digest();
    println!("schema {} ({})", registry.schema_version(), digest.get(..12).unwrap_or(digest));
    for report_type in registry.report_types() {
        let profile = registry.profile(report_type)?;
        let modules: Vec<&str> = profile.module_ids().map(|m| m.as_str()).collect();
        println!("{:<24} {:<40} {}", report_type.as_str(), profile.title, modules.join(" "));
    }
    Ok(ExitCode::SUCCESS)
}
