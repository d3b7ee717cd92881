use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Map;
use std::path::{Path, PathBuf};

use twosql_core::{Config, Diagnostic, DirectiveKind, Location, Report, SchemaFile, Severity};
use twosql_pipeline::{process_template, ProcessResult, ValidationMode};

/// twosql - 2-way SQL template validation and resolution
#[derive(Parser)]
#[command(name = "twosql")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: twosql.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate templates against the parameter schema and resolve placeholders
    Check {
        /// Template file or directory to check
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Parameter schema file (overrides the config setting)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,
    },

    /// Extract structural information without semantic validation
    Inspect {
        /// Template file or directory to inspect
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("twosql.toml").exists() {
        Config::from_file(Path::new("twosql.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    match cli.command {
        Commands::Check { path, schema, output } => {
            check_command(&config, &path, schema.as_deref(), &output, cli.verbose)
        }
        Commands::Inspect { path } => inspect_command(&config, &path, cli.verbose),
    }
}

/// Check command - validate and resolve every template
fn check_command(
    config: &Config,
    path: &Path,
    schema_override: Option<&Path>,
    output: &PathBuf,
    verbose: bool,
) -> Result<()> {
    let schema_path = schema_override
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| config.project_root.join(&config.schema_path));

    let schema_file = if schema_path.exists() {
        SchemaFile::from_file(&schema_path)
            .map_err(|e| anyhow::anyhow!("Failed to load schema {}: {}", schema_path.display(), e))?
    } else {
        if verbose {
            eprintln!(
                "{} {}",
                "No parameter schema found at".yellow(),
                schema_path.display()
            );
        }
        SchemaFile::default()
    };

    let schema = schema_file.schema();
    let registry = schema_file.registry();
    let constants = schema_file.constants.clone();

    let templates = collect_templates(path, &config.template_suffix)?;
    if templates.is_empty() {
        return Err(anyhow::anyhow!(
            "No *.{} templates found under {}",
            config.template_suffix,
            path.display()
        ));
    }
    tracing::debug!(templates = templates.len(), "collected templates");

    let mut report = Report::new();

    for template_path in &templates {
        if verbose {
            eprintln!("  {} {}...", "Checking".cyan(), template_path.display());
        }

        let source = match std::fs::read_to_string(template_path) {
            Ok(source) => source,
            Err(e) => {
                report.add_diagnostic(Diagnostic::error(
                    twosql_core::DiagnosticCode::InternalError,
                    format!("Failed to read {}: {}", template_path.display(), e),
                ));
                continue;
            }
        };

        let result = process_template(
            &source,
            &schema,
            &Map::new(),
            constants.clone(),
            &registry,
            ValidationMode::Strict,
        );

        let error_count = result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();

        for diagnostic in result.diagnostics.clone() {
            report.add_diagnostic(adjust(diagnostic, template_path, config));
        }
        report.record_template();

        if verbose && error_count > 0 {
            eprintln!("    {} errors found", error_count.to_string().red());
        } else if verbose {
            eprintln!("    {}", "✓ OK".green());
        }
    }

    report.save_to_file(output)?;
    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    print_report_summary(&report);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Inspect command - structural facts only, schema optional
fn inspect_command(config: &Config, path: &Path, verbose: bool) -> Result<()> {
    let templates = collect_templates(path, &config.template_suffix)?;
    if templates.is_empty() {
        return Err(anyhow::anyhow!(
            "No *.{} templates found under {}",
            config.template_suffix,
            path.display()
        ));
    }

    let mut failures = 0usize;

    for template_path in &templates {
        let source = std::fs::read_to_string(template_path)?;
        let result = process_template(
            &source,
            &twosql_core::ParamSchema::new(),
            &Map::new(),
            Map::new(),
            &twosql_core::TypeRegistry::new(),
            ValidationMode::Inspect,
        );

        println!("{}", template_path.display().to_string().bold());
        print_structure(&result);

        for diagnostic in result.diagnostics.iter() {
            println!(
                "  {} [{}] {}",
                severity_label(diagnostic.severity),
                diagnostic.code,
                diagnostic.message
            );
        }
        if result.diagnostics.has_errors() {
            failures += 1;
        }
        if verbose {
            if let Some(statement) = &result.statement {
                println!("  {}", "clause layout:".dimmed());
                for clause in statement.clauses() {
                    println!("    {:?} ({} tokens)", clause.kind(), clause.len());
                }
            }
        }
        println!();
    }

    if failures > 0 {
        eprintln!(
            "{}",
            format!("{} template(s) with structural errors", failures)
                .red()
                .bold()
        );
        std::process::exit(1);
    }

    Ok(())
}

fn print_structure(result: &ProcessResult) {
    let Some(statement) = &result.statement else {
        return;
    };

    let mut counts: Vec<(DirectiveKind, usize)> = Vec::new();
    for clause in statement.clauses() {
        for token in clause.tokens() {
            if let Some(metadata) = token.metadata() {
                match counts.iter_mut().find(|(k, _)| *k == metadata.kind) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((metadata.kind, 1)),
                }
            }
        }
    }

    let summary: Vec<String> = counts
        .iter()
        .map(|(kind, n)| format!("{} {}", n, kind))
        .collect();
    if summary.is_empty() {
        println!("  no directives");
    } else {
        println!("  directives: {}", summary.join(", "));
    }
}

/// Stamp the file path and apply configured severity overrides
fn adjust(mut diagnostic: Diagnostic, path: &Path, config: &Config) -> Diagnostic {
    diagnostic.severity = config
        .severity
        .get_severity(diagnostic.code, diagnostic.severity);

    let file = path.display().to_string();
    match &mut diagnostic.location {
        Some(location) => location.file = Some(file),
        None => diagnostic.location = Some(Location::in_file(file)),
    }

    diagnostic
}

fn collect_templates(path: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut templates = Vec::new();
    for entry in walkdir::WalkDir::new(path) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(suffix))
                .unwrap_or(false)
        {
            templates.push(entry.path().to_path_buf());
        }
    }
    templates.sort();
    Ok(templates)
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red().bold(),
        Severity::Warn => "warn".yellow(),
        Severity::Info => "info".cyan(),
    }
}

fn print_report_summary(report: &Report) {
    println!();
    println!("{}", "=".repeat(60).bright_blue());
    println!("{}", "Template Check Summary".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
    println!(
        "{} {}",
        "Templates checked:".bold(),
        report.summary.templates_checked
    );
    println!(
        "{} {}  {} {}  {} {}",
        "Errors:".bold(),
        colored_count(report.summary.errors, Severity::Error),
        "Warnings:".bold(),
        colored_count(report.summary.warnings, Severity::Warn),
        "Info:".bold(),
        report.summary.info
    );
    println!();

    if report.has_errors() {
        println!("{}", "✗ Template check failed".red().bold());
    } else {
        println!("{}", "✓ All templates passed".green());
    }
}

fn colored_count(count: usize, severity: Severity) -> colored::ColoredString {
    let text = count.to_string();
    if count == 0 {
        return text.normal();
    }
    match severity {
        Severity::Error => text.red(),
        Severity::Warn => text.yellow(),
        Severity::Info => text.cyan(),
    }
}
