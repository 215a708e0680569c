use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use semlineage_core::{AnalysisReport, Config, DataSource, GatewayRequirement, Severity};
use semlineage_engine::{ChainNode, LineageEngine, VisualUsage};
use semlineage_tmdl::ParsedModel;

/// SemLineage - lineage analysis for Power BI semantic models
#[derive(Parser)]
#[command(name = "semlineage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: semlineage.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to find the model and its visual usage
#[derive(Args)]
struct ProjectArgs {
    /// TMDL project directory (the folder holding `model.tmdl`)
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    /// Visual field-usage JSON (default: <project>/visuals.json when present)
    #[arg(long)]
    visuals: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the model and report diagnostics and data sources
    Analyze {
        #[command(flatten)]
        project: ProjectArgs,

        /// Output file for report.json (printed to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Mask server, database, url and path of every data source
        #[arg(long)]
        redact: bool,
    },

    /// Show the measures a measure depends on
    Chain {
        /// Measure name
        measure: String,

        #[command(flatten)]
        project: ProjectArgs,

        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },

    /// Show what breaks if a measure changes
    Impact {
        /// Measure name
        measure: String,

        #[command(flatten)]
        project: ProjectArgs,

        #[arg(long)]
        json: bool,
    },

    /// Trace one visual down to its data sources
    Trace {
        /// Report page name
        page: String,

        /// Visual name
        visual: String,

        #[command(flatten)]
        project: ProjectArgs,

        #[arg(long)]
        json: bool,
    },

    /// Export the lineage graph as JSON
    Graph {
        #[command(flatten)]
        project: ProjectArgs,

        /// Output file (printed to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Analyze { project, output, redact } => {
            analyze_command(&config, &project, output.as_deref(), redact, cli.verbose)
        }
        Commands::Chain { measure, project, json } => {
            chain_command(&config, &project, &measure, json)
        }
        Commands::Impact { measure, project, json } => {
            impact_command(&config, &project, &measure, json)
        }
        Commands::Trace { page, visual, project, json } => {
            trace_command(&config, &project, &page, &visual, json)
        }
        Commands::Graph { project, output } => graph_command(&config, &project, output.as_deref()),
    }
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(config_path) = path {
        return Ok(Config::from_file(config_path)?);
    }

    let default_path = Path::new("semlineage.toml");
    if default_path.exists() {
        Ok(Config::from_file(default_path)?)
    } else {
        if verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Ok(Config::default())
    }
}

/// Read every `*.tmdl` file under `root` into a `relative path -> text` list
fn collect_tmdl_files(root: &Path) -> Result<Vec<(String, String)>> {
    if !root.is_dir() {
        return Err(anyhow::anyhow!("Project directory not found: {}", root.display()));
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "tmdl") {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        files.push((relative, text));
    }

    if files.is_empty() {
        return Err(anyhow::anyhow!("No .tmdl files found under {}", root.display()));
    }
    Ok(files)
}

fn load_model(project: &ProjectArgs) -> Result<ParsedModel> {
    let files = collect_tmdl_files(&project.project)?;
    tracing::debug!(files = files.len(), project = %project.project.display(), "loading project");
    Ok(semlineage_tmdl::parse_project(files))
}

fn load_visuals(project: &ProjectArgs) -> Result<Vec<VisualUsage>> {
    let path = match &project.visuals {
        Some(path) => path.clone(),
        None => {
            let candidate = project.project.join("visuals.json");
            if !candidate.exists() {
                return Ok(Vec::new());
            }
            candidate
        }
    };

    VisualUsage::from_file(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load visuals from {}: {}", path.display(), e))
}

fn build_engine(config: &Config, project: &ProjectArgs) -> Result<(ParsedModel, LineageEngine)> {
    let parsed = load_model(project)?;
    let visuals = load_visuals(project)?;
    let engine = LineageEngine::build_with_config(&parsed.model, &visuals, config);
    Ok((parsed, engine))
}

/// Analyze command - parse, extract sources, write report.json
fn analyze_command(
    config: &Config,
    project: &ProjectArgs,
    output: Option<&Path>,
    redact: bool,
    verbose: bool,
) -> Result<()> {
    if verbose {
        eprintln!("{} {}", "Analyzing project:".cyan(), project.project.display());
    }

    let (parsed, engine) = build_engine(config, project)?;

    let mut diagnostics = parsed.warnings.clone();
    diagnostics.extend(engine.diagnostics().iter().cloned());

    let mut report = AnalysisReport::new(
        &parsed.model,
        diagnostics,
        engine.all_data_sources().to_vec(),
        &config.severity,
    );

    let unused: Vec<String> = engine
        .unused_measures()
        .into_iter()
        .map(|m| format!("{}[{}]", m.table, m.name))
        .collect();
    report.metadata = Some(serde_json::json!({
        "graph": {
            "nodes": engine.graph().node_count(),
            "edges": engine.graph().edge_count(),
        },
        "visuals": engine.visuals().len(),
        "unusedMeasures": unused,
    }));

    if redact || config.redact_sensitive_data {
        report.redact();
    }

    match output {
        Some(path) => {
            report.save_to_file(path)?;
            print_report_summary(&report);
            if verbose {
                eprintln!("{} {}", "Report saved to:".green(), path.display());
            }
        }
        None => println!("{}", report.to_json()?),
    }

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Chain command - measure dependency tree
fn chain_command(config: &Config, project: &ProjectArgs, measure: &str, json: bool) -> Result<()> {
    let (_, engine) = build_engine(config, project)?;
    let name = known_measure(&engine, measure)?;
    let chain = engine.resolve_measure_chain(&name);

    if json {
        println!("{}", serde_json::to_string_pretty(chain.as_ref())?);
        return Ok(());
    }

    println!("{}", name.bold().green());
    if chain.is_empty() {
        println!("  {}", "(no measure dependencies)".dimmed());
    }
    print_chain(&chain, 1);

    Ok(())
}

/// Impact command - dependent measures and affected visuals
fn impact_command(config: &Config, project: &ProjectArgs, measure: &str, json: bool) -> Result<()> {
    let (_, engine) = build_engine(config, project)?;
    let name = known_measure(&engine, measure)?;
    let impact = engine
        .measure_impact(&name)
        .ok_or_else(|| anyhow::anyhow!("Measure '{}' not found in model", measure))?;

    if json {
        println!("{}", serde_json::to_string_pretty(impact.as_ref())?);
        return Ok(());
    }

    print_banner("Measure Impact Analysis");

    println!("{} {}", "Measure:".bold(), format!("{}[{}]", impact.measure.table, impact.measure.name).green());
    println!("{} {}", "Dependent measures:".bold(), impact.dependent_measures.len());
    for dependent in &impact.dependent_measures {
        println!("  - {}[{}]", dependent.table, dependent.name.yellow());
    }
    println!();

    if impact.visuals.is_empty() {
        println!("{}", "✓ No visuals use this measure".green());
    } else {
        println!("{} {}", "Affected visuals:".bold(), impact.visuals.len());
        for visual in &impact.visuals {
            let via = visual
                .via
                .as_deref()
                .map(|m| format!(" (via [{}])", m))
                .unwrap_or_default();
            println!(
                "  - {} / {} [{}]{}",
                visual.page_name,
                visual.visual_name.yellow(),
                visual.visual_type,
                via.dimmed()
            );
        }
        println!();
        println!("{}", "⚠ Changes to this measure affect the visuals above!".yellow().bold());
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Trace command - one visual down to its sources
fn trace_command(
    config: &Config,
    project: &ProjectArgs,
    page: &str,
    visual: &str,
    json: bool,
) -> Result<()> {
    let (_, engine) = build_engine(config, project)?;
    let mut lineage = engine
        .visual_lineage(page, visual)
        .ok_or_else(|| anyhow::anyhow!("Visual '{}' on page '{}' not found", visual, page))?
        .as_ref()
        .clone();

    if config.redact_sensitive_data {
        lineage.data_sources = lineage.data_sources.iter().map(DataSource::redacted).collect();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&lineage)?);
        return Ok(());
    }

    print_banner("Visual Lineage");

    println!("{} {} / {} [{}]", "Visual:".bold(), lineage.page_name, lineage.visual_name.green(), lineage.visual_type);
    println!();

    println!("{}", "Measures:".bold());
    for measure in &lineage.measures {
        let marker = if measure.direct { "direct".green() } else { "indirect".dimmed() };
        println!("  - {}[{}] ({})", measure.table, measure.name, marker);
    }

    println!("{}", "Columns:".bold());
    for column in &lineage.columns {
        println!("  - {}", column);
    }

    println!("{} {}", "Tables:".bold(), lineage.tables.join(", "));

    println!("{}", "Data sources:".bold());
    for source in &lineage.data_sources {
        println!("  - {} {}", source.label(), gateway_label(source.gateway_required));
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Graph command - nodes and edges for external renderers
fn graph_command(config: &Config, project: &ProjectArgs, output: Option<&Path>) -> Result<()> {
    let (_, engine) = build_engine(config, project)?;
    let json = serde_json::to_string_pretty(&engine.graph().export())?;

    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!(
                "{} {} ({} nodes, {} edges)",
                "Graph saved to:".green(),
                path.display(),
                engine.graph().node_count(),
                engine.graph().edge_count()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn known_measure(engine: &LineageEngine, measure: &str) -> Result<String> {
    engine
        .measure_index()
        .canonical_name(measure)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Measure '{}' not found in model", measure))
}

fn print_chain(nodes: &[ChainNode], depth: usize) {
    for node in nodes {
        println!("{}└─ {}[{}]", "   ".repeat(depth - 1), node.table.dimmed(), node.name);
        print_chain(&node.dependencies, depth + 1);
    }
}

fn gateway_label(requirement: GatewayRequirement) -> colored::ColoredString {
    match requirement {
        GatewayRequirement::Required => "gateway required".yellow(),
        GatewayRequirement::NotRequired => "cloud".green(),
        GatewayRequirement::Unknown => "gateway unknown".dimmed(),
    }
}

fn print_banner(title: &str) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", title.bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
}

/// Print report summary to stdout
fn print_report_summary(report: &AnalysisReport) {
    print_banner("Semantic Model Analysis Report");

    println!("Model: {}", report.model_name);
    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    let summary = &report.summary;
    println!("{}", "Model:".bold());
    println!("  Tables:        {}", summary.tables);
    println!("  Columns:       {}", summary.columns);
    println!("  Measures:      {}", summary.measures);
    println!("  Relationships: {}", summary.relationships);
    println!("  Roles:         {}", summary.roles);
    println!();

    println!("{}", "Data sources:".bold());
    for source in &report.data_sources {
        println!("  - {} {}", source.label(), gateway_label(source.gateway_required));
    }
    if summary.gateway_sources > 0 {
        println!(
            "  {}",
            format!("{} source(s) need an on-premises gateway", summary.gateway_sources).yellow()
        );
    }
    println!();

    println!("{}", "Summary:".bold());
    println!("  Total diagnostics: {}", summary.total);

    if summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", summary.errors).green());
    }

    if summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", summary.warnings).green());
    }

    println!("  Info:     {}", summary.info);
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(loc) = &diag.location {
                println!("    at {}", loc);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_project() -> ProjectArgs {
        ProjectArgs {
            project: Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/sample-model"),
            visuals: None,
        }
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn collects_tmdl_files_with_relative_paths() {
        let files = collect_tmdl_files(&fixture_project().project).unwrap();
        let paths: Vec<&str> = files.iter().map(|(path, _)| path.as_str()).collect();

        assert!(paths.contains(&"model.tmdl"));
        assert!(paths.contains(&"tables/Sales.tmdl"));
        assert!(paths.iter().all(|p| p.ends_with(".tmdl")));
    }

    #[test]
    fn missing_project_is_an_error() {
        assert!(collect_tmdl_files(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn visuals_default_to_project_file() {
        let visuals = load_visuals(&fixture_project()).unwrap();
        assert_eq!(visuals.len(), 3);
    }

    #[test]
    fn parses_trace_arguments() {
        let cli = Cli::parse_from(["semlineage", "trace", "Overview", "Margin Card", "--project", "model", "--json"]);
        match cli.command {
            Commands::Trace { page, visual, project, json } => {
                assert_eq!(page, "Overview");
                assert_eq!(visual, "Margin Card");
                assert_eq!(project.project, PathBuf::from("model"));
                assert!(json);
            }
            _ => panic!("expected trace command"),
        }
    }
}
