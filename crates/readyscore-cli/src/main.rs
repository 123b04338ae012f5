mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use readyscore_core::{CoreError, CsvOptions, Dataset, Dimension, Table};
use readyscore_eval::template::{load_template_path, template_json_schema};
use readyscore_eval::{
    AssessmentConfig, AssessmentEngine, AssessmentReport, DEFAULT_MAX_FINDINGS, EvalError,
    ScoreGate, Template, TemplateError, render_markdown,
};
use readyscore_rules::{RuleError, RuleRegistry};
use thiserror::Error;

use logging::init_logging;

/// Exit status when the score gate fails.
const GATE_FAILED: u8 = 2;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("logging error: {0}")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "readyscore", version, about = "Data readiness scoring CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a CSV file and write the readiness report.
    Assess(AssessArgs),
    /// List registered rules.
    Rules(RulesArgs),
    /// Check a template file and print its issues.
    ValidateTemplate(ValidateTemplateArgs),
    /// Print the JSON Schema for template files.
    TemplateSchema,
}

#[derive(Args, Debug)]
struct AssessArgs {
    /// CSV file with a header row.
    #[arg(value_name = "CSV")]
    input: PathBuf,
    /// Assessment configuration (YAML, JSON or TOML).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Compliance template(s) to evaluate the report against.
    #[arg(long = "template", value_name = "PATH")]
    templates: Vec<PathBuf>,
    /// Output path for the JSON report (defaults to `<CSV>.readiness.json`).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Optional output path for a markdown summary.
    #[arg(long)]
    markdown: Option<PathBuf>,
    /// Fail with exit status 2 when the overall score is below this value.
    #[arg(long, value_name = "SCORE")]
    min_score: Option<f64>,
    /// Reference time for freshness rules.
    #[arg(long, value_name = "RFC3339")]
    as_of: Option<DateTime<Utc>>,
    /// Field delimiter.
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    /// Cell text marking a value as not applicable.
    #[arg(long = "na-marker", value_name = "TEXT")]
    na_markers: Vec<String>,
    /// Findings listed per dimension in the markdown summary.
    #[arg(long, default_value_t = DEFAULT_MAX_FINDINGS)]
    max_findings: usize,
    /// Append JSON log events to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RulesArgs {
    /// Only list rules of this dimension.
    #[arg(long)]
    dimension: Option<Dimension>,
}

#[derive(Args, Debug)]
struct ValidateTemplateArgs {
    /// Template file (YAML or JSON).
    path: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Assess(args) => run_assess(args),
        Command::Rules(args) => run_rules(args),
        Command::ValidateTemplate(args) => run_validate_template(args),
        Command::TemplateSchema => run_template_schema(),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(event = "run_failed", error = %err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_assess(args: AssessArgs) -> Result<ExitCode, CliError> {
    init_logging(args.log_file.as_deref())?;
    let timer = Instant::now();

    if let Some(min_score) = args.min_score
        && !(0.0..=100.0).contains(&min_score)
    {
        return Err(CliError::InvalidArgs(format!(
            "--min-score must be between 0 and 100, got {min_score}"
        )));
    }
    let options = csv_options(args.delimiter, &args.na_markers)?;

    tracing::info!(event = "run_started", input = %args.input.display());

    let table = Table::from_csv_path(&args.input, &options)?;
    tracing::info!(
        event = "dataset_loaded",
        rows = table.row_count(),
        columns = table.column_count()
    );

    let mut config = match &args.config {
        Some(path) => AssessmentConfig::from_path(path)?,
        None => AssessmentConfig::default(),
    };
    if let Some(as_of) = args.as_of {
        config = config.with_as_of(as_of);
    }
    let templates = args
        .templates
        .iter()
        .map(|path| load_template_path(path).map(|validated| validated.template))
        .collect::<Result<Vec<Template>, TemplateError>>()?;

    let engine = AssessmentEngine::with_builtin_rules()?;
    let report = engine.assess_with_templates(&table, &config, &templates)?;

    for line in summary_lines(&report) {
        println!("{line}");
    }

    let out = args
        .out
        .clone()
        .unwrap_or_else(|| default_report_path(&args.input));
    report.write_json(&out)?;
    tracing::info!(event = "report_written", path = %out.display());

    if let Some(path) = &args.markdown {
        std::fs::write(path, render_markdown(&report, args.max_findings))?;
        tracing::info!(event = "markdown_written", path = %path.display());
    }

    let gate = ScoreGate {
        min_overall: args.min_score,
        ..ScoreGate::default()
    };
    let outcome = gate.check(&report);
    let duration_ms = timer.elapsed().as_millis();
    if !outcome.passed {
        for failure in &outcome.failures {
            eprintln!(
                "gate failed: {} score {:.2} is below {}",
                failure.target, failure.actual, failure.required
            );
        }
        tracing::info!(event = "run_finished", status = "gate_failed", duration_ms = duration_ms);
        return Ok(ExitCode::from(GATE_FAILED));
    }

    tracing::info!(event = "run_finished", status = "success", duration_ms = duration_ms);
    Ok(ExitCode::SUCCESS)
}

fn run_rules(args: RulesArgs) -> Result<ExitCode, CliError> {
    let registry = RuleRegistry::global()?;
    for descriptor in registry.descriptors() {
        if args
            .dimension
            .is_some_and(|dimension| dimension != descriptor.dimension)
        {
            continue;
        }
        let params: Vec<&str> = descriptor.params.iter().map(|spec| spec.key).collect();
        println!(
            "{}\tweight={}\tparams=[{}]\t{}",
            descriptor.id,
            descriptor.default_weight,
            params.join(", "),
            descriptor.description
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run_validate_template(args: ValidateTemplateArgs) -> Result<ExitCode, CliError> {
    match load_template_path(&args.path) {
        Ok(validated) => {
            for warning in &validated.warnings {
                println!("warning: {warning}");
            }
            println!(
                "template '{}' v{} is valid",
                validated.template.template.id, validated.template.template.version
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(TemplateError::Validation(report)) => {
            for issue in report.errors.iter() {
                println!("error: {issue}");
            }
            for issue in report.warnings.iter() {
                println!("warning: {issue}");
            }
            println!("{} is invalid: {report}", args.path.display());
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}

fn run_template_schema() -> Result<ExitCode, CliError> {
    println!("{}", serde_json::to_string_pretty(&template_json_schema())?);
    Ok(ExitCode::SUCCESS)
}

fn csv_options(delimiter: char, na_markers: &[String]) -> Result<CsvOptions, CliError> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            CliError::InvalidArgs(format!("delimiter must be a single ASCII character, got '{delimiter}'"))
        })?;
    Ok(CsvOptions {
        delimiter,
        not_applicable_markers: na_markers.to_vec(),
        ..CsvOptions::default()
    })
}

fn default_report_path(input: &Path) -> PathBuf {
    input.with_extension("readiness.json")
}

fn summary_lines(report: &AssessmentReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: overall {:.2}/100 ({})",
        report.source().name,
        report.overall_score(),
        report.readiness_level()
    )];
    for (dimension, result) in report.dimension_results() {
        lines.push(format!(
            "  {:<13} {:>5.2}/{}  {} finding(s)",
            dimension.as_str(),
            result.score,
            result.max_score,
            result.findings.len()
        ));
    }
    for evaluation in report.template_evaluations() {
        let status = if evaluation.compliant {
            "compliant".to_string()
        } else {
            format!("not compliant, {} gap(s)", evaluation.gaps.len())
        };
        lines.push(format!(
            "template {} v{}: {} ({:.2}% of requirements met)",
            evaluation.template_id,
            evaluation.template_version,
            status,
            evaluation.compliance_score
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use clap::CommandFactory;
    use readyscore_eval::{DimensionResult, SourceInfo};

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_template_and_marker_flags() {
        let cli = Cli::try_parse_from([
            "readyscore",
            "assess",
            "data.csv",
            "--template",
            "a.yaml",
            "--template",
            "b.yaml",
            "--na-marker",
            "n/a",
            "--min-score",
            "70",
            "--as-of",
            "2024-06-15T00:00:00Z",
            "--delimiter",
            ";",
        ])
        .expect("parse");
        let Command::Assess(args) = cli.command else {
            panic!("expected assess");
        };
        assert_eq!(args.templates.len(), 2);
        assert_eq!(args.na_markers, vec!["n/a"]);
        assert_eq!(args.min_score, Some(70.0));
        assert_eq!(args.delimiter, ';');
        assert!(args.as_of.is_some());
    }

    #[test]
    fn rules_accepts_dimension_names() {
        let cli = Cli::try_parse_from(["readyscore", "rules", "--dimension", "freshness"])
            .expect("parse");
        let Command::Rules(args) = cli.command else {
            panic!("expected rules");
        };
        assert_eq!(args.dimension, Some(Dimension::Freshness));
        assert!(Cli::try_parse_from(["readyscore", "rules", "--dimension", "accuracy"]).is_err());
    }

    #[test]
    fn csv_options_reject_non_ascii_delimiters() {
        let options = csv_options('\t', &["-".to_string()]).expect("options");
        assert_eq!(options.delimiter, b'\t');
        assert_eq!(options.not_applicable_markers, vec!["-"]);
        assert!(!options.null_markers.is_empty());
        assert!(matches!(
            csv_options('é', &[]),
            Err(CliError::InvalidArgs(_))
        ));
    }

    #[test]
    fn default_report_path_sits_next_to_input() {
        assert_eq!(
            default_report_path(Path::new("data/customers.csv")),
            PathBuf::from("data/customers.readiness.json")
        );
    }

    #[test]
    fn summary_has_one_line_per_dimension() {
        let report = AssessmentReport::new(
            SourceInfo {
                name: "orders".to_string(),
                source_type: "csv".to_string(),
                record_count: 2,
                column_count: 1,
                columns: vec!["id".to_string()],
            },
            Utc::now(),
            Utc::now().naive_utc(),
            Dimension::ALL
                .iter()
                .map(|dimension| DimensionResult::with_score(*dimension, 10.0))
                .collect(),
            BTreeMap::new(),
        );
        let lines = summary_lines(&report);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "orders: overall 50.00/100 (Basic)");
        assert!(lines[1].starts_with("  validity"));
    }
}
