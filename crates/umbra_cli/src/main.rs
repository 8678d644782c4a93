//! UMBRA CLI
//!
//! Run and check sandboxed programs from the command line.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use console::style;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use umbra_interp::{Boundary, ExecutionReport, InterpreterConfig, Outcome, Program, Value};

#[derive(Parser)]
#[command(name = "umbra")]
#[command(about = "UMBRA - deterministic sandbox with an opaque host fault bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program through the boundary
    Run {
        /// Path to program file (JSON)
        #[arg(short, long)]
        program: PathBuf,
        /// Entry method
        #[arg(short, long, default_value = "main")]
        entry: String,
        /// Entry argument as a JSON value; bare words are taken as strings
        #[arg(short, long = "arg")]
        args: Vec<String>,
        /// Path to config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a program and its config
    Check {
        /// Path to program file (JSON)
        #[arg(short, long)]
        program: PathBuf,
        /// Path to config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("umbra=info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            program,
            entry,
            args,
            config,
            json,
        } => {
            let report = run(&program, &entry, &args, config.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if !report.success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Check { program, config } => {
            let boundary = check(&program, config.as_deref())?;
            println!(
                "{} {} methods, {} classes, cost budget {}",
                style("ok").green(),
                boundary.program().methods.len(),
                boundary.hierarchy().len(),
                boundary.config().max_cost
            );
            println!("host functions: {}", boundary.host_functions().join(", "));
            Ok(())
        }
    }
}

fn load_program(path: &Path) -> Result<Program> {
    let json = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    let program = Program::from_json(&json).wrap_err_with(|| format!("parsing {}", path.display()))?;
    tracing::debug!(path = %path.display(), methods = program.methods.len(), "program loaded");
    Ok(program)
}

fn load_config(path: Option<&Path>) -> Result<InterpreterConfig> {
    match path {
        Some(path) => InterpreterConfig::load(path).wrap_err("loading config"),
        None => Ok(InterpreterConfig::default()),
    }
}

fn parse_arg(raw: &str) -> Result<Value> {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Ok(Value::Str(raw.to_string()));
    };
    match parsed {
        serde_json::Value::Null => Ok(Value::Unit),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| eyre!("argument {} is not a 64-bit integer", raw)),
        serde_json::Value::String(s) => Ok(Value::Str(s)),
        _ => Err(eyre!("unsupported argument {}", raw)),
    }
}

fn check(program: &Path, config: Option<&Path>) -> Result<Boundary> {
    let program = load_program(program)?;
    let config = load_config(config)?;
    Boundary::new(program, config).wrap_err("invalid program")
}

fn run(program: &Path, entry: &str, args: &[String], config: Option<&Path>) -> Result<ExecutionReport> {
    let program = load_program(program)?;
    let config = load_config(config)?;
    let args = args.iter().map(|raw| parse_arg(raw)).collect::<Result<Vec<_>>>()?;
    let boundary = Boundary::new(program, config).wrap_err("invalid program")?;
    Ok(boundary.run(entry, args))
}

fn print_report(report: &ExecutionReport) {
    for line in &report.output {
        println!("{}", line);
    }
    match &report.outcome {
        Outcome::Returned { value } => println!("{} {}", style("returned").green(), value),
        Outcome::SandboxFault { throwable } => {
            println!("{} {}", style("uncaught").yellow(), throwable);
            for cause in throwable.chain().skip(1) {
                println!("  caused by {}", cause);
            }
        }
        Outcome::HostFault { message, .. } => println!("{} {}", style("host fault").red(), message),
        Outcome::Defect { message } => println!("{} {}", style("aborted").red().bold(), message),
        Outcome::Rejected { message } => println!("{} {}", style("rejected").red(), message),
    }
    println!("cost consumed: {}", report.cost_consumed);
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = r#"{
        "methods": {
            "main": {
                "params": 1,
                "locals": 1,
                "code": [
                    {"Load": 0},
                    {"HostCall": {"function": "parse_int", "argc": 1}},
                    "Return",
                    "Message",
                    "Return"
                ],
                "handlers": [
                    {"kind": "catch", "from": 0, "to": 3, "class": "NumberFormatException", "handler": 3}
                ]
            }
        }
    }"#;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "umbra", "run", "--program", "p.json", "--arg", "1", "--arg", "x", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                entry, args, json, ..
            } => {
                assert_eq!(entry, "main");
                assert_eq!(args, vec!["1", "x"]);
                assert!(json);
            }
            Commands::Check { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("12").unwrap(), Value::Int(12));
        assert_eq!(parse_arg("true").unwrap(), Value::Bool(true));
        assert_eq!(parse_arg("null").unwrap(), Value::Unit);
        assert_eq!(parse_arg("\"quoted\"").unwrap(), Value::from("quoted"));
        assert_eq!(parse_arg("bare").unwrap(), Value::from("bare"));
        assert!(parse_arg("1.5").is_err());
        assert!(parse_arg("[1]").is_err());
    }

    #[test]
    fn test_run_program_file() {
        let dir = tempfile::tempdir().unwrap();
        let program = write(&dir, "program.json", PROGRAM);

        let report = run(&program, "main", &["\"41\"".to_string()], None).unwrap();
        assert!(report.success());
        assert_eq!(report.outcome, Outcome::Returned { value: Value::Int(41) });

        let report = run(&program, "main", &["forty".to_string()], None).unwrap();
        assert_eq!(
            report.outcome,
            Outcome::Returned {
                value: Value::from("invalid digit found in string")
            }
        );
    }

    #[test]
    fn test_run_with_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let program = write(&dir, "program.json", PROGRAM);
        let config = write(&dir, "config.json", r#"{"max_cost": 50}"#);

        let report = run(&program, "main", &["7".to_string()], Some(&config)).unwrap();
        assert!(!report.success());
        assert!(matches!(report.outcome, Outcome::HostFault { .. }));
    }

    #[test]
    fn test_check_program_file() {
        let dir = tempfile::tempdir().unwrap();
        let program = write(&dir, "program.json", PROGRAM);
        let config = write(&dir, "config.json", r#"{"max_cost": 500}"#);

        let boundary = check(&program, Some(&config)).unwrap();
        assert_eq!(boundary.config().max_cost, 500);
        assert_eq!(boundary.host_functions(), vec!["log", "parse_int", "len"]);

        let zero = write(&dir, "zero.json", r#"{"max_call_depth": 0}"#);
        assert!(check(&program, Some(&zero)).is_err());
    }

    #[test]
    fn test_missing_program_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("nope.json"), "main", &[], None).is_err());
    }
}
