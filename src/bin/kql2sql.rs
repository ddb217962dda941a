//! kql2sql: compile pipe queries to SQL from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Convert a query for the default dialect
//! kql2sql "StormEvents | where State == 'TEXAS' | take 10"
//!
//! # Postgres, reading the script from a file
//! kql2sql --dialect postgres --file report.kql
//!
//! # Show the parsed statements too
//! kql2sql explain "T | summarize count() by k"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use kql2sql::prelude::*;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kql2sql")]
#[command(version)]
#[command(about = "Compile pipe-oriented analytics queries to SQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    kql2sql 'StormEvents | summarize count() by State | top 5 by count_'
    kql2sql --dialect postgres --file report.kql
    echo 'T | take 3' | kql2sql --format json")]
struct Cli {
    /// The query to convert (read from --file or stdin when omitted)
    query: Option<String>,

    /// Read the query from a file
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Target SQL dialect (overrides the config file)
    #[arg(short, long, env = "KQL2SQL_DIALECT")]
    dialect: Option<Dialect>,

    /// Config file (default: ./kql2sql.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "sql")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Sql,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the parsed statements, then the generated SQL
    Explain {
        /// The query to explain
        query: Option<String>,
    },
    /// List the scalar and aggregate functions the dialect translates
    Functions,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "kql2sql=debug" } else { "kql2sql=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let dialect = cli.dialect.unwrap_or(config.dialect);
    let transpiler = Transpiler::new(dialect).with_catalog(config.tables.clone());
    tracing::debug!(%dialect, tables = config.tables.len(), "configured");

    match &cli.command {
        Some(Commands::Functions) => {
            show_functions(&transpiler);
            Ok(())
        }
        Some(Commands::Explain { query }) => {
            let query = read_query(query.as_deref(), cli.file.as_ref())?;
            explain(&transpiler, &query)
        }
        None => {
            let query = read_query(cli.query.as_deref(), cli.file.as_ref())?;
            if cli.verbose {
                eprintln!("{} {}", "Input:".dimmed(), query.trim().yellow());
            }
            let sql = transpiler.convert(&query)?;
            print_sql(&sql, dialect, cli.format)
        }
    }
}

/// Argument, then `--file`, then stdin (unless it's a terminal).
fn read_query(arg: Option<&str>, file: Option<&PathBuf>) -> Result<String> {
    if let Some(query) = arg {
        return Ok(query.to_string());
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()));
    }
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        anyhow::bail!("No query given. Pass it as an argument, with --file, or on stdin");
    }
    let mut query = String::new();
    stdin.lock().read_to_string(&mut query)?;
    Ok(query)
}

fn print_sql(sql: &str, dialect: Dialect, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Sql => println!("{}", sql),
        OutputFormat::Json => {
            let out = serde_json::json!({ "dialect": dialect, "sql": sql });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

fn explain(transpiler: &Transpiler, query: &str) -> Result<()> {
    println!("{}", "Query Explanation".cyan().bold());
    println!();

    let statements = kql2sql::parse(query)?;
    println!("{}", "Parsed Statements:".green().bold());
    for statement in &statements {
        match statement {
            Statement::Let { name, value } => {
                let kind = match value {
                    LetValue::Tabular(_) => "tabular",
                    LetValue::Scalar(_) => "scalar",
                };
                println!("  {} {} ({})", "let".dimmed(), name.white(), kind.dimmed());
            }
            Statement::Query(pipeline) => {
                println!("  {} {:?}", "source".dimmed(), pipeline.source);
                for op in &pipeline.operators {
                    println!("    | {}", op.to_string().cyan());
                }
            }
            Statement::Command(command) => {
                println!("  {} {}", "command".dimmed(), command.keyword().cyan());
            }
        }
    }

    println!();
    println!(
        "{} {}",
        "Generated SQL".green().bold(),
        format!("({})", transpiler.dialect().name()).dimmed()
    );
    println!("  {}", transpiler.convert_statements(&statements)?.white());
    Ok(())
}

fn show_functions(transpiler: &Transpiler) {
    let dialect = transpiler.dialect();
    println!(
        "{} {}",
        "Functions for".cyan().bold(),
        dialect.name().yellow().bold()
    );
    println!();

    let sections = [
        ("Scalar", transpiler.function_names()),
        ("Aggregate", dialect.aggregate_names()),
    ];
    for (title, names) in sections {
        println!("{} ({})", title.white().bold(), names.len());
        println!("{}", "─".repeat(60).dimmed());
        for chunk in names.chunks(4) {
            let row: Vec<String> = chunk.iter().map(|n| format!("{:20}", n)).collect();
            println!("  {}", row.join("").trim_end());
        }
        println!();
    }
}
