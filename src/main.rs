/// Version injected at compile time via CLOUDINV_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDINV_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use cloudinv::config::Config;
use cloudinv::connector::gcp::{GcpConnector, GcpSettings};
use cloudinv::normalize::{display_value, Row};
use cloudinv::{FetchError, QueryContext};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Multi-account cloud inventory
#[derive(Parser, Debug)]
#[command(name = "cloudinv", version, about, long_about = None)]
struct Args {
    /// Config file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List queryable resource type names
    Types,
    /// Fetch one resource type across all configured accounts
    Fetch {
        /// Queryable name, e.g. GcpComputeInstance
        name: String,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Columns or paths to show, e.g. name,attributes['env']
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Only rows carrying this attribute
        #[arg(long)]
        has_attribute: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
    Table,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = level.as_filter()?;
    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Could not open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudinv {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudinv").join("cloudinv.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudinv").join("cloudinv.log");
    }
    PathBuf::from("cloudinv.log")
}

/// Projected row: every column, or the requested paths in order
fn project(row: &Row, columns: &[String]) -> Result<Map<String, Value>> {
    if columns.is_empty() {
        return Ok(row.columns().map(|(k, v)| (k.to_string(), v.clone())).collect());
    }
    columns
        .iter()
        .map(|column| {
            let value = row.select(column)?.cloned().unwrap_or(Value::Null);
            Ok::<_, anyhow::Error>((column.clone(), value))
        })
        .collect()
}

fn render_table(rows: &[Map<String, Value>]) -> String {
    let Some(first) = rows.first() else {
        return "(no rows)\n".to_string();
    };
    let headers: Vec<&String> = first.keys().collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| headers.iter().map(|h| display_value(row.get(h.as_str()))).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = line(headers.iter().map(|h| h.as_str()).collect());
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Types => {
            let connector = GcpConnector::rest(&GcpSettings::default())?;
            let context = QueryContext::builder()
                .register_schema_provider(&connector)
                .build()?;
            for name in context.queryable_names() {
                println!("{}", name);
            }
        }
        Command::Fetch {
            name,
            format,
            columns,
            has_attribute,
        } => {
            let config = Config::load(args.config.as_deref())?;
            let accounts = config.build_registry().await?;
            let connector = GcpConnector::rest(&config.gcp)?;
            let context = QueryContext::builder()
                .accounts(accounts)
                .settings(config.settings())
                .register_schema_provider(&connector)
                .build()?;

            let session = context.create_session();
            let collection = session.fetch(&name).await?;
            let rows: Vec<&Row> = match &has_attribute {
                Some(key) => collection.rows_with_attribute(key),
                None => collection.rows().iter().collect(),
            };
            let projected = rows
                .into_iter()
                .map(|row| project(row, &columns))
                .collect::<Result<Vec<_>>>()?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&projected)?),
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&projected)?),
                OutputFormat::Table => print!("{}", render_table(&projected)),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level);

    let result = run(args).await;
    if let Err(err) = &result {
        if let Some(fetch) = err.downcast_ref::<FetchError>() {
            tracing::error!("{}", fetch);
            eprintln!("{}", fetch.hint());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Map<String, Value>> {
        vec![
            json!({"name": "web-1", "labels": {"env": "prod"}, "tags": ["a", "b"], "cpu": 2})
                .as_object()
                .unwrap()
                .clone(),
            json!({"name": "db", "labels": null, "tags": [], "cpu": 16})
                .as_object()
                .unwrap()
                .clone(),
        ]
    }

    #[test]
    fn test_render_table_display_rules() {
        let table = render_table(&rows());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("cpu"));
        assert!(lines[1].contains("[object]"));
        assert!(lines[1].contains("[2 items]"));
        assert!(lines[2].contains("-"));
        assert!(lines[2].contains("[0 items]"));
    }

    #[test]
    fn test_render_empty_table() {
        assert_eq!(render_table(&[]), "(no rows)\n");
    }

    #[test]
    fn test_args_parse_fetch() {
        let args = Args::parse_from([
            "cloudinv",
            "--log-level",
            "debug",
            "fetch",
            "GcpComputeInstance",
            "--format",
            "table",
            "--columns",
            "name,attributes['env']",
        ]);
        match args.command {
            Command::Fetch { name, columns, .. } => {
                assert_eq!(name, "GcpComputeInstance");
                assert_eq!(columns, vec!["name", "attributes['env']"]);
            }
            Command::Types => panic!("expected fetch"),
        }
    }
}
