//! qmap: inspect type maps and run mapped queries.
//!
//! # Usage
//!
//! ```bash
//! # List the configured type maps
//! qmap maps --config maps.toml
//!
//! # Show the projection used for a pair
//! qmap projection Employee EmployeeDto --expand Manager.Name
//!
//! # Validate every member path against the declared schemas
//! qmap check
//!
//! # Run the built-in employee walkthrough
//! qmap demo --format json
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use qmap::config::Settings;
use qmap::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qmap")]
#[command(version = "0.1.0")]
#[command(about = "Query against one shape, execute against another", long_about = None)]
#[command(after_help = "EXAMPLES:
    qmap maps --config maps.toml
    qmap projection Employee EmployeeDto
    qmap demo --format json")]
struct Cli {
    /// Mapping configuration file (TOML)
    #[arg(short, long, env = "QMAP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Settings file (defaults to <config dir>/qmap/settings.toml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured type maps
    Maps,
    /// Print the projection for a source/destination pair
    Projection {
        source: String,
        destination: String,
        /// Member paths to expand eagerly (dotted, repeatable)
        #[arg(short, long)]
        expand: Vec<String>,
    },
    /// Validate the configuration
    Check,
    /// Run the employee walkthrough against in-memory data
    Demo {
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

fn main() {
    let cli = Cli::parse();

    let settings_path = cli.settings.clone().or_else(Settings::default_path);
    let settings = match Settings::load_or_default(settings_path.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    init_tracing(&settings, cli.verbose);

    if let Err(e) = run(&cli, &settings) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(settings: &Settings, verbose: bool) {
    let mut filter = EnvFilter::try_from_env("QMAP_LOG")
        .or_else(|_| EnvFilter::try_new(settings.log.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose {
        if let Ok(directive) = "qmap=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    match &cli.command {
        Commands::Maps => show_maps(&load_config(cli, settings)?),
        Commands::Projection {
            source,
            destination,
            expand,
        } => show_projection(&load_config(cli, settings)?, source, destination, expand),
        Commands::Check => check(&load_config(cli, settings)?),
        Commands::Demo { format } => run_demo(*format),
    }
}

/// Explicit flag, then settings, then the default location, then the demo config.
fn load_config(cli: &Cli, settings: &Settings) -> Result<MapperConfig> {
    let path = cli.config.clone().or_else(|| settings.config_path());
    match path {
        Some(p) if p.exists() => {
            if cli.verbose {
                println!("{} {}", "Config:".dimmed(), p.display().to_string().yellow());
            }
            MapperConfig::load(&p).with_context(|| format!("loading {}", p.display()))
        }
        Some(p) if cli.config.is_some() => bail!("config file {} not found", p.display()),
        _ => {
            println!("{}", "No mapping file found; using the built-in employee maps.".dimmed());
            Ok(demo_config())
        }
    }
}

fn show_maps(config: &MapperConfig) -> Result<()> {
    if config.maps().is_empty() {
        println!("{}", "(no type maps)".dimmed());
        return Ok(());
    }
    for map in config.maps() {
        println!(
            "{} {} {}",
            map.source.cyan().bold(),
            "→".dimmed(),
            map.destination.green().bold()
        );
        for (member, _) in config.destination_members(map) {
            let source = match config.resolve_member(map, &member) {
                Some(m) => {
                    let text = match &m.source {
                        MemberSource::Path(p) => p.to_string(),
                        MemberSource::Expr { lambda, precompute } => {
                            if *precompute {
                                format!("{} (precomputed)", lambda)
                            } else {
                                lambda.to_string()
                            }
                        }
                        MemberSource::Parameter { name, default } => {
                            format!("${} (default {})", name, default)
                        }
                        MemberSource::Ignore => "(ignored)".to_string(),
                    };
                    if m.explicit_expansion {
                        format!("{} [explicit]", text)
                    } else {
                        text
                    }
                }
                None => "(unmapped)".red().to_string(),
            };
            println!("    {:16} {} {}", member.white(), "←".dimmed(), source.yellow());
        }
    }
    Ok(())
}

fn show_projection(
    config: &MapperConfig,
    source: &str,
    destination: &str,
    expand: &[String],
) -> Result<()> {
    let paths = expand
        .iter()
        .map(|p| MemberPath::parse(p))
        .collect::<MapResult<Vec<_>>>()?;
    let builder = ConfigProjectionBuilder::new(Arc::new(config.clone()));
    let descriptor = builder.get_projection(
        &Type::entity(source),
        &Type::entity(destination),
        &Parameters::new(),
        &paths,
    )?;

    println!("{}", "Projection".green().bold());
    match &descriptor.precomputation {
        Some(pre) => println!("  {} {}", "Precompute:".dimmed(), pre.to_string().white()),
        None => println!("  {} {}", "Precompute:".dimmed(), "(none)".dimmed()),
    }
    match &descriptor.final_shape {
        Some(shape) => println!("  {} {}", "Shape:".dimmed(), shape.to_string().white()),
        None => println!("  {} {}", "Shape:".dimmed(), "(identity)".dimmed()),
    }
    Ok(())
}

fn check(config: &MapperConfig) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        println!("{} {} type map(s) valid", "✓".green(), config.maps().len());
        return Ok(());
    }
    for e in &errors {
        println!("{} {}", "✗".red(), e);
    }
    bail!("{} problem(s) found", errors.len())
}

fn demo_config() -> MapperConfig {
    MapperConfig::new()
        .entity(
            "Employee",
            [("Id", Type::int()), ("FullName", Type::string()), ("Age", Type::int())],
        )
        .entity(
            "EmployeeDto",
            [("Id", Type::int()), ("Name", Type::string()), ("Age", Type::int())],
        )
        .map(TypeMap::new("Employee", "EmployeeDto").map_member("Name", MemberSource::member("FullName")))
}

fn demo_data() -> InMemoryProvider {
    let employee = |id: i64, name: &str, age: i64| {
        Value::record(
            "Employee",
            [("Id", Value::Int(id)), ("FullName", name.into()), ("Age", Value::Int(age))],
        )
    };
    InMemoryProvider::new().collection(
        "Employee",
        vec![employee(1, "Ann", 30), employee(2, "Bo", 17), employee(3, "Cy", 22)],
    )
}

fn run_demo(format: OutputFormat) -> Result<()> {
    let employee = Type::entity("Employee");
    let dto = Type::entity("EmployeeDto");
    let config = Arc::new(demo_config());
    let source = Queryable::root(employee.clone(), Arc::new(demo_data()));

    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);
    let build = |threshold: Option<i64>| {
        let seen = Arc::clone(&seen);
        let mut builder = MappingProvider::builder(Arc::clone(&config), source.clone(), dto.clone())
            .exception_handler(Arc::new(move |_: &MapError| {
                seen.fetch_add(1, Ordering::SeqCst);
            }));
        if let Some(t) = threshold {
            builder = builder.parameter("threshold", t);
        }
        builder.build_shared()
    };

    let adult = Lambda::with("d", dto.clone(), |d| {
        d.member("Age", Type::int()).gt(Expr::constant(18))
    });
    let over_threshold = Lambda::with("d", dto.clone(), |d| {
        d.member("Age", Type::int())
            .gt(Expr::captured("DemoClosure", "threshold", 18))
    });

    let provider = build(None);
    let adults = provider.query().then(|q| q.filter(adult.clone())).to_list()?;
    print_step(format, "Where(Age > 18) as EmployeeDto list", &Value::List(adults));

    let any = provider.query().execute(|q| q.any_where(adult.clone()))?;
    print_step(format, "Any(Age > 18)", &any);

    let overridden = build(Some(25))
        .query()
        .then(|q| q.filter(over_threshold.clone()))
        .to_list()?;
    print_step(
        format,
        "Where(Age > threshold) with threshold = 25",
        &Value::List(overridden),
    );

    let names = provider
        .query()
        .then(|q| q.select(Lambda::with("d", dto.clone(), |d| d.member("Name", Type::string()))))
        .to_list()?;
    print_step(format, "Select(Name) passthrough", &Value::List(names));

    let unsupported = provider.query().then(|q| {
        q.filter(Lambda::with("d", dto.clone(), |d| {
            Expr::invoke("soundex", vec![d.member("Name", Type::string())], Type::bool())
        }))
    });
    match unsupported.to_list() {
        Ok(_) => bail!("expected the in-memory engine to reject soundex()"),
        Err(e) => {
            let text = format!("{} (handler saw {} failure(s))", e, failures.load(Ordering::SeqCst));
            print_step(format, "Unsupported function", &Value::String(text));
        }
    }
    Ok(())
}

fn print_step(format: OutputFormat, title: &str, value: &Value) {
    match format {
        OutputFormat::Json => {
            let doc = serde_json::json!({ "step": title, "result": value });
            println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
        }
        OutputFormat::Table => {
            println!("{}", title.cyan().bold());
            match value {
                Value::List(rows) if rows.iter().all(|r| matches!(r, Value::Record { .. })) => {
                    print_table(rows)
                }
                other => println!("  {}", other.to_string().white()),
            }
            println!();
        }
    }
}

fn print_table(rows: &[Value]) {
    let Some(Value::Record { fields, .. }) = rows.first() else {
        println!("{}", "(no results)".dimmed());
        return;
    };
    let columns: Vec<&String> = fields.keys().collect();
    let cell = |row: &Value, col: &str| row.field(col).map(|v| v.to_string()).unwrap_or_default();

    let widths: Vec<usize> = columns
        .iter()
        .map(|c| rows.iter().map(|r| cell(r, c).len()).max().unwrap_or(0).max(c.len()))
        .collect();

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:width$}", c, width = w))
        .collect();
    println!("  {}", header.join(" │ ").white().bold());
    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("  {}", sep.join("─┼─").dimmed());
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:width$}", cell(row, c), width = w))
            .collect();
        println!("  {}", cells.join(" │ "));
    }
    println!("  {} row(s)", rows.len().to_string().cyan());
}
