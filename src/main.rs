//! The quarry CLI: run a SQL statement against the engine and print the
//! result as a table, optionally with the query statistics.

use std::io::Write;

use anyhow::Context;
use clap::Parser;

use quarry::display::render_table;
use quarry::{Config, Session};

#[derive(Parser, Debug)]
#[command(name = "quarry", version, about = "Run SQL against the quarry engine")]
struct Args {
    /// Write the rendered output to a file instead of stdout
    #[arg(long = "o")]
    output: Option<std::path::PathBuf>,

    /// Colorize the output (the default)
    #[arg(long = "color")]
    color: bool,

    /// Disable colorized output
    #[arg(long = "no-color", conflicts_with = "color")]
    no_color: bool,

    /// Print query statistics after the result
    #[arg(long = "stats")]
    stats: bool,

    /// Suppress query statistics
    #[arg(long = "no-stats", conflicts_with = "stats")]
    no_stats: bool,

    /// Run the query N times, reporting the total wall time
    #[arg(long = "cycles", default_value_t = 1)]
    cycles: usize,

    /// Total table width in characters
    #[arg(long = "table_width", default_value_t = 120)]
    table_width: usize,

    /// Maximum rendered width of any single column
    #[arg(long = "max_col_width", default_value_t = 32)]
    max_col_width: usize,

    /// The SQL statement to run
    sql: Vec<String>,
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let sql = args.sql.join(" ");
    if sql.trim().is_empty() {
        anyhow::bail!("no SQL statement provided");
    }
    if args.cycles == 0 {
        anyhow::bail!("--cycles must be at least 1");
    }

    let config = Config::load().context("loading configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let color = (args.color || !args.no_color) && args.output.is_none();
    let mut session = Session::new(config);

    let started = std::time::Instant::now();
    let mut result = session.execute(&sql).context("running query")?;
    for _ in 1..args.cycles {
        result = session.execute(&sql).context("running query")?;
    }
    let elapsed = started.elapsed();

    let mut output = render_table(&result, args.table_width, args.max_col_width, color);

    if args.stats && !args.no_stats {
        output.push('\n');
        for (name, value) in result.statistics().as_map() {
            output.push_str(&format!("{name:<48} {value}\n"));
        }
        if args.cycles > 1 {
            output.push_str(&format!(
                "{:<48} {}\n",
                "cycles",
                args.cycles
            ));
            output.push_str(&format!(
                "{:<48} {:.6}\n",
                "wall_time_seconds",
                elapsed.as_secs_f64()
            ));
        }
    }

    match &args.output {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            file.write_all(output.as_bytes())
                .with_context(|| format!("writing {}", path.display()))?;
        }
        None => print!("{output}"),
    }
    Ok(())
}
