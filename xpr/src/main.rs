//! `xpr` — evaluate a single arithmetic/logical/string expression given on
//! the command line.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use xpr::{ExpError, Expression, Source};

/// Evaluate an arithmetic, logical, string, or bitwise expression.
#[derive(Parser)]
#[command(name = "xpr", about = "Evaluate an arithmetic/logical/string expression")]
struct Cli {
    /// The expression to evaluate.
    expression: String,

    /// Raise the default tracing filter level to `debug`.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    match run(&cli.expression) {
        Ok(()) => {}
        Err(()) => std::process::exit(1),
    }
}

fn install_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "off" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(source: &str) -> Result<(), ()> {
    let mut expr = Expression::compile(source).map_err(|err| report(source, &err))?;
    let value = expr.solve().map_err(|err| report(source, &err))?;
    println!("{value}");
    Ok(())
}

/// Compiler-diagnostic-style error report: the source line, a caret under
/// the offending column, then the error message.
fn report(source: &str, err: &ExpError) {
    if let Some(position) = err.position {
        let reporter = Source::new(source);
        let (line, column) = reporter.line_and_column(position);
        eprintln!("{line}");
        eprintln!("{}^", " ".repeat(column));
    }
    eprintln!("{err}");
}
