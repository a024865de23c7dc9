use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};

use icmptrace::cli::Args;
use icmptrace::config::{Config, ProbeMode};
use icmptrace::export::{TextReporter, export_json, generate_report};
use icmptrace::logging;
use icmptrace::prefs::Prefs;
use icmptrace::probe::check_permissions;
use icmptrace::trace::ProbeEngine;

fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    logging::init(args.verbose);

    // Check permissions early
    if let Err(e) = check_permissions() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let prefs = Prefs::load();
    let config = Config::from_args(&args, &prefs);
    let mode = args.mode();
    log::debug!("running {:?} with {:?}", mode, config);

    let mut engine = ProbeEngine::new(config);

    if args.json {
        let session = engine
            .run(mode, &args.target, &mut ())
            .with_context(|| format!("Failed to probe target: {}", args.target))?;
        export_json(&session, io::stdout().lock())?;
        return Ok(());
    }

    let mut reporter = TextReporter::new(io::stdout().lock());
    let session = engine
        .run(mode, &args.target, &mut reporter)
        .with_context(|| format!("Failed to probe target: {}", args.target))?;
    let mut stdout = reporter.into_inner();

    if mode == ProbeMode::Trace {
        writeln!(stdout)?;
        generate_report(&session, &mut stdout)?;
    }
    stdout.flush()?;

    Ok(())
}
