mod render;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::Parser;
use common::telemetry::init_stderr_logging;
use redenv_payload::{parse_gateway_time, TimestampReconciler};
use render::translate;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::debug;

/// Translate redenv node payloads into readable readings
#[derive(Parser, Debug)]
#[command(name = "redenv-tr", version, about)]
struct Cli {
    /// Payloads as hex (spaces allowed) or base64
    #[arg(required = true)]
    payloads: Vec<String>,

    /// IANA zone the node clocks are set in
    #[arg(short, long, default_value = "America/Los_Angeles")]
    timezone: String,

    /// Gateway receive time (RFC3339), shown the way the collector stores it
    #[arg(short, long)]
    received_at: Option<String>,

    /// Print one JSON object per payload
    #[arg(long)]
    json: bool,

    /// Log decoding steps to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    if let Err(e) = init_stderr_logging(level) {
        eprintln!("warning: {:#}", e);
    }

    let zone: Tz = match cli.timezone.parse() {
        Ok(zone) => zone,
        Err(e) => {
            eprintln!("invalid timezone '{}': {}", cli.timezone, e);
            return ExitCode::from(2);
        }
    };

    let received_at: Option<DateTime<Utc>> = match cli.received_at.as_deref() {
        None => None,
        Some(text) => match parse_gateway_time(text) {
            Ok(t) => Some(t),
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::from(2);
            }
        },
    };

    let reconciler = TimestampReconciler::new(zone);
    let failed = run(
        &cli,
        &reconciler,
        received_at,
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    );

    if failed > 0 {
        debug!(failed, total = cli.payloads.len(), "some payloads failed");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Translates every payload argument. Renderings go to `out` and per-payload
/// errors to `err`; one bad payload never stops the rest.
///
/// Returns how many payloads failed.
fn run(
    cli: &Cli,
    reconciler: &TimestampReconciler,
    received_at: Option<DateTime<Utc>>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> usize {
    let mut failed = 0usize;
    let mut rendered = 0usize;

    for (i, payload) in cli.payloads.iter().enumerate() {
        debug!(index = i, payload = %payload, "translating");
        let written = match translate(payload, reconciler, received_at) {
            Ok(t) if cli.json => serde_json::to_string(&t)
                .map_err(|e| e.to_string())
                .and_then(|line| writeln!(out, "{}", line).map_err(|e| e.to_string())),
            Ok(t) => {
                let separator = if rendered > 0 { "\n" } else { "" };
                writeln!(out, "{}{}", separator, t).map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match written {
            Ok(()) => rendered += 1,
            Err(e) => {
                // stderr is the last place to report anything
                let _ = writeln!(err, "{}: {}", payload, e);
                failed += 1;
            }
        }
    }

    failed
}
