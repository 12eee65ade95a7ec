//! Purpose: `lv2-state-test` CLI entry point for bundling and probing the plugins.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit one JSON document on stdout.
//! Invariants: Errors are emitted as JSON on stderr (plain text on a terminal).
//! Invariants: Process exit code is derived from `to_exit_code`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};

use lv2_state_test::bundle::{default_binary_name, write_bundle};
use lv2_state_test::core::error::{Error, ErrorKind, to_exit_code};
use lv2_state_test::core::log::init_tracing;
use lv2_state_test::core::variant::Variant;
use lv2_state_test::host::{HostOptions, LifecycleReport, SimulatedHost, run_lifecycle};

#[derive(Parser)]
#[command(
    name = "lv2-state-test",
    version,
    about = "Probe how an LV2 host handles state makePath, freePath and mapPath",
    long_about = None,
    after_help = r#"EXAMPLES
  $ lv2-state-test bundle ~/.lv2/lv2-state-test.lv2 --copy-binary target/release/liblv2_state_test.so
  $ lv2-state-test probe --variant full
  $ lv2-state-test probe --no-mkdir --state-dir /tmp/state-test"#
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write manifest.ttl and the plugin description into an LV2 bundle directory.
    Bundle(BundleArgs),
    /// Run the plugins through a full lifecycle against an in-process host.
    Probe(ProbeArgs),
}

#[derive(Args)]
struct BundleArgs {
    #[arg(help = "Bundle directory (usually ending in .lv2)", value_hint = ValueHint::DirPath)]
    dir: PathBuf,
    #[arg(long, help = "Shared library file name referenced by manifest.ttl")]
    binary: Option<String>,
    #[arg(
        long,
        help = "Copy this built shared library into the bundle",
        value_hint = ValueHint::FilePath
    )]
    copy_binary: Option<PathBuf>,
}

#[derive(Args)]
struct ProbeArgs {
    #[arg(
        long,
        value_parser = parse_variant,
        help = "Variant to run: full|paths|save-only|flags-only (default: all)"
    )]
    variant: Option<Variant>,
    #[arg(
        long,
        help = "Host state directory (default: a fresh directory under the system temp dir)",
        value_hint = ValueHint::DirPath
    )]
    state_dir: Option<PathBuf>,
    #[arg(long, help = "Do not offer urid:map (instantiation should fail)")]
    no_urid_map: bool,
    #[arg(long, help = "Do not offer state:makePath")]
    no_make_path: bool,
    #[arg(long, help = "Do not offer state:freePath")]
    no_free_path: bool,
    #[arg(long, help = "Do not offer state:mapPath")]
    no_map_path: bool,
    #[arg(long, help = "Simulate a host whose makePath skips creating parent directories")]
    no_mkdir: bool,
}

fn parse_variant(input: &str) -> Result<Variant, String> {
    input.parse::<Variant>().map_err(|err| {
        err.message()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string())
    })
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                let message = err.to_string();
                let summary = message.lines().next().unwrap_or("invalid arguments");
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(summary.trim_start_matches("error: ").to_string()));
            }
        },
    };

    init_tracing();

    let value = match cli.command {
        Command::Bundle(args) => run_bundle(args)?,
        Command::Probe(args) => run_probe(args)?,
    };
    emit_json(&value)?;
    Ok(0)
}

fn run_bundle(args: BundleArgs) -> Result<Value, Error> {
    let binary = args
        .binary
        .unwrap_or_else(|| default_binary_name().to_string());
    let summary = write_bundle(&args.dir, &binary, args.copy_binary.as_deref())?;
    to_json(&summary).map(|summary| json!({ "bundle": summary }))
}

fn run_probe(args: ProbeArgs) -> Result<Value, Error> {
    let options = HostOptions {
        urid_map: !args.no_urid_map,
        make_path: !args.no_make_path,
        free_path: !args.no_free_path,
        map_path: !args.no_map_path,
        create_dirs: !args.no_mkdir,
    };
    let state_dir = args.state_dir.unwrap_or_else(|| {
        std::env::temp_dir().join(format!("lv2-state-test-{}", std::process::id()))
    });
    let variants = match args.variant {
        Some(variant) => vec![variant],
        None => Variant::ALL.to_vec(),
    };

    let mut runs = Vec::with_capacity(variants.len());
    for variant in variants {
        let host = SimulatedHost::new(state_dir.join(variant.name()), options)?;
        let report = run_lifecycle(&host, variant);
        runs.push(report_json(&report)?);
    }
    Ok(json!({ "probe": runs }))
}

fn report_json(report: &LifecycleReport) -> Result<Value, Error> {
    let mut value = to_json(report)?;
    if let Value::Object(map) = &mut value {
        if let Some(status) = report.save_status {
            map.insert("save".to_string(), json!(LifecycleReport::status_name(status)));
        }
        if let Some(status) = report.restore_status {
            map.insert(
                "restore".to_string(),
                json!(LifecycleReport::status_name(status)),
            );
        }
    }
    Ok(value)
}

fn to_json(value: &impl serde::Serialize) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode json")
            .with_source(err)
    })
}

fn emit_json(value: &Value) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode json")
            .with_source(err)
    })?;
    println!("{text}");
    Ok(())
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        for cause in error_causes(err) {
            eprintln!("  caused by: {cause}");
        }
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::MissingFeature => "missing host feature".to_string(),
        ErrorKind::PathRequest => "host path request failed".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Host => "host error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(feature) = err.feature() {
        inner.insert("feature".to_string(), json!(feature));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}
