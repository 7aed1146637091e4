//! Consistency Probe - write-then-poll visibility measurements
//!
//! The main entry point for cp-core, handling:
//! - One-shot probe runs against the simulated datastore
//! - The HTTP surface (`serve`)
//! - Configuration inspection and validation

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cp_common::error::format_error_human;
use cp_common::{OutputFormat, ReadStrategy, RunPrefix, SCHEMA_VERSION};
use cp_config::{
    load_config, load_probe_config_from_file, validate_config, ConfigError, ConfigOptions,
    ProbeConfig, ResolvedConfig, VisibilityMode,
};
use cp_core::exit_codes::ExitCode;
use cp_core::log_event;
use cp_core::logging::{
    event_names, generate_run_id, get_host_id, init_logging, LogConfig, LogContext, LogFormat,
    LogLevel, Stage,
};
use cp_core::probe::{ProbeOptions, ProbeRunner, TracingProbeLog};
use cp_core::report;
use cp_core::server::ProbeServer;
use cp_core::store::MemoryStore;

/// Consistency Probe - measure how long writes take to become visible
#[derive(Parser)]
#[command(name = "cp-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Directory searched for probe.json
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Explicit config file (overrides every other source)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Report format
    #[arg(long, short = 'f', global = true, value_enum, default_value_t = OutputFormat::Html)]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one probe against a fresh simulated datastore
    Probe(ProbeArgs),

    /// Serve probe, count, and stat routes over HTTP
    Serve(ServeArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// How each trial reads its record back
    #[arg(long, short = 's', value_enum)]
    strategy: ReadStrategy,

    /// Number of trials
    #[arg(long)]
    trials: Option<u32>,

    /// Sleep between read attempts, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Attempt ceiling per trial
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Entity kind written and queried
    #[arg(long)]
    kind: Option<String>,

    /// Visibility model of the simulated store
    #[arg(long, value_enum)]
    visibility: Option<VisibilityArg>,

    /// Reads before a record becomes visible (after-reads)
    #[arg(long)]
    lag_reads: Option<u32>,

    /// Replication lag in milliseconds (after-millis)
    #[arg(long)]
    lag_ms: Option<u64>,

    /// Let ancestor queries lag like every other read
    #[arg(long)]
    eventual_ancestors: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VisibilityArg {
    Immediate,
    AfterReads,
    AfterMillis,
    Never,
}

impl From<VisibilityArg> for VisibilityMode {
    fn from(arg: VisibilityArg) -> Self {
        match arg {
            VisibilityArg::Immediate => VisibilityMode::Immediate,
            VisibilityArg::AfterReads => VisibilityMode::AfterReads,
            VisibilityArg::AfterMillis => VisibilityMode::AfterMillis,
            VisibilityArg::Never => VisibilityMode::Never,
        }
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved configuration and where it came from
    Show,

    /// Check a config file (or the resolved one) without running anything
    Validate {
        /// File to validate
        path: Option<PathBuf>,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            let _ = err.print();
            std::process::exit(code.as_i32());
        }
    };

    let log_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(log_level, cli.global.log_format));

    let ctx = LogContext::new(generate_run_id(), get_host_id());

    let exit_code = match cli.command {
        None => {
            print_version(&cli.global);
            ExitCode::Clean
        }
        Some(Commands::Probe(args)) => run_probe(&cli.global, &ctx, &args),
        Some(Commands::Serve(args)) => run_serve(&cli.global, &ctx, &args),
        Some(Commands::Config(args)) => run_config(&cli.global, &ctx, &args),
        Some(Commands::Version) => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_probe(global: &GlobalOpts, ctx: &LogContext, args: &ProbeArgs) -> ExitCode {
    let resolved = match load_resolved(global, ctx) {
        Ok(resolved) => resolved,
        Err(code) => return code,
    };
    let mut config = resolved.probe;
    apply_probe_overrides(&mut config, args);
    if let Err(err) = validate_config(&config) {
        return output_config_error(global, ctx, &ConfigError::ValidationError(err));
    }

    let store = MemoryStore::from_config(&config.store);
    let prefix = RunPrefix::now();
    let log = TracingProbeLog::new(ctx.clone().with_run_prefix(prefix.as_str()));
    let options = ProbeOptions::from_config(&config, args.strategy);
    tracing::debug!(
        visibility = %config.store.visibility.mode,
        worst_case_ms = options.worst_case_duration().as_millis() as u64,
        "probe configured"
    );

    let runner = ProbeRunner::new(&store, &log, options);
    match runner.run(prefix) {
        Ok(result) => {
            print!(
                "{}",
                report::render_probe(&result, runner.options(), global.format)
            );
            ExitCode::for_result(&result)
        }
        Err(err) => output_error(global, &err.into()),
    }
}

fn apply_probe_overrides(config: &mut ProbeConfig, args: &ProbeArgs) {
    if let Some(trials) = args.trials {
        config.trial_count = trials;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.attempt_delay_ms = delay_ms;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(kind) = &args.kind {
        config.kind = kind.clone();
    }

    let visibility = &mut config.store.visibility;
    if let Some(mode) = args.visibility {
        visibility.mode = mode.into();
    }
    if args.lag_reads.is_some() {
        visibility.reads = args.lag_reads;
    }
    if args.lag_ms.is_some() {
        visibility.millis = args.lag_ms;
    }
    if args.eventual_ancestors {
        config.store.ancestor_consistent = false;
    }
}

fn run_serve(global: &GlobalOpts, ctx: &LogContext, args: &ServeArgs) -> ExitCode {
    let resolved = match load_resolved(global, ctx) {
        Ok(resolved) => resolved,
        Err(code) => return code,
    };
    let mut config = resolved.probe;
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Err(err) = validate_config(&config) {
        return output_config_error(global, ctx, &ConfigError::ValidationError(err));
    }

    let store = Arc::new(MemoryStore::from_config(&config.store));
    match ProbeServer::start(store, config, ctx.clone()) {
        Ok(server) => {
            eprintln!("cp-core listening on http://{}", server.addr());
            server.wait();
            ExitCode::Clean
        }
        Err(err) => output_error(global, &err),
    }
}

fn run_config(global: &GlobalOpts, ctx: &LogContext, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Show => {
            let resolved = match load_resolved(global, ctx) {
                Ok(resolved) => resolved,
                Err(code) => return code,
            };
            print_config(global, &resolved);
            ExitCode::Clean
        }
        ConfigCommands::Validate { path } => {
            let checked = match path {
                Some(path) => load_probe_config_from_file(path).and_then(|(probe, _)| {
                    validate_config(&probe)?;
                    Ok(path.display().to_string())
                }),
                None => load_config(&config_options(global)).map(|resolved| {
                    resolved
                        .path
                        .map_or_else(|| "built-in defaults".to_string(), |p| p.display().to_string())
                }),
            };
            match checked {
                Ok(source) => {
                    match global.format {
                        OutputFormat::Json => println!(
                            "{}",
                            serde_json::json!({
                                "schema_version": SCHEMA_VERSION,
                                "status": "valid",
                                "source": source,
                            })
                        ),
                        _ => println!("config valid: {}", source),
                    }
                    ExitCode::Clean
                }
                Err(err) => output_config_error(global, ctx, &err),
            }
        }
    }
}

fn print_config(global: &GlobalOpts, resolved: &ResolvedConfig) {
    let snapshot = resolved.snapshot();
    match global.format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "provenance": snapshot,
                "config": resolved.probe,
            });
            match serde_json::to_string_pretty(&output) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("failed to serialize config: {}", e),
            }
        }
        _ => {
            let probe = &resolved.probe;
            println!("source: {}", snapshot.source);
            if let Some(path) = &snapshot.path {
                println!("path: {}", path.display());
            }
            if let Some(hash) = &snapshot.hash {
                println!("sha256: {}", hash);
            }
            println!("kind: {}", probe.kind);
            println!("trial_count: {}", probe.trial_count);
            println!("attempt_delay_ms: {}", probe.attempt_delay_ms);
            println!("max_attempts: {}", probe.max_attempts);
            println!("visibility: {}", probe.store.visibility.mode);
            println!("ancestor_consistent: {}", probe.store.ancestor_consistent);
            println!("server: {}:{}", probe.server.bind, probe.server.port);
        }
    }
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "cp_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });

    match global.format {
        OutputFormat::Json => println!("{}", version_info),
        _ => {
            println!("cp-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
}

// ============================================================================
// Config and error plumbing
// ============================================================================

fn config_options(global: &GlobalOpts) -> ConfigOptions {
    ConfigOptions {
        config_dir: global.config_dir.clone(),
        config_path: global.config.clone(),
    }
}

fn load_resolved(global: &GlobalOpts, ctx: &LogContext) -> Result<ResolvedConfig, ExitCode> {
    match load_config(&config_options(global)) {
        Ok(resolved) => {
            log_event!(
                ctx,
                INFO,
                event_names::CONFIG_LOADED,
                Stage::Init,
                format!("config loaded from {}", resolved.source)
            );
            Ok(resolved)
        }
        Err(err) => Err(output_config_error(global, ctx, &err)),
    }
}

fn output_config_error(global: &GlobalOpts, ctx: &LogContext, error: &ConfigError) -> ExitCode {
    log_event!(
        ctx,
        ERROR,
        event_names::CONFIG_ERROR,
        Stage::Init,
        error.to_string()
    );

    let err = match error {
        ConfigError::ValidationError(inner) => cp_common::Error::InvalidConfig(inner.to_string()),
        ConfigError::VersionMismatch { expected, actual } => cp_common::Error::SchemaVersion {
            expected: expected.clone(),
            actual: actual.clone(),
        },
        other => cp_common::Error::Config(other.to_string()),
    };
    output_error(global, &err)
}

/// Report a fatal error: the failure report on stdout, the human block on
/// stderr for non-JSON formats.
fn output_error(global: &GlobalOpts, err: &cp_common::Error) -> ExitCode {
    print!("{}", report::render_failure(err, global.format));
    if global.format != OutputFormat::Json {
        let use_color = !global.no_color && std::io::stderr().is_terminal();
        eprintln!("{}", format_error_human(err, use_color));
    }
    ExitCode::for_error(err)
}
