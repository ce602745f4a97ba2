use anyhow::Result;
use clap::Parser;
use photobooth::{BoothConfig, BoothOrchestrator};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "photobooth")]
#[command(about = "Photo booth kiosk with live preview, countdown capture and printing")]
#[command(version)]
#[command(long_about = "A photo booth that streams a live camera preview through a GStreamer \
graph, takes a full-resolution still after a countdown, shows it for approval and sends \
accepted photos to the printer.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "photobooth.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the booth")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override the shutter countdown
    #[arg(long, value_name = "SECONDS", help = "Countdown length in seconds (0-60)")]
    countdown: Option<u32>,

    /// Build the graph and pipe, then tear them down again
    #[arg(long, help = "Perform dry run - build everything but don't start the camera")]
    dry_run: bool,

    /// Disable the terminal operator console
    #[arg(long, help = "Do not read operator keys from the terminal")]
    no_console: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting photo booth v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match BoothConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(seconds) = args.countdown {
        config.session.countdown_seconds = seconds;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mut orchestrator = BoothOrchestrator::new(config).map_err(|e| {
        error!("Failed to build photo booth: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - graph and pipe built, tearing down");
        orchestrator
            .shutdown(&photobooth::ShutdownReason::UserRequest("dry run".to_string()))
            .await?;
        println!("✓ Dry run completed successfully");
        return Ok(());
    }

    orchestrator.start(!args.no_console).map_err(|e| {
        error!("Failed to start photo booth: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Photo booth error during execution: {}", e);
        e
    })?;

    info!("Photo booth exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("photobooth={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Photo booth configuration file");
    println!("# This is the default configuration with all available options");
    println!();
    println!("{}", BoothConfig::default().to_toml()?);
    Ok(())
}
