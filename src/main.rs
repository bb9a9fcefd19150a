use clap::Parser;
use spoolmap::cli::{self, Cli};
use spoolmap::config::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match AppConfig::load_from(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            println!("{}", cli::failure_line(&spoolmap::SpoolmapError::from(e)));
            std::process::exit(1);
        }
    };
    init_logging(&config.logging);

    if let Err(e) = cli::run(cli, config).await {
        println!("{}", cli::failure_line(&e));
        std::process::exit(1);
    }
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},spoolmap=debug", logging.level)));

    // File logging only when SPOOLMAP_LOG_DIR is set.
    //
    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // log file, so writability is checked first.
    let file_layer = std::env::var("SPOOLMAP_LOG_DIR").ok().and_then(|log_dir| {
        if std::fs::create_dir_all(&log_dir).is_err() {
            eprintln!(
                "Warning: Could not create log directory {}, file logging disabled",
                log_dir
            );
            return None;
        }
        let test_path = std::path::Path::new(&log_dir).join(".spoolmap_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(&log_dir, "spoolmap.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // The process exits right after the command finishes.
                Box::leak(Box::new(guard));
                eprintln!("Logging to: {}/spoolmap.log", log_dir);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    // Console output goes to stderr so tables on stdout stay clean.
    let json_layer = logging.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
    });
    let console_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();
}
