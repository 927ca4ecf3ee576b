use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const CRATES: [&str; 5] = [
    "cachesweep",
    "cachesweep_core",
    "cachesweep_store",
    "cachesweep_scan",
    "cachesweep_registry",
];

/// Default filter when `RUST_LOG` is unset.
fn default_directives(verbose: bool) -> String {
    if verbose {
        let mut d = String::from("warn");
        for krate in CRATES {
            d.push_str(&format!(",{krate}=debug"));
        }
        d
    } else {
        "warn".to_string()
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean for
/// progress lines and `--json` output. Only the first call takes effect.
pub fn init(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()
            .ok();
    }
}
