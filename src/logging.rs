//! Logger initialization with plain (colored) and JSON line formats.

use std::io::Write;

use colored::Colorize;
use log::LevelFilter;

use crate::config::LogFormat;

/// Initializes `env_logger` with the chosen level and format.
///
/// `RUST_LOG` is honored first and the CLI level layered on top, so
/// `RUST_LOG=recon_agent=trace` works for quick debugging while `--log-level`
/// stays authoritative for everything else. Noisy dependencies are pinned
/// down a level.
pub fn init_logger(level: LevelFilter, format: LogFormat) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("rustls", LevelFilter::Warn);
    // hickory logs malformed-UDP warnings it already handles internally.
    builder.filter_module("hickory_proto", LevelFilter::Error);
    builder.filter_module("recon_agent", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{{\"ts\":{},\"level\":\"{}\",\"target\":\"{}\",\"msg\":{}}}",
                    chrono::Utc::now().timestamp_millis(),
                    record.level(),
                    record.target(),
                    serde_json::to_string(&record.args().to_string())
                        .unwrap_or_else(|_| "\"\"".into())
                )
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                let level = record.level();
                let colored_level = match level {
                    log::Level::Error => level.to_string().red(),
                    log::Level::Warn => level.to_string().yellow(),
                    log::Level::Info => level.to_string().green(),
                    log::Level::Debug => level.to_string().blue(),
                    log::Level::Trace => level.to_string().purple(),
                };
                writeln!(
                    buf,
                    "{} [{}] {}",
                    record.target().cyan(),
                    colored_level,
                    record.args()
                )
            });
        }
    }

    // try_init so tests can call this repeatedly.
    builder.try_init().map_err(|e| anyhow::anyhow!("logger init: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_when_called_twice() {
        // The second call fails (logger already set) but must not panic.
        let _ = init_logger(LevelFilter::Info, LogFormat::Plain);
        let second = init_logger(LevelFilter::Debug, LogFormat::Json);
        assert!(second.is_err());
    }
}
