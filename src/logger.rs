//! log4rs setup.
//!
//! `init` reads `log4rs.yaml` from the working directory. `init_with` builds the configuration in
//! code: a rolling `{dir}/{name}.log` for everything, a separate rolling `metrics.log` for the
//! `nexusql::metrics` target, or a console appender when no directory is configured.
use crate::config::LoggingConfig;
use crate::query::telemetry::METRICS_TARGET;
use crate::utils::devlog::DEV6_TARGET;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file("log4rs.yaml", log4rs::config::Deserializers::default())?;
    Ok(())
}

#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(
    dir: &Path,
    stem: &str,
    keep: u32,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let pattern = dir.join(format!("{stem}.{{}}.log"));
    let roller = FixedWindowRoller::builder().build(&pattern.display().to_string(), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(dir.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Builds the logger configuration without installing it.
pub fn build_config(cfg: &LoggingConfig, name: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let level = parse_level(&cfg.level);
    let builder = match cfg.dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Config::builder()
                .appender(Appender::builder().build("app", Box::new(rolling(dir, name, cfg.retention)?)))
                .appender(
                    Appender::builder()
                        .build("metrics", Box::new(rolling(dir, "metrics", cfg.retention)?)),
                )
                .logger(Logger::builder().appender("metrics").additive(false).build(METRICS_TARGET, level))
        }
        None => {
            let console = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(PATTERN))).build();
            Config::builder().appender(Appender::builder().build("app", Box::new(console)))
        }
    };
    let config = builder
        .logger(Logger::builder().additive(false).build(DEV6_TARGET, LevelFilter::Trace))
        .build(Root::builder().appender("app").build(level))?;
    Ok(config)
}

/// Installs the logger. Fails if a global logger is already set.
pub fn init_with(cfg: &LoggingConfig, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_config(build_config(cfg, name)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("nonsense"), LevelFilter::Info);
    }

    #[test]
    fn file_config_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let cfg = LoggingConfig { dir: Some(logs.clone()), level: "debug".into(), retention: 2 };
        build_config(&cfg, "nexusql").unwrap();
        assert!(logs.is_dir());
    }

    #[test]
    fn console_config_builds() {
        assert!(build_config(&LoggingConfig::default(), "nexusql").is_ok());
    }
}
