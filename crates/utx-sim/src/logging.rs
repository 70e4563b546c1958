use crate::config::LoggingConfig;
use std::fs::{File, OpenOptions};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Level implied by repeated `-v` flags, falling back to the configured one.
pub fn effective_level(config: &LoggingConfig, cli_verbose: u8) -> &str {
    match cli_verbose {
        0 => &config.level,
        1 => "debug",
        _ => "trace",
    }
}

const WORKSPACE_TARGETS: [&str; 5] = [
    "utx_types",
    "utx_quorum",
    "utx_economics",
    "utx_resource",
    "utx_sim",
];

/// `RUST_LOG` wins; otherwise every workspace crate at the effective level,
/// then the configured module filters.
pub fn build_filter(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<EnvFilter> {
    let level = effective_level(config, cli_verbose);
    let mut filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
        WORKSPACE_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }));
    for (module, module_level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, module_level).parse()?);
    }
    Ok(filter)
}

fn open_log_file(config: &LoggingConfig) -> anyhow::Result<Option<File>> {
    match &config.file_output {
        Some(path) => Ok(Some(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => Ok(None),
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let filter = build_filter(config, cli_verbose)?;
    let subscriber = tracing_subscriber::registry().with(filter);
    let file = open_log_file(config)?;

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_line_number(true)
                .with_file(true);
            match file {
                Some(file) => {
                    let file_layer = fmt::layer().json().with_writer(file).with_ansi(false);
                    subscriber.with(json_layer).with(file_layer).try_init()?;
                }
                None => subscriber.with(json_layer).try_init()?,
            }
        }
        "compact" => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_line_number(false)
                .with_file(false);
            match file {
                Some(file) => {
                    let file_layer = fmt::layer().compact().with_writer(file).with_ansi(false);
                    subscriber.with(compact_layer).with(file_layer).try_init()?;
                }
                None => subscriber.with(compact_layer).try_init()?,
            }
        }
        _ => {
            let show_location = matches!(effective_level(config, cli_verbose), "debug" | "trace");
            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_line_number(show_location)
                .with_file(show_location);
            match file {
                Some(file) => {
                    let file_layer = fmt::layer().with_writer(file).with_ansi(false);
                    subscriber.with(pretty_layer).with(file_layer).try_init()?;
                }
                None => subscriber.with(pretty_layer).try_init()?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides_level() {
        let config = LoggingConfig::default();
        assert_eq!(effective_level(&config, 0), "info");
        assert_eq!(effective_level(&config, 1), "debug");
        assert_eq!(effective_level(&config, 3), "trace");
    }

    #[test]
    fn test_module_filters_parse() {
        let mut config = LoggingConfig::default();
        config.module_filters.insert("utx_resource::inflation".into(), "debug".into());
        assert!(build_filter(&config, 0).is_ok());

        config.module_filters.insert("utx_economics".into(), "loud".into());
        assert!(build_filter(&config, 0).is_err());
    }
}
