use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

/// Filter for the stderr subscriber.
///
/// An explicit `--log-level` wins over `RUST_LOG`. An unparsable level falls through to the
/// environment, then to `warn`.
pub fn log_filter(level: Option<&str>) -> EnvFilter {
    level
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn explicit_level_wins() {
        assert_eq!(
            log_filter(Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            log_filter(Some("error")).max_level_hint(),
            Some(LevelFilter::ERROR)
        );
    }
}
