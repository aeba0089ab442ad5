//! Process-wide logging setup for binaries, benches and tests that embed the
//! recompute engine.

use tracing_subscriber::EnvFilter;

/// Output settings. The filter in `RUST_LOG` wins over `default_filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub default_filter: String,
    /// JSON lines when set, human-readable text otherwise.
    pub json: bool,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: true,
            with_target: false,
        }
    }
}

impl LogConfig {
    /// `BUILDLEDGER_LOG_FORMAT=text` switches to text output.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(format) = std::env::var("BUILDLEDGER_LOG_FORMAT") {
            config.json = !format.eq_ignore_ascii_case("text");
        }
        config
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Install the global subscriber from the environment.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    init_with(&LogConfig::from_env());
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_with(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
