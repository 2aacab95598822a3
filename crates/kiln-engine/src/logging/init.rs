use std::sync::Once;

/// Filter used when neither the config nor `RUST_LOG` provides one.
///
/// wgpu and naga are chatty at info level; cap them at warn.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger configuration.
///
/// `env_filter` uses the `env_logger` filter syntax, e.g.
/// `"kiln_engine::render=debug,wgpu_core=warn"`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Per-frame cache and allocation traffic at debug, GPU crates at warn.
    pub fn frame_debug() -> Self {
        Self::default().with_filter("info,kiln_engine::render=debug,wgpu_core=warn,wgpu_hal=warn,naga=warn")
    }

    /// Filter in effect: explicit config, then `env`, then [`DEFAULT_FILTER`].
    pub fn resolve_filter(&self, env: Option<String>) -> String {
        self.env_filter
            .clone()
            .or(env)
            .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
    }
}

static INIT: Once = Once::new();

/// Installs the global logger. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.resolve_filter(std::env::var("RUST_LOG").ok());

        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&filter);
        builder.write_style(config.write_style);

        // A test harness may already own the global logger.
        if builder.try_init().is_ok() {
            log::debug!("logging initialized with `{filter}`");
        }
    });
}
