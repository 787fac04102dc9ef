use camino::Utf8PathBuf;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default directory holding per-module configuration files.
pub const DEFAULT_CONF_DIR: &str = "conf";

/// Namespace scanned for processing modules unless configured otherwise.
pub const DEFAULT_PROCESSING_NAMESPACE: &str = "modules.processing";

/// Namespace scanned for signature modules unless configured otherwise.
pub const DEFAULT_SIGNATURES_NAMESPACE: &str = "modules.signatures";

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default per-module configuration directory.
#[must_use]
pub fn default_conf_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_CONF_DIR)
}

/// Owned default processing namespace.
#[must_use]
pub fn default_processing_namespace() -> String {
    DEFAULT_PROCESSING_NAMESPACE.to_owned()
}

/// Owned default signature namespace.
#[must_use]
pub fn default_signatures_namespace() -> String {
    DEFAULT_SIGNATURES_NAMESPACE.to_owned()
}

/// Per-unit timeout in seconds; zero leaves units unbounded.
#[must_use]
pub const fn default_unit_timeout_secs() -> u64 {
    0
}
