//! CLI configuration: an optional TOML file (`--config path.toml`) merged
//! with command-line flags, the same two-layer shape as the teacher's own
//! `CompilerConfig`/`LintConfig` (file defaults, flags override).

use std::path::Path;

use serde::Deserialize;

/// Build-mode knobs exposed to the end user, mapped onto
/// [`ssa_ir::BuildMode`] once the program is assembled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Run the sanity pass after every function build.
    pub sanity_check: bool,
    /// Skip the lifter and keep every local in an `Alloc` cell.
    pub naive_form: bool,
    /// Include dead-code findings from files marked generated.
    pub include_generated: bool,
    /// Print every built function's §6.3 debug-dump text as its package
    /// finishes building.
    pub print_functions: bool,
    /// Print a line per package as it finishes building.
    pub print_packages: bool,
    /// Log each source file's name as its package is created.
    pub log_source: bool,
    /// Force package builds onto a single thread instead of the default
    /// bounded thread pool.
    pub build_serially: bool,
    /// Emit a `DebugRef` instruction at every local binding.
    pub global_debug: bool,
}

impl CliConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    }

    pub fn with_sanity_check(mut self, v: bool) -> Self {
        self.sanity_check = v;
        self
    }

    pub fn with_naive_form(mut self, v: bool) -> Self {
        self.naive_form = v;
        self
    }

    pub fn with_include_generated(mut self, v: bool) -> Self {
        self.include_generated = v;
        self
    }

    pub fn with_print_functions(mut self, v: bool) -> Self {
        self.print_functions = v;
        self
    }

    pub fn with_print_packages(mut self, v: bool) -> Self {
        self.print_packages = v;
        self
    }

    pub fn with_log_source(mut self, v: bool) -> Self {
        self.log_source = v;
        self
    }

    pub fn with_build_serially(mut self, v: bool) -> Self {
        self.build_serially = v;
        self
    }

    pub fn with_global_debug(mut self, v: bool) -> Self {
        self.global_debug = v;
        self
    }

    pub fn build_mode(&self) -> ssa_ir::BuildMode {
        ssa_ir::BuildMode::new()
            .with_sanity_check_functions(self.sanity_check)
            .with_naive_form(self.naive_form)
            .with_print_functions(self.print_functions)
            .with_print_packages(self.print_packages)
            .with_log_source(self.log_source)
            .with_build_serially(self.build_serially)
            .with_global_debug(self.global_debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_false() {
        let cfg: CliConfig = toml::from_str("sanity_check = true\n").unwrap();
        assert!(cfg.sanity_check);
        assert!(!cfg.naive_form);
        assert!(!cfg.include_generated);
        assert!(!cfg.global_debug);
    }

    #[test]
    fn from_file_parses_a_toml_config_and_feeds_build_mode() {
        let path = std::env::temp_dir().join(format!("ssa-tool-test-{}.toml", std::process::id()));
        std::fs::write(&path, "naive_form = true\nbuild_serially = true\n").expect("write temp config");

        let cfg = CliConfig::from_file(&path).expect("parses");
        let _ = std::fs::remove_file(&path);
        assert!(cfg.naive_form);
        assert!(cfg.build_serially);
        assert!(!cfg.sanity_check);

        let mode = cfg.build_mode();
        assert!(mode.naive_form);
        assert!(mode.build_serially);
        assert!(!mode.sanity_check_functions);
    }

    #[test]
    fn from_file_reports_an_error_for_a_missing_path() {
        let err = CliConfig::from_file(std::path::Path::new("/nonexistent/ssa-tool.toml"));
        assert!(err.is_err());
    }
}
