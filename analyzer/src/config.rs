// config.rs: Analysis configuration
//
// `AnalysisConfig` is the single value threaded through labeling, dispatch
// and the fixpoint. Values come from defaults, then module `set` directives,
// then explicit overrides (CLI flags), in that order of precedence.
//
// Preconditions: none.
// Postconditions: `AnalysisConfig::validate` accepts the result of
//                 `resolve_config` whenever it returns no error diagnostics.
// Failure modes: bad `set` values produce `E0105`, unknown names `W0106`,
//                out-of-range overrides `E0301`. A single port under
//                shift-invariant normalization warns with `W0302`.
// Side effects: none.

use std::fmt;

use crate::diag::{codes, Diagnostic};
use crate::graph::Module;

/// Bytes per stream element.
pub const DEFAULT_WORD_SIZE: i64 = 8;

/// Block visits allowed before the fixpoint is declared non-terminating.
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// What a later `SB_CONFIG()` does to the imbalance accumulated so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigScope {
    /// Every `SB_CONFIG()` resets to the single all-zero assignment.
    #[default]
    Reset,
    /// `SB_CONFIG()` seeds the all-zero assignment only when nothing reaches
    /// it; otherwise imbalance carries across configurations.
    Accumulate,
}

/// State entering the first operation of the entry block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    /// No assignments: nothing is tracked until the first `SB_CONFIG()`.
    #[default]
    Empty,
    /// A single all-zero assignment.
    Zero,
}

/// How port vectors are normalized after each mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Subtract the minimum known count; only relative imbalance matters.
    #[default]
    ShiftInvariant,
    /// Keep raw net counts.
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Number of hardware ports (N). Ports are 1-based in the DSL.
    pub port_count: usize,
    pub word_size: i64,
    pub max_iterations: usize,
    pub config_scope: ConfigScope,
    pub entry_state: EntryState,
    pub normalization: Normalization,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            port_count: 1,
            word_size: DEFAULT_WORD_SIZE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            config_scope: ConfigScope::default(),
            entry_state: EntryState::default(),
            normalization: Normalization::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn with_ports(port_count: usize) -> Self {
        AnalysisConfig {
            port_count,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_count == 0 {
            return Err(ConfigError::NonPositive {
                field: "port_count",
                value: 0,
            });
        }
        if self.word_size < 1 {
            return Err(ConfigError::NonPositive {
                field: "word_size",
                value: self.word_size,
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::NonPositive {
                field: "max_iterations",
                value: 0,
            });
        }
        Ok(())
    }
}

/// Invalid analysis configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    NonPositive { field: &'static str, value: i64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositive { field, value } => {
                write!(f, "`{field}` must be at least 1, got {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Explicit values that take precedence over module `set` directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub port_count: Option<usize>,
    pub word_size: Option<i64>,
    pub max_iterations: Option<usize>,
    pub config_scope: Option<ConfigScope>,
    pub entry_state: Option<EntryState>,
    pub normalization: Option<Normalization>,
}

/// Names accepted by `set NAME = VALUE`.
pub const SETTING_NAMES: [&str; 3] = ["ports", "word_size", "max_iterations"];

/// Build the effective configuration for `module`.
pub fn resolve_config(module: &Module, overrides: &ConfigOverrides) -> (AnalysisConfig, Vec<Diagnostic>) {
    let mut config = AnalysisConfig::default();
    let mut diagnostics = apply_settings(&mut config, module);

    if let Some(n) = overrides.port_count {
        config.port_count = n;
    }
    if let Some(w) = overrides.word_size {
        config.word_size = w;
    }
    if let Some(k) = overrides.max_iterations {
        config.max_iterations = k;
    }
    if let Some(scope) = overrides.config_scope {
        config.config_scope = scope;
    }
    if let Some(entry) = overrides.entry_state {
        config.entry_state = entry;
    }
    if let Some(norm) = overrides.normalization {
        config.normalization = norm;
    }

    match config.validate() {
        Err(e) => diagnostics.push(Diagnostic::error(codes::E0301, None, e.to_string())),
        Ok(()) if config.port_count == 1 && config.normalization == Normalization::ShiftInvariant => {
            // Every one-element vector shifts to [0].
            diagnostics.push(
                Diagnostic::warning(
                    codes::W0302,
                    module.setting("ports").and_then(|s| s.span),
                    "with one port, shift-invariant normalization reports every path as balanced",
                )
                .with_hint("use `--normalization absolute` or `set ports` to the hardware port count"),
            );
        }
        Ok(()) => {}
    }
    (config, diagnostics)
}

/// Apply module `set` directives to `config`.
pub fn apply_settings(config: &mut AnalysisConfig, module: &Module) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for setting in &module.settings {
        if !SETTING_NAMES.contains(&setting.name.as_str()) {
            diagnostics.push(
                Diagnostic::warning(
                    codes::W0106,
                    setting.span,
                    format!("unknown setting `{}` is ignored", setting.name),
                )
                .with_hint(format!("known settings: {}", SETTING_NAMES.join(", "))),
            );
        }
    }

    if let Some(s) = module.setting("ports") {
        match usize::try_from(s.value) {
            Ok(n) if n >= 1 => config.port_count = n,
            _ => diagnostics.push(invalid_setting(s.span, "ports", s.value)),
        }
    }
    if let Some(s) = module.setting("word_size") {
        if s.value >= 1 {
            config.word_size = s.value;
        } else {
            diagnostics.push(invalid_setting(s.span, "word_size", s.value));
        }
    }
    if let Some(s) = module.setting("max_iterations") {
        match usize::try_from(s.value) {
            Ok(k) if k >= 1 => config.max_iterations = k,
            _ => diagnostics.push(invalid_setting(s.span, "max_iterations", s.value)),
        }
    }

    diagnostics
}

fn invalid_setting(span: Option<crate::ast::Span>, name: &str, value: i64) -> Diagnostic {
    Diagnostic::error(
        codes::E0105,
        span,
        format!("`set {name}` must be a positive integer, got {value}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Setting;

    fn module_with(settings: &[(&str, i64)]) -> Module {
        Module {
            settings: settings
                .iter()
                .map(|(name, value)| Setting {
                    name: name.to_string(),
                    value: *value,
                    span: None,
                })
                .collect(),
            ..Module::default()
        }
    }

    #[test]
    fn defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.port_count, 1);
        assert_eq!(config.word_size, 8);
        assert_eq!(config.config_scope, ConfigScope::Reset);
        assert_eq!(config.entry_state, EntryState::Empty);
        assert_eq!(config.normalization, Normalization::ShiftInvariant);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn settings_apply() {
        let module = module_with(&[("ports", 4), ("word_size", 4), ("max_iterations", 10)]);
        let (config, diags) = resolve_config(&module, &ConfigOverrides::default());
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(config.port_count, 4);
        assert_eq!(config.word_size, 4);
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn overrides_beat_settings() {
        let module = module_with(&[("ports", 4)]);
        let overrides = ConfigOverrides {
            port_count: Some(2),
            config_scope: Some(ConfigScope::Accumulate),
            ..ConfigOverrides::default()
        };
        let (config, diags) = resolve_config(&module, &overrides);
        assert!(diags.is_empty());
        assert_eq!(config.port_count, 2);
        assert_eq!(config.config_scope, ConfigScope::Accumulate);
    }

    #[test]
    fn invalid_setting_is_error_and_keeps_default() {
        let module = module_with(&[("ports", 0)]);
        let (config, diags) = resolve_config(&module, &ConfigOverrides::default());
        let found: Vec<_> = diags.iter().filter_map(|d| d.code).collect();
        assert_eq!(found, vec![codes::E0105, codes::W0302]);
        assert_eq!(config.port_count, 1);
    }

    #[test]
    fn single_shift_invariant_port_warns() {
        let (_, diags) = resolve_config(&Module::default(), &ConfigOverrides::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(codes::W0302));
        assert!(!diags[0].is_error());
        assert!(diags[0].hint.as_deref().is_some_and(|h| h.contains("absolute")));

        let raw = ConfigOverrides {
            normalization: Some(Normalization::Absolute),
            ..ConfigOverrides::default()
        };
        let (_, diags) = resolve_config(&Module::default(), &raw);
        assert!(diags.is_empty(), "{diags:?}");

        let (_, diags) = resolve_config(&module_with(&[("ports", 2)]), &ConfigOverrides::default());
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn unknown_setting_is_warning() {
        let module = module_with(&[("prots", 4), ("ports", 2)]);
        let (_, diags) = resolve_config(&module, &ConfigOverrides::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(codes::W0106));
        assert!(!diags[0].is_error());
    }

    #[test]
    fn zero_override_fails_validation() {
        let overrides = ConfigOverrides {
            port_count: Some(0),
            ..ConfigOverrides::default()
        };
        let (_, diags) = resolve_config(&Module::default(), &overrides);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(codes::E0301));
    }
}
