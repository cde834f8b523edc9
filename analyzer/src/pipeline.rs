// pipeline.rs: Analysis state and pass orchestration
//
// Runs parse → build_graph → configure → analyze on one source text, stopping
// after a requested terminal pass. Artifacts accumulate in `AnalysisState`.
//
// Preconditions: `AnalysisState::new` was given the full source text.
// Postconditions: artifacts for every pass up to `terminal` are populated,
//                 or an error is returned naming the failing pass.
// Failure modes: error-level diagnostics in parse, build_graph or configure;
//                a missing function; non-termination of the fixpoint.
//                Call-site errors found by analyze (`E0201`) do not stop the
//                run and are kept in `AnalysisState::diagnostics`.
// Side effects: `info!` timing event after each pass.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, trace_span};

use crate::analyze::{analyze, AnalysisError, AnalysisResult};
use crate::config::{resolve_config, AnalysisConfig, ConfigOverrides};
use crate::diag::{codes, has_errors, Diagnostic};
use crate::graph::{build_module, Module};

// ── Passes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassId {
    Parse,
    BuildGraph,
    Configure,
    Analyze,
}

impl PassId {
    pub const ALL: [PassId; 4] = [
        PassId::Parse,
        PassId::BuildGraph,
        PassId::Configure,
        PassId::Analyze,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PassId::Parse => "parse",
            PassId::BuildGraph => "build_graph",
            PassId::Configure => "configure",
            PassId::Analyze => "analyze",
        }
    }
}

/// Passes needed to produce `terminal`, in execution order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    PassId::ALL.into_iter().filter(|p| *p <= terminal).collect()
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Hashes identifying what an analysis run was computed from.
///
/// `source_hash`: SHA-256 of the raw `.sbg` text.
/// `config_fingerprint`: SHA-256 of the canonical effective configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub config_fingerprint: [u8; 32],
    pub analyzer_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn config_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.config_fingerprint)
    }
}

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

pub fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Canonical one-line form of a configuration, used for fingerprinting.
pub fn canonical_config(config: &AnalysisConfig) -> String {
    format!(
        "ports={};word_size={};max_iterations={};config_scope={:?};entry_state={:?};normalization={:?}",
        config.port_count,
        config.word_size,
        config.max_iterations,
        config.config_scope,
        config.entry_state,
        config.normalization,
    )
}

pub fn compute_provenance(source: &str, config: &AnalysisConfig) -> Provenance {
    Provenance {
        source_hash: sha256(source.as_bytes()),
        config_fingerprint: sha256(canonical_config(config).as_bytes()),
        analyzer_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── State ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Function to analyze.
    pub function: String,
    pub overrides: ConfigOverrides,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            function: "main".to_string(),
            overrides: ConfigOverrides::default(),
        }
    }
}

/// All artifacts of one run plus accumulated diagnostics.
#[derive(Debug)]
pub struct AnalysisState {
    pub source: String,
    pub module: Option<Module>,
    pub config: Option<AnalysisConfig>,
    pub analysis: Option<AnalysisResult>,
    pub diagnostics: Vec<Diagnostic>,
    pub provenance: Option<Provenance>,
}

impl AnalysisState {
    pub fn new(source: impl Into<String>) -> Self {
        AnalysisState {
            source: source.into(),
            module: None,
            config: None,
            analysis: None,
            diagnostics: Vec::new(),
            provenance: None,
        }
    }

    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

// ── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A pass produced error-level diagnostics, kept in
    /// `AnalysisState::diagnostics`.
    Diagnostics { failing_pass: PassId },
    Analysis(AnalysisError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Diagnostics { failing_pass } => {
                write!(f, "{} failed", failing_pass.name())
            }
            PipelineError::Analysis(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Analysis(e) => Some(e),
            PipelineError::Diagnostics { .. } => None,
        }
    }
}

impl From<AnalysisError> for PipelineError {
    fn from(e: AnalysisError) -> Self {
        PipelineError::Analysis(e)
    }
}

#[derive(Debug)]
pub enum LoadError {
    Io { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { source, .. } => Some(source),
        }
    }
}

/// Read a `.sbg` file into a fresh state.
pub fn load(path: &Path) -> Result<AnalysisState, LoadError> {
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(AnalysisState::new(source))
}

// ── Runner ─────────────────────────────────────────────────────────────────

fn finish_pass(
    state: &mut AnalysisState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
) -> Result<(), PipelineError> {
    let is_err = has_errors(&diags);
    state.diagnostics.extend(diags);
    info!(
        "{} complete, {:.1}ms",
        pass_id.name(),
        elapsed.as_secs_f64() * 1000.0
    );
    if is_err {
        return Err(PipelineError::Diagnostics {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

/// Run every pass up to and including `terminal`.
pub fn run_pipeline(
    state: &mut AnalysisState,
    terminal: PassId,
    options: &PipelineOptions,
) -> Result<(), PipelineError> {
    let mut ast = None;

    for pass_id in required_passes(terminal) {
        let _span = trace_span!("pass", name = pass_id.name()).entered();
        let t = Instant::now();
        match pass_id {
            PassId::Parse => {
                let result = crate::parser::parse(&state.source);
                let diags = result
                    .errors
                    .iter()
                    .map(|e| Diagnostic::error(codes::E0001, Some(*e.span()), e.to_string()))
                    .collect();
                ast = result.module;
                finish_pass(state, pass_id, diags, t.elapsed())?;
            }
            PassId::BuildGraph => {
                let Some(parsed) = ast.as_ref() else {
                    return Err(PipelineError::Diagnostics {
                        failing_pass: PassId::Parse,
                    });
                };
                let result = build_module(parsed);
                state.module = Some(result.module);
                finish_pass(state, pass_id, result.diagnostics, t.elapsed())?;
            }
            PassId::Configure => {
                let Some(module) = state.module.as_ref() else {
                    return Err(PipelineError::Diagnostics {
                        failing_pass: PassId::BuildGraph,
                    });
                };
                let (config, diags) = resolve_config(module, &options.overrides);
                state.provenance = Some(compute_provenance(&state.source, &config));
                state.config = Some(config);
                finish_pass(state, pass_id, diags, t.elapsed())?;
            }
            PassId::Analyze => {
                let (Some(module), Some(config)) = (state.module.as_ref(), state.config.as_ref())
                else {
                    return Err(PipelineError::Diagnostics {
                        failing_pass: PassId::Configure,
                    });
                };
                let Some(func) = module.function(&options.function) else {
                    let mut diag = Diagnostic::error(
                        codes::E0104,
                        None,
                        format!("function `{}` not found", options.function),
                    );
                    if !module.functions.is_empty() {
                        let names: Vec<&str> =
                            module.functions.iter().map(|f| f.name.as_str()).collect();
                        diag = diag.with_hint(format!("defined functions: {}", names.join(", ")));
                    }
                    finish_pass(state, pass_id, vec![diag], t.elapsed())?;
                    continue;
                };
                let result = analyze(func, config)?;
                let diags = result.diagnostics.clone();
                state.analysis = Some(result);
                // Call-site errors are reported, not fatal.
                let _ = finish_pass(state, pass_id, diags, t.elapsed());
            }
        }
    }
    Ok(())
}

/// Run the full pipeline on `source`.
pub fn run(source: &str, options: &PipelineOptions) -> (AnalysisState, Result<(), PipelineError>) {
    let mut state = AnalysisState::new(source);
    let outcome = run_pipeline(&mut state, PassId::Analyze, options);
    (state, outcome)
}
