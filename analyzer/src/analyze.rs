// analyze.rs: Port-balance analysis of one function
//
// Labels the blocks, validates the primitive calls, runs the fixpoint with
// `PortBalance` and collects the barrier verdicts.
//
// Preconditions: `func` is a well-formed graph function.
// Postconditions: verdicts cover every `SB_WAIT()` in a reachable block.
// Failure modes: invalid configuration; no fixpoint within
//                `config.max_iterations` block visits.
// Side effects: emits `tracing` events only.

use std::fmt;

use tracing::debug;

use crate::balance::{check_balance, validate_calls, WaitVerdict};
use crate::config::{AnalysisConfig, ConfigError};
use crate::dataflow::{solve_forward, Fixpoint, FixpointError};
use crate::diag::{has_errors, Diagnostic};
use crate::domain::BalanceState;
use crate::graph::Function;
use crate::label::{label_blocks, Labeling};
use crate::transfer::PortBalance;

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub function: String,
    pub labeling: Labeling,
    pub fixpoint: Fixpoint<BalanceState>,
    pub verdicts: Vec<WaitVerdict>,
    /// Call-site diagnostics (`E0201`, `W0202`).
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    NonTermination { function: String, iterations: usize },
    InvalidConfig(ConfigError),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::NonTermination {
                function,
                iterations,
            } => write!(
                f,
                "analysis of `{function}` did not reach a fixpoint within {iterations} block visits"
            ),
            AnalysisError::InvalidConfig(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::InvalidConfig(e) => Some(e),
            AnalysisError::NonTermination { .. } => None,
        }
    }
}

impl From<ConfigError> for AnalysisError {
    fn from(e: ConfigError) -> Self {
        AnalysisError::InvalidConfig(e)
    }
}

pub fn analyze(func: &Function, config: &AnalysisConfig) -> Result<AnalysisResult, AnalysisError> {
    config.validate()?;

    let labeling = label_blocks(func);
    let diagnostics = validate_calls(func, &labeling, config);
    let analysis = PortBalance::new(config);
    let fixpoint = solve_forward(func, &labeling, &analysis, config.max_iterations).map_err(
        |FixpointError::IterationLimit { iterations }| AnalysisError::NonTermination {
            function: func.name.clone(),
            iterations,
        },
    )?;
    let verdicts = check_balance(func, &labeling, &fixpoint);

    debug!(
        function = %func.name,
        waits = verdicts.len(),
        possibly_balanced = verdicts.iter().filter(|v| v.possibly_balanced).count(),
        "balance checked"
    );

    Ok(AnalysisResult {
        function: func.name.clone(),
        labeling,
        fixpoint,
        verdicts,
        diagnostics,
    })
}
