// report.rs: Output rendering
//
// Turns a finished `AnalysisState` into the human-readable verdict report,
// its JSON form, the per-operation state trace, or the distill CSV listing.
// Rendering runs only after the fixpoint is complete.

use std::fmt::Write;

use serde::Serialize;

use crate::analyze::AnalysisResult;
use crate::balance::WaitVerdict;
use crate::config::{AnalysisConfig, ConfigScope, EntryState, Normalization};
use crate::diag::{DiagLevel, Diagnostic};
use crate::graph::Function;
use crate::label::Labeling;
use crate::pipeline::{bytes_to_hex, sha256, AnalysisState};
use crate::primitive::dispatch;

// ── Report model ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub ports: usize,
    pub word_size: i64,
    pub max_iterations: usize,
    pub config_scope: &'static str,
    pub entry_state: &'static str,
    pub normalization: &'static str,
}

impl From<&AnalysisConfig> for ConfigSummary {
    fn from(config: &AnalysisConfig) -> Self {
        ConfigSummary {
            ports: config.port_count,
            word_size: config.word_size,
            max_iterations: config.max_iterations,
            config_scope: match config.config_scope {
                ConfigScope::Reset => "reset",
                ConfigScope::Accumulate => "accumulate",
            },
            entry_state: match config.entry_state {
                EntryState::Empty => "empty",
                EntryState::Zero => "zero",
            },
            normalization: match config.normalization {
                Normalization::ShiftInvariant => "shift",
                Normalization::Absolute => "absolute",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticSummary {
    pub code: Option<&'static str>,
    pub level: &'static str,
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl DiagnosticSummary {
    fn new(diag: &Diagnostic, source: &str) -> Self {
        let position = diag
            .span
            .map(|span| crate::diag::line_col(source, span.start));
        DiagnosticSummary {
            code: diag.code.map(|c| c.0),
            level: match diag.level {
                DiagLevel::Error => "error",
                DiagLevel::Warning => "warning",
            },
            message: diag.message.clone(),
            line: position.map(|(l, _)| l),
            column: position.map(|(_, c)| c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub analyzer_version: &'static str,
    pub source_hash: String,
    /// SHA-256 of the canonical effective configuration.
    pub config_hash: String,
    pub function: String,
    pub config: ConfigSummary,
    pub iterations: usize,
    pub verdicts: Vec<WaitVerdict>,
    pub diagnostics: Vec<DiagnosticSummary>,
    pub has_errors: bool,
}

/// Assemble the report of a completed analysis. `None` before analyze ran.
pub fn build_report(state: &AnalysisState) -> Option<Report> {
    let analysis = state.analysis.as_ref()?;
    let config = state.config.as_ref()?;
    let provenance = state.provenance.as_ref()?;
    Some(Report {
        analyzer_version: provenance.analyzer_version,
        source_hash: provenance.source_hash_hex(),
        config_hash: provenance.config_fingerprint_hex(),
        function: analysis.function.clone(),
        config: ConfigSummary::from(config),
        iterations: analysis.fixpoint.iterations,
        verdicts: analysis.verdicts.clone(),
        diagnostics: state
            .diagnostics
            .iter()
            .map(|d| DiagnosticSummary::new(d, &state.source))
            .collect(),
        has_errors: state.has_errors(),
    })
}

// ── Verdict report ─────────────────────────────────────────────────────────

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "function `{}`: {} port(s), word size {}",
        report.function, report.config.ports, report.config.word_size
    );
    for v in &report.verdicts {
        let verdict = match (v.possibly_balanced, v.always_balanced) {
            (true, true) => "possibly balanced (always)",
            (true, false) => "possibly balanced",
            (false, _) => "not balanced",
        };
        let _ = writeln!(
            out,
            "SB_WAIT at block {} `{}`, inst {}: {}",
            v.label, v.block_name, v.inst, verdict
        );
        let _ = writeln!(out, "    incoming: {}", v.incoming);
    }
    let balanced = report.verdicts.iter().filter(|v| v.possibly_balanced).count();
    let _ = writeln!(
        out,
        "{} wait site(s), {} possibly balanced",
        report.verdicts.len(),
        balanced
    );
    if report.has_errors {
        let _ = writeln!(out, "analysis completed with errors");
    }
    out
}

pub fn render_json(report: &Report) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    Ok(json)
}

/// SHA-256 of the compact JSON form of `report`.
pub fn report_digest(report: &Report) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(report)?;
    Ok(bytes_to_hex(&sha256(canonical.as_bytes())))
}

// ── State trace ────────────────────────────────────────────────────────────

/// Incoming and outgoing assignment sets of every operation, block by block
/// in label order.
pub fn render_states(func: &Function, result: &AnalysisResult) -> String {
    let mut out = String::new();
    for (label, &block) in result.labeling.order().iter().enumerate() {
        let bb = func.block(block);
        let _ = writeln!(out, "block {label} `{}`:", bb.name);
        for (inst, op) in bb.ops.iter().enumerate() {
            let _ = writeln!(out, "  {inst}: {op}");
            if let Some(state) = result.fixpoint.state(op.id) {
                let _ = writeln!(out, "      in:  {}", state.incoming);
                let _ = writeln!(out, "      out: {}", state.outgoing);
            }
        }
    }
    out
}

// ── Distill listing ────────────────────────────────────────────────────────

/// One `label,inst,NAME[,operands]` line per primitive call, then one
/// `label,inst,control,succ,...` line per block, in label order.
pub fn render_distill(func: &Function, labeling: &Labeling) -> String {
    let mut out = String::new();
    for (label, &block) in labeling.order().iter().enumerate() {
        let bb = func.block(block);
        for (inst, op) in bb.ops.iter().enumerate() {
            let Some(call) = dispatch(op) else {
                continue;
            };
            let _ = write!(out, "{label},{inst},{}", call.kind);
            for v in call.distill_operands() {
                let _ = write!(out, ",{v}");
            }
            out.push('\n');
        }
        let _ = write!(out, "{label},{},control,", bb.ops.len());
        for succ in &bb.succs {
            if let Some(l) = labeling.label_of(*succ) {
                let _ = write!(out, "{l},");
            }
        }
        out.push('\n');
    }
    out
}
