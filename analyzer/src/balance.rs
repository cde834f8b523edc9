// balance.rs: Barrier verdicts and primitive call validation
//
// Reads the fixpoint at every `SB_WAIT()` site. A site is "possibly
// balanced" when some assignment reaching it is balanced.

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::dataflow::Fixpoint;
use crate::diag::{codes, Diagnostic};
use crate::domain::{AssignmentSet, BalanceState};
use crate::graph::Function;
use crate::id::{BlockLabel, OpId};
use crate::label::Labeling;
use crate::primitive::{dispatch, DispatchError, PrimitiveKind};

/// Verdict for one `SB_WAIT()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitVerdict {
    pub label: BlockLabel,
    pub block_name: String,
    /// Index of the call within its block.
    pub inst: usize,
    pub op: OpId,
    pub possibly_balanced: bool,
    pub always_balanced: bool,
    pub incoming: AssignmentSet,
}

/// Verdicts in (block label, instruction index) order.
pub fn check_balance(
    func: &Function,
    labeling: &Labeling,
    fix: &Fixpoint<BalanceState>,
) -> Vec<WaitVerdict> {
    let mut verdicts = Vec::new();
    for (label, &block) in labeling.order().iter().enumerate() {
        let bb = func.block(block);
        for (inst, op) in bb.ops.iter().enumerate() {
            let is_wait = dispatch(op).is_some_and(|d| d.kind == PrimitiveKind::Wait);
            if !is_wait {
                continue;
            }
            let incoming = fix
                .state(op.id)
                .map(|s| s.incoming.assignments.clone())
                .unwrap_or_default();
            verdicts.push(WaitVerdict {
                label: BlockLabel(label as u32),
                block_name: bb.name.clone(),
                inst,
                op: op.id,
                possibly_balanced: incoming.any_balanced(),
                always_balanced: incoming.always_balanced(),
                incoming,
            });
        }
    }
    verdicts
}

/// One diagnostic per offending primitive call in labeled blocks:
/// `E0201` for an out-of-range port, `W0202` for a wrong operand count.
pub fn validate_calls(func: &Function, labeling: &Labeling, config: &AnalysisConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for &block in labeling.order() {
        for op in &func.block(block).ops {
            let Some(call) = dispatch(op) else {
                continue;
            };
            if let Some((expected, found)) = call.arity_mismatch() {
                let hint = if found < expected {
                    "missing operands are treated as unknown"
                } else {
                    "extra operands are ignored"
                };
                diagnostics.push(
                    Diagnostic::warning(
                        codes::W0202,
                        op.span,
                        format!(
                            "`{}` takes {expected} operand(s), found {found}",
                            call.kind
                        ),
                    )
                    .with_hint(hint),
                );
            }
            if let Err(e @ DispatchError::PortOutOfRange { .. }) = call.effect(config) {
                diagnostics.push(
                    Diagnostic::error(codes::E0201, op.span, format!("`{}`: {e}", call.kind))
                        .with_hint("raise `set ports` or pass `--ports`"),
                );
            }
        }
    }
    diagnostics
}
