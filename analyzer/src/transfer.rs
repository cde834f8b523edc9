// transfer.rs: Port-balance analysis
//
// The `ForwardAnalysis` whose state is a `BalanceState`. Recognized
// primitive calls apply their single port effect to every member of the
// incoming assignments; everything else is the identity.
//
// The entry block is always reached unconfigured. Under
// `ConfigScope::Accumulate`, an `SB_CONFIG()` seeds the all-zero vector only
// for the unconfigured paths reaching it and passes every configured
// assignment through.

use crate::config::{AnalysisConfig, ConfigScope, EntryState};
use crate::dataflow::ForwardAnalysis;
use crate::domain::{AssignmentSet, BalanceState, PortVector};
use crate::graph::Operation;
use crate::primitive::{dispatch, Delta, PortEffect, PortRef};

pub struct PortBalance<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> PortBalance<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        PortBalance { config }
    }

    fn zero(&self) -> PortVector {
        PortVector::zero(self.config.port_count)
    }

    fn configure(&self, incoming: &BalanceState) -> BalanceState {
        match self.config.config_scope {
            ConfigScope::Reset => BalanceState::configured(AssignmentSet::singleton(self.zero())),
            ConfigScope::Accumulate => {
                let mut assignments = incoming.assignments.clone();
                if incoming.unconfigured {
                    assignments.insert(self.zero());
                }
                BalanceState::configured(assignments)
            }
        }
    }

    fn apply(&self, effect: PortEffect, incoming: &BalanceState) -> BalanceState {
        let n = self.config.port_count;
        let mode = self.config.normalization;
        let assignments = match effect {
            PortEffect::Reset => return self.configure(incoming),
            PortEffect::Query => return incoming.clone(),
            PortEffect::Adjust {
                port: PortRef::Unknown,
                ..
            } => incoming.assignments.map(|_| PortVector::all_unknown(n)),
            PortEffect::Adjust {
                port: PortRef::Index(p),
                delta: Delta::Known(d),
            } => incoming.assignments.map(|v| v.adjusted(p, d, mode)),
            PortEffect::Adjust {
                port: PortRef::Index(p),
                delta: Delta::Unknown,
            } => incoming.assignments.map(|v| v.mark_unknown(p, mode)),
        };
        BalanceState {
            assignments,
            unconfigured: incoming.unconfigured,
        }
    }
}

impl ForwardAnalysis for PortBalance<'_> {
    type State = BalanceState;

    fn bottom(&self) -> BalanceState {
        BalanceState::unreachable()
    }

    fn entry_state(&self) -> BalanceState {
        let assignments = match self.config.entry_state {
            EntryState::Empty => AssignmentSet::empty(),
            EntryState::Zero => AssignmentSet::singleton(self.zero()),
        };
        BalanceState {
            assignments,
            unconfigured: true,
        }
    }

    fn join_into(&self, acc: &mut BalanceState, other: &BalanceState) {
        acc.join_into(other);
    }

    /// Out-of-range ports are reported by `balance::validate_calls`; here
    /// they leave the state untouched.
    fn transfer(&self, op: &Operation, incoming: &BalanceState) -> BalanceState {
        let Some(call) = dispatch(op) else {
            return incoming.clone();
        };
        match call.effect(self.config) {
            Ok(effect) => self.apply(effect, incoming),
            Err(_) => incoming.clone(),
        }
    }
}
