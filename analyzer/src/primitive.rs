// primitive.rs: Stream primitive recognition and operand extraction
//
// Maps the six stream primitives to their effect on the per-port element
// counts. Callee identity was resolved to `PrimitiveKind` at graph build
// time; this module only interprets operands.
//
// Preconditions: operations come from a `graph::Function`.
// Postconditions: `Dispatch::effect` never fails on unknown operands; they
//                 become `Delta::Unknown` / `PortRef::Unknown`.
// Failure modes: a literal port outside `1..=N` yields
//                `DispatchError::PortOutOfRange`.
// Side effects: none.

use std::fmt;

use crate::config::AnalysisConfig;
use crate::graph::{Callee, Operand, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Config,
    Wait,
    MemPortStream,
    Constant,
    PortMemStream,
    Discard,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 6] = [
        PrimitiveKind::Config,
        PrimitiveKind::Wait,
        PrimitiveKind::MemPortStream,
        PrimitiveKind::Constant,
        PrimitiveKind::PortMemStream,
        PrimitiveKind::Discard,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Config => "SB_CONFIG",
            PrimitiveKind::Wait => "SB_WAIT",
            PrimitiveKind::MemPortStream => "SB_MEM_PORT_STREAM",
            PrimitiveKind::Constant => "SB_CONSTANT",
            PrimitiveKind::PortMemStream => "SB_PORT_MEM_STREAM",
            PrimitiveKind::Discard => "SB_DISCARD",
        }
    }

    /// Short spelling without the `SB_` prefix and with `_TO_` streams.
    pub fn alias(self) -> &'static str {
        match self {
            PrimitiveKind::Config => "CONFIG",
            PrimitiveKind::Wait => "WAIT",
            PrimitiveKind::MemPortStream => "MEM_TO_PORT_STREAM",
            PrimitiveKind::Constant => "CONSTANT",
            PrimitiveKind::PortMemStream => "PORT_TO_MEM_STREAM",
            PrimitiveKind::Discard => "DISCARD",
        }
    }

    /// Accepts both `name()` and `alias()` spellings.
    pub fn from_name(name: &str) -> Option<PrimitiveKind> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == name || k.alias() == name)
    }

    /// Number of operands the primitive takes.
    pub fn arity(self) -> usize {
        match self {
            PrimitiveKind::Config | PrimitiveKind::Wait => 0,
            PrimitiveKind::MemPortStream | PrimitiveKind::PortMemStream => 5,
            PrimitiveKind::Constant => 3,
            PrimitiveKind::Discard => 2,
        }
    }

    /// Operand positions printed by distill mode, in output order.
    fn distill_positions(self) -> &'static [usize] {
        match self {
            PrimitiveKind::Config | PrimitiveKind::Wait => &[],
            // port, stride, access_size, nstrides
            PrimitiveKind::MemPortStream => &[4, 1, 2, 3],
            PrimitiveKind::PortMemStream => &[0, 1, 2, 3],
            // port, nelems
            PrimitiveKind::Constant => &[0, 2],
            PrimitiveKind::Discard => &[0, 1],
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Signed change in a port's element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Known(i64),
    Unknown,
}

/// Zero-based port targeted by a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRef {
    Index(usize),
    /// The port operand is not a constant.
    Unknown,
}

/// What one primitive call does to a single port vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEffect {
    /// `SB_CONFIG()`.
    Reset,
    /// `SB_WAIT()`: no mutation.
    Query,
    Adjust { port: PortRef, delta: Delta },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// `port` is the 1-based value as written.
    PortOutOfRange { port: i64, port_count: usize },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::PortOutOfRange { port, port_count } => write!(
                f,
                "port {port} is out of range: ports are numbered 1..={port_count}"
            ),
        }
    }
}

impl std::error::Error for DispatchError {}

/// A recognized primitive call and its operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatch<'a> {
    pub kind: PrimitiveKind,
    operands: &'a [Operand],
}

/// Recognize `op` as a stream primitive call.
pub fn dispatch(op: &Operation) -> Option<Dispatch<'_>> {
    match op.callee()? {
        Callee::Primitive(kind) => Some(Dispatch {
            kind: *kind,
            operands: op.operands(),
        }),
        _ => None,
    }
}

impl<'a> Dispatch<'a> {
    pub fn new(kind: PrimitiveKind, operands: &'a [Operand]) -> Self {
        Dispatch { kind, operands }
    }

    /// Operand at `pos`; missing operands read as unknown.
    pub fn operand(&self, pos: usize) -> Operand {
        self.operands.get(pos).copied().unwrap_or(Operand::Unknown)
    }

    /// `(expected, found)` when the operand count is wrong.
    pub fn arity_mismatch(&self) -> Option<(usize, usize)> {
        let expected = self.kind.arity();
        (self.operands.len() != expected).then_some((expected, self.operands.len()))
    }

    /// Effect on a port vector under `config`.
    pub fn effect(&self, config: &AnalysisConfig) -> Result<PortEffect, DispatchError> {
        let (port_pos, delta, sign) = match self.kind {
            PrimitiveKind::Config => return Ok(PortEffect::Reset),
            PrimitiveKind::Wait => return Ok(PortEffect::Query),
            PrimitiveKind::MemPortStream => (4, self.stream_delta(2, 3, config.word_size), 1),
            PrimitiveKind::Constant => (0, self.count_delta(2), 1),
            PrimitiveKind::PortMemStream => (0, self.stream_delta(2, 3, config.word_size), -1),
            PrimitiveKind::Discard => (0, self.count_delta(1), -1),
        };

        let port = match self.operand(port_pos) {
            Operand::Literal(p) => {
                let out_of_range = DispatchError::PortOutOfRange {
                    port: p,
                    port_count: config.port_count,
                };
                let index = p
                    .checked_sub(1)
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| out_of_range.clone())?;
                if index >= config.port_count {
                    return Err(out_of_range);
                }
                PortRef::Index(index)
            }
            Operand::Unknown => PortRef::Unknown,
        };

        let delta = match delta {
            Delta::Known(d) => d.checked_mul(sign).map_or(Delta::Unknown, Delta::Known),
            Delta::Unknown => Delta::Unknown,
        };
        Ok(PortEffect::Adjust { port, delta })
    }

    /// Literal operands in distill order; unknown operands print as -1.
    pub fn distill_operands(&self) -> Vec<i64> {
        self.kind
            .distill_positions()
            .iter()
            .map(|&pos| self.operand(pos).literal().unwrap_or(-1))
            .collect()
    }

    /// `nstrides * access_size / word_size`; overflow is unknown.
    fn stream_delta(&self, access_pos: usize, nstrides_pos: usize, word_size: i64) -> Delta {
        let (Some(access), Some(nstrides)) = (
            self.operand(access_pos).literal(),
            self.operand(nstrides_pos).literal(),
        ) else {
            return Delta::Unknown;
        };
        nstrides
            .checked_mul(access)
            .and_then(|bytes| bytes.checked_div(word_size))
            .map_or(Delta::Unknown, Delta::Known)
    }

    fn count_delta(&self, pos: usize) -> Delta {
        self.operand(pos).literal().map_or(Delta::Unknown, Delta::Known)
    }
}
