// dot.rs: Graphviz DOT output for labeled control-flow graphs
//
// One box per labeled block listing its stream primitive calls, one edge per
// successor in declared order.
//
// Preconditions: `labeling` was computed from `func`.
// Postconditions: returns a DOT string; unlabeled blocks are omitted.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::graph::Function;
use crate::label::Labeling;
use crate::primitive::dispatch;

/// Emit the labeled blocks of `func` as a Graphviz DOT string.
pub fn emit_dot(func: &Function, labeling: &Labeling) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "digraph {} {{", sanitize(&func.name));
    let _ = writeln!(buf, "    node [shape=box, fontname=\"Helvetica\", fontsize=10];");

    let _ = writeln!(buf);
    for (label, &block) in labeling.order().iter().enumerate() {
        let bb = func.block(block);
        let mut text = format!("{label}: {}\\l", bb.name);
        for op in &bb.ops {
            let Some(call) = dispatch(op) else {
                continue;
            };
            let operands: Vec<String> = op.operands().iter().map(|o| o.to_string()).collect();
            let _ = write!(text, "{}({})\\l", call.kind, operands.join(", "));
        }
        let _ = writeln!(buf, "    bb{label} [label=\"{}\"];", escape(&text));
    }

    let _ = writeln!(buf);
    for (label, &block) in labeling.order().iter().enumerate() {
        for succ in &func.block(block).succs {
            if let Some(to) = labeling.label_of(*succ) {
                let _ = writeln!(buf, "    bb{label} -> bb{to};");
            }
        }
    }
    let _ = writeln!(buf, "}}");
    buf
}

/// Graph identifiers are restricted to `[A-Za-z0-9_]`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('"', "\\\"")
}
