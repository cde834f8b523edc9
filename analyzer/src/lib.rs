// sbbal: stream-port balance analyzer
//
// Library root. Front end (lexer, parser, ast), program graph, and the
// port-balance dataflow analysis over it. Rendering lives in `report` and
// `dot`.

pub mod analyze;
pub mod ast;
pub mod balance;
pub mod config;
pub mod dataflow;
pub mod diag;
pub mod dot;
pub mod domain;
pub mod graph;
pub mod id;
pub mod label;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod primitive;
pub mod report;
pub mod transfer;
