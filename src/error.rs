//! Internal consistency failures. Passes run on a program that upstream has
//! already validated, so none of these are user errors: each one names an
//! invariant an earlier stage (or an earlier pass) broke, and the driver halts
//! compilation as soon as one is produced.

use thiserror::Error;

use crate::{
    ast::{NodeId, SymbolId, TypeId},
    middle::PassKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("complex-typed symbol `{symbol}` (node {node}) does not fit any lowering rule")]
    UnclassifiedComplex { symbol: String, node: NodeId },

    #[error("complex type `{ty}` has no record counterpart")]
    UnknownComplexWidth { ty: String },

    #[error("data class `{container}` is instantiated over `{ty}` which has no record counterpart")]
    UnknownSubstitution { container: String, ty: String },

    #[error("expected a record type for `{symbol}` but found `{found}`")]
    ExpectedRecord { symbol: String, found: String },

    #[error("node {node} is not a statement of a block")]
    NotInBlock { node: NodeId },

    #[error("node {node} is not attached to any statement")]
    DetachedNode { node: NodeId },

    #[error("reference shadow for type {value} conflicts with an existing pairing")]
    ShadowConflict { value: TypeId },

    #[error("root instrumentation requires a designated entry function")]
    MissingEntry,

    #[error("pass `{0}` has already been applied to this program")]
    PassRepeated(PassKind),

    #[error("use of `{symbol}` at node {node} caches a stale type")]
    StaleUseType { symbol: String, node: NodeId },

    #[error("primitive `{op}` at node {node} expects {expected} argument(s) but has {found}")]
    ArityMismatch {
        op: &'static str,
        node: NodeId,
        expected: usize,
        found: usize,
    },

    #[error("primitive `{op}` at node {node} does not name a field in its second argument")]
    MalformedMember { op: &'static str, node: NodeId },

    #[error("complex type or operation survived lowering at node {node}: {detail}")]
    ResidualComplex { node: NodeId, detail: String },

    #[error("function `{function}` registers roots but does not end in a return")]
    MissingReturn { function: String },

    #[error("function `{function}` registers {registered} root(s) but the return at node {node} releases {released}")]
    UnbalancedRoots {
        function: String,
        node: NodeId,
        registered: usize,
        released: usize,
    },

    #[error("malformed JSON: {0}")]
    MalformedProgram(String),

    #[error("{owner} refers to {kind} {id} which does not exist")]
    DanglingId {
        owner: String,
        kind: &'static str,
        id: usize,
    },

    #[error("node {node} is reachable from itself")]
    CyclicTree { node: NodeId },

    #[error("symbol {symbol} is not a {expected}")]
    UnexpectedSymbolKind {
        symbol: SymbolId,
        expected: &'static str,
    },
}
