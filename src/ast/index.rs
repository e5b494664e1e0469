//! Whole-program indices. Passes take one snapshot when they start and scan
//! it once per rewrite rule instead of walking the tree for each site.

use super::{
    Callee, Node, NodeId, Program, SymbolId, SymbolKind,
    visit::{self, Visitor},
};
use crate::index::Index;

/// Every use, declaration and call reachable from the program's modules, plus
/// the declared type symbols and functions, in tree order.
#[derive(Debug, Clone, Default)]
pub struct ProgramIndex {
    pub uses: Vec<NodeId>,
    pub defs: Vec<NodeId>,
    pub calls: Vec<NodeId>,
    pub type_symbols: Vec<SymbolId>,
    pub functions: Vec<SymbolId>,

    /// First node ID allocated after the snapshot was taken
    watermark: usize,
}

impl ProgramIndex {
    pub fn build(program: &Program) -> Self {
        let mut indexer = ProgramIndexer {
            index: ProgramIndex {
                watermark: program.nodes.len(),
                ..Default::default()
            },
        };
        visit::walk_program(&mut indexer, program);

        indexer.index
    }

    /// Nodes allocated since the snapshot, attached to the tree or not
    pub fn fresh_nodes(&self, program: &Program) -> impl Iterator<Item = NodeId> + use<> {
        (self.watermark..program.nodes.len()).map(NodeId::new)
    }

    /// Use nodes allocated since the snapshot that are part of the live tree
    pub fn fresh_uses(&self, program: &Program) -> Vec<NodeId> {
        self.fresh_nodes(program)
            .filter(|id| matches!(program.node(*id), Node::Use { .. }))
            .filter(|id| program.is_attached(*id))
            .collect()
    }
}

struct ProgramIndexer {
    index: ProgramIndex,
}

impl Visitor for ProgramIndexer {
    fn visit_def(&mut self, program: &Program, id: NodeId, symbol: SymbolId) {
        self.index.defs.push(id);

        match program.symbol(symbol).kind {
            SymbolKind::Type => self.index.type_symbols.push(symbol),
            SymbolKind::Function(_) => self.index.functions.push(symbol),
            _ => {}
        }

        visit::walk_children(self, program, id);
    }

    fn visit_use(&mut self, _program: &Program, id: NodeId, _symbol: SymbolId) {
        self.index.uses.push(id);
    }

    fn visit_call(&mut self, program: &Program, id: NodeId, _callee: Callee) {
        self.index.calls.push(id);
        visit::walk_children(self, program, id);
    }
}
