use super::{Callee, Node, NodeId, Program, SymbolId};

/// Read-only traversal of the live program tree. Every method defaults to
/// walking the children of the visited node, so implementors only override
/// the node kinds they care about and call the matching `walk_*` function to
/// keep descending.
pub trait Visitor: Sized {
    fn visit_module(&mut self, program: &Program, module: SymbolId) {
        walk_module(self, program, module)
    }

    fn visit_node(&mut self, program: &Program, id: NodeId) {
        walk_node(self, program, id)
    }

    fn visit_def(&mut self, program: &Program, id: NodeId, _symbol: SymbolId) {
        walk_children(self, program, id)
    }

    fn visit_use(&mut self, _program: &Program, _id: NodeId, _symbol: SymbolId) {}

    fn visit_call(&mut self, program: &Program, id: NodeId, _callee: Callee) {
        walk_children(self, program, id)
    }

    fn visit_block(&mut self, program: &Program, id: NodeId) {
        walk_children(self, program, id)
    }

    fn visit_cond(&mut self, program: &Program, id: NodeId) {
        walk_children(self, program, id)
    }

    fn visit_return(&mut self, program: &Program, id: NodeId) {
        walk_children(self, program, id)
    }
}

pub fn walk_program(visitor: &mut impl Visitor, program: &Program) {
    for module in &program.modules {
        visitor.visit_module(program, *module);
    }
}

pub fn walk_module(visitor: &mut impl Visitor, program: &Program, module: SymbolId) {
    if let Ok(block) = program.module_block(module) {
        visitor.visit_node(program, block);
    }
}

pub fn walk_node(visitor: &mut impl Visitor, program: &Program, id: NodeId) {
    match program.node(id) {
        Node::Def(symbol) => visitor.visit_def(program, id, *symbol),
        Node::Use { symbol, .. } => visitor.visit_use(program, id, *symbol),
        Node::Call { callee, .. } => visitor.visit_call(program, id, *callee),
        Node::Block { .. } => visitor.visit_block(program, id),
        Node::Cond { .. } => visitor.visit_cond(program, id),
        Node::Return(_) => visitor.visit_return(program, id),
    }
}

pub fn walk_children(visitor: &mut impl Visitor, program: &Program, id: NodeId) {
    for child in program.children(id) {
        visitor.visit_node(program, child);
    }
}
