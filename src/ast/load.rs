//! JSON interchange with the stages around the middle end. A loaded program
//! is checked before any pass touches it: every ID it contains must name an
//! existing node, symbol or type, and neither parent links nor child lists
//! may loop back on themselves.

use super::{Callee, Node, NodeId, Program, SymbolId, SymbolKind, TypeId, ty::TypeKind};
use crate::{
    error::InternalError,
    index::{Index, IndexVec},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    OnPath,
    Done,
}

/// Bounds of the three arenas of a program being loaded
struct IdBounds {
    nodes: usize,
    symbols: usize,
    types: usize,
}

impl IdBounds {
    fn of(program: &Program) -> Self {
        Self {
            nodes: program.nodes.len(),
            symbols: program.symbols.len(),
            types: program.types.types.len(),
        }
    }

    fn check<I: Index>(
        kind: &'static str,
        len: usize,
        id: I,
        owner: &dyn Fn() -> String,
    ) -> Result<(), InternalError> {
        if id.index() < len {
            return Ok(());
        }

        Err(InternalError::DanglingId {
            owner: owner(),
            kind,
            id: id.index(),
        })
    }

    fn node(&self, id: NodeId, owner: &dyn Fn() -> String) -> Result<(), InternalError> {
        Self::check("node", self.nodes, id, owner)
    }

    /// Like [`IdBounds::node`], but INVALID stands for "no node"
    fn optional_node(&self, id: NodeId, owner: &dyn Fn() -> String) -> Result<(), InternalError> {
        if id.is_valid() { self.node(id, owner) } else { Ok(()) }
    }

    fn symbol(&self, id: SymbolId, owner: &dyn Fn() -> String) -> Result<(), InternalError> {
        Self::check("symbol", self.symbols, id, owner)
    }

    fn ty(&self, id: TypeId, owner: &dyn Fn() -> String) -> Result<(), InternalError> {
        Self::check("type", self.types, id, owner)
    }
}

impl Program {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Loads a resolved program produced upstream
    pub fn from_json(json: &str) -> Result<Self, InternalError> {
        let mut program: Self =
            serde_json::from_str(json).map_err(|err| InternalError::MalformedProgram(err.to_string()))?;

        program.check_ids()?;
        program.check_acyclic()?;
        program.rebuild_constant_table();

        Ok(program)
    }

    fn check_ids(&self) -> Result<(), InternalError> {
        let bounds = IdBounds::of(self);

        for (id, parented) in self.nodes.enumerate() {
            let owner = || format!("node {id}");

            bounds.optional_node(parented.parent, &owner)?;

            match &parented.node {
                Node::Def(symbol) => bounds.symbol(*symbol, &owner)?,
                Node::Use { symbol, ty } => {
                    bounds.symbol(*symbol, &owner)?;
                    if let Some(ty) = ty {
                        bounds.ty(*ty, &owner)?;
                    }
                }
                Node::Call { callee, args } => {
                    if let Callee::Function(function) = callee {
                        bounds.symbol(*function, &owner)?;
                    }
                    for arg in args {
                        bounds.node(*arg, &owner)?;
                    }
                }
                Node::Block { body, .. } => {
                    for statement in body {
                        bounds.node(*statement, &owner)?;
                    }
                }
                Node::Cond {
                    condition,
                    then_block,
                    else_block,
                } => {
                    for child in [*condition, *then_block].into_iter().chain(*else_block) {
                        bounds.node(child, &owner)?;
                    }
                }
                Node::Return(value) => {
                    if let Some(value) = value {
                        bounds.node(*value, &owner)?;
                    }
                }
            }
        }

        for (id, symbol) in self.symbols.enumerate() {
            let owner = || format!("symbol {id} (`{}`)", symbol.name);

            bounds.optional_node(symbol.def, &owner)?;
            if let Some(ty) = symbol.ty {
                bounds.ty(ty, &owner)?;
            }

            match &symbol.kind {
                SymbolKind::Function(function) => {
                    for formal in &function.formals {
                        bounds.node(*formal, &owner)?;
                    }
                    bounds.node(function.body, &owner)?;
                    if let Some(ty) = function.return_type {
                        bounds.ty(ty, &owner)?;
                    }
                }
                SymbolKind::Module { block } => bounds.node(*block, &owner)?,
                SymbolKind::Variable { .. } | SymbolKind::Formal | SymbolKind::Field | SymbolKind::Type => {}
            }
        }

        for (id, ty) in self.types.types.enumerate() {
            let owner = || format!("type {id}");

            if let Some(symbol) = ty.symbol {
                bounds.symbol(symbol, &owner)?;
            }
            if let TypeKind::Aggregate { fields, .. } = &ty.kind {
                for field in fields {
                    bounds.node(*field, &owner)?;
                }
            }
            for slot in &ty.substitutions {
                if let Some(value) = slot.value {
                    bounds.symbol(value, &owner)?;
                }
            }
        }

        let owner = || "the reference shadow table".to_owned();
        for (value, reference) in self.types.shadows.pairs() {
            bounds.ty(value, &owner)?;
            bounds.ty(reference, &owner)?;
        }

        let owner = || "the program header".to_owned();
        for module in self.modules.iter().chain([&self.root_module]).chain(&self.entry) {
            bounds.symbol(*module, &owner)?;
        }
        for (complex, real) in self.builtins.complex_widths() {
            bounds.ty(complex, &owner)?;
            bounds.ty(real, &owner)?;
        }
        bounds.ty(self.builtins.boolean, &owner)?;
        bounds.ty(self.builtins.int64, &owner)?;

        Ok(())
    }

    /// Parent chains must end at a node without a parent, and descending
    /// through child lists must never revisit a node on the current path
    fn check_acyclic(&self) -> Result<(), InternalError> {
        let parent = |id: NodeId| {
            let parent = self.nodes[id].parent;
            if parent.is_valid() { vec![parent] } else { Vec::new() }
        };

        if let Some(node) = self.find_cycle(parent).or_else(|| self.find_cycle(|id| self.children(id))) {
            return Err(InternalError::CyclicTree { node });
        }

        Ok(())
    }

    /// Depth-first search over the node arena, returning a node that lies on
    /// a cycle of `successors`
    fn find_cycle(&self, successors: impl Fn(NodeId) -> Vec<NodeId>) -> Option<NodeId> {
        let mut marks: IndexVec<NodeId, Mark> = IndexVec::from_raw(vec![Mark::Unseen; self.nodes.len()]);

        for start in self.nodes.indices() {
            if marks[start] != Mark::Unseen {
                continue;
            }

            marks[start] = Mark::OnPath;
            let mut stack = vec![(start, successors(start).into_iter())];

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                let next = pending.next();

                match next {
                    Some(next) => match marks[next] {
                        Mark::OnPath => return Some(next),
                        Mark::Unseen => {
                            marks[next] = Mark::OnPath;
                            stack.push((next, successors(next).into_iter()));
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }

        None
    }

    fn rebuild_constant_table(&mut self) {
        self.constants = self
            .symbols
            .enumerate()
            .filter_map(|(id, symbol)| match (&symbol.kind, symbol.ty) {
                (
                    SymbolKind::Variable {
                        immediate: Some(immediate),
                    },
                    Some(ty),
                ) => Some(((immediate.key(), ty), id)),
                _ => None,
            })
            .collect();
    }
}
