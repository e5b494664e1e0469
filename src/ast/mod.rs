//! The resolved program representation the middle end rewrites. Nodes,
//! symbols and types all live in arenas owned by a single [`Program`] and are
//! addressed by stable IDs, so a pass can hold on to an ID across arbitrary
//! edits: replacing a node swaps the content of its slot and every holder of
//! the ID observes the new node.
//!
//! Every node is stored together with the ID of its parent which makes the
//! tree traversable in both directions (from a use up to its enclosing
//! statement, for example).

use std::collections::BTreeSet;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use self::{
    primitive::{Immediate, ImmediateKey, PrimitiveClass, PrimitiveOp},
    ty::{Type, TypeKind, TypeUniverse},
};
use crate::{
    error::InternalError,
    index::{Index, IndexVec},
    intern::InternedSymbol,
    middle::PassKind,
};

pub mod build;
pub mod edit;
pub mod id;
pub mod index;
pub mod load;
pub mod pretty_print;
pub mod primitive;
pub mod ty;
pub mod visit;

pub use id::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub nodes: IndexVec<NodeId, ParentedNode>,
    pub symbols: IndexVec<SymbolId, Symbol>,
    pub types: TypeUniverse,
    /// All modules in the program, the root module first
    pub modules: Vec<SymbolId>,
    /// Holds the builtin type declarations and anything the passes synthesize
    /// at program scope
    pub root_module: SymbolId,
    /// The program's designated entry function
    pub entry: Option<SymbolId>,
    pub builtins: Builtins,
    /// Passes which have already rewritten this program
    pub applied_passes: BTreeSet<PassKind>,

    #[serde(skip)]
    constants: HashMap<(ImmediateKey, TypeId), SymbolId>,
    next_temp: u32,
}

/// A node coupled with the ID of its parent node.
///
/// Module blocks and detached nodes have an INVALID parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentedNode {
    pub parent: NodeId,
    pub node: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Introduces a symbol into the enclosing scope
    Def(SymbolId),
    /// A reference to a symbol. `ty` caches the symbol's type at the time the
    /// use was last synchronized.
    Use {
        symbol: SymbolId,
        ty: Option<TypeId>,
    },
    Call {
        callee: Callee,
        args: Vec<NodeId>,
    },
    Block {
        kind: BlockKind,
        body: Vec<NodeId>,
    },
    Cond {
        condition: NodeId,
        then_block: NodeId,
        else_block: Option<NodeId>,
    },
    Return(Option<NodeId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    Primitive(PrimitiveOp),
    Function(SymbolId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Scope,
    Loop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: InternedSymbol,
    /// The declared type. For type symbols this is the named type itself.
    /// Functions and modules have no type.
    pub ty: Option<TypeId>,
    pub kind: SymbolKind,
    /// The declaration node, INVALID for constants and for temporaries that
    /// have not been declared yet
    pub def: NodeId,
    pub is_temp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SymbolKind {
    /// A variable; constants carry their compile time value
    Variable { immediate: Option<Immediate> },
    Formal,
    Field,
    Function(FunctionData),
    Type,
    Module { block: NodeId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionData {
    /// Declaration nodes of the formals, in order
    pub formals: Vec<NodeId>,
    pub return_type: Option<TypeId>,
    pub body: NodeId,
}

/// The primitive types every program starts out with
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Builtins {
    pub boolean: TypeId,
    pub int64: TypeId,
    pub real32: TypeId,
    pub real64: TypeId,
    pub complex64: TypeId,
    pub complex128: TypeId,
}

impl Builtins {
    /// Each complex type paired with the real type of its components
    pub fn complex_widths(&self) -> [(TypeId, TypeId); 2] {
        [(self.complex64, self.real32), (self.complex128, self.real64)]
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    /// Creates an empty program containing only the root module and the
    /// builtin types
    pub fn new() -> Self {
        let mut types = TypeUniverse::default();
        let mut primitive = |class, width| types.insert(Type::new(TypeKind::Primitive { class, width }));

        let builtins = Builtins {
            boolean: primitive(PrimitiveClass::Bool, 8),
            int64: primitive(PrimitiveClass::Int, 64),
            real32: primitive(PrimitiveClass::Real, 32),
            real64: primitive(PrimitiveClass::Real, 64),
            complex64: primitive(PrimitiveClass::Complex, 64),
            complex128: primitive(PrimitiveClass::Complex, 128),
        };

        let mut program = Self {
            nodes: IndexVec::new(),
            symbols: IndexVec::new(),
            types,
            modules: Vec::new(),
            root_module: SymbolId::new(0),
            entry: None,
            builtins,
            applied_passes: BTreeSet::new(),
            constants: HashMap::new(),
            next_temp: 0,
        };

        program.root_module = program.add_module("_root");
        program.declare_builtins();

        program
    }

    fn declare_builtins(&mut self) {
        let root = self.root_module;
        let Builtins {
            boolean,
            int64,
            real32,
            real64,
            complex64,
            complex128,
        } = self.builtins;

        for ty in [boolean, int64, real32, real64, complex64, complex128] {
            let name = self.describe_type(ty);
            self.declare_type(root, &name, ty)
                .expect("root module block exists");
        }

        for ty in [real32, real64, complex64, complex128] {
            self.add_reference(ty)
                .expect("builtin types start out without a reference shadow");
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id].node
    }

    pub fn parent(&self, id: NodeId) -> NodeId {
        self.nodes[id].parent
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn symbol_name(&self, id: SymbolId) -> &'static str {
        self.symbols[id].name.value()
    }

    pub fn function(&self, id: SymbolId) -> Result<&FunctionData, InternalError> {
        match &self.symbols[id].kind {
            SymbolKind::Function(function) => Ok(function),
            _ => Err(InternalError::UnexpectedSymbolKind {
                symbol: id,
                expected: "function",
            }),
        }
    }

    pub fn function_mut(&mut self, id: SymbolId) -> Result<&mut FunctionData, InternalError> {
        match &mut self.symbols[id].kind {
            SymbolKind::Function(function) => Ok(function),
            _ => Err(InternalError::UnexpectedSymbolKind {
                symbol: id,
                expected: "function",
            }),
        }
    }

    pub fn module_block(&self, id: SymbolId) -> Result<NodeId, InternalError> {
        match self.symbols[id].kind {
            SymbolKind::Module { block } => Ok(block),
            _ => Err(InternalError::UnexpectedSymbolKind {
                symbol: id,
                expected: "module",
            }),
        }
    }

    /// Name of a type for messages and printing. Declared types use their
    /// symbol's name, anonymous ones are described structurally.
    pub fn type_name(&self, ty: TypeId) -> String {
        match self.types.get(ty).symbol {
            Some(symbol) => self.symbol_name(symbol).to_owned(),
            None => self.describe_type(ty),
        }
    }

    fn describe_type(&self, ty: TypeId) -> String {
        match &self.types.get(ty).kind {
            TypeKind::Primitive { class, width } => format!("{class}({width})"),
            TypeKind::Reference => match self.types.shadows.value_of(ty) {
                Some(value) => format!("ref {}", self.type_name(value)),
                None => "ref ?".to_owned(),
            },
            TypeKind::Aggregate { kind, .. } => format!("{kind:?}#{ty}").to_lowercase(),
        }
    }

    /// The child nodes of a node in evaluation order. The children of a
    /// declaration are the formals and body of a function, or the field
    /// declarations of an aggregate type.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.nodes[id].node {
            Node::Def(symbol) => self.declared_children(*symbol),
            Node::Use { .. } => Vec::new(),
            Node::Call { args, .. } => args.clone(),
            Node::Block { body, .. } => body.clone(),
            Node::Cond {
                condition,
                then_block,
                else_block,
            } => [*condition, *then_block]
                .into_iter()
                .chain(*else_block)
                .collect(),
            Node::Return(value) => value.iter().copied().collect(),
        }
    }

    fn declared_children(&self, symbol: SymbolId) -> Vec<NodeId> {
        let symbol = &self.symbols[symbol];

        match &symbol.kind {
            SymbolKind::Function(function) => function
                .formals
                .iter()
                .copied()
                .chain([function.body])
                .collect(),
            SymbolKind::Type => symbol
                .ty
                .map(|ty| self.types.fields(ty).to_vec())
                .unwrap_or_default(),
            SymbolKind::Variable { .. }
            | SymbolKind::Formal
            | SymbolKind::Field
            | SymbolKind::Module { .. } => Vec::new(),
        }
    }

    /// The symbol declared by the field at `position` (0-based) of an
    /// aggregate type
    pub fn field_symbol(&self, ty: TypeId, position: usize) -> Option<SymbolId> {
        let field = *self.types.fields(ty).get(position)?;

        match self.nodes[field].node {
            Node::Def(symbol) => Some(symbol),
            _ => None,
        }
    }

    /// The component type of a builtin complex type
    pub fn complex_component(&self, ty: TypeId) -> Option<TypeId> {
        self.builtins
            .complex_widths()
            .into_iter()
            .find_map(|(complex, real)| (complex == ty).then_some(real))
    }

    /// The static type of the value a node evaluates to, if it has one
    pub fn type_of(&self, id: NodeId) -> Option<TypeId> {
        match &self.nodes[id].node {
            Node::Use { symbol, .. } => self.symbols[*symbol].ty,
            Node::Call {
                callee: Callee::Function(function),
                ..
            } => self.function(*function).ok()?.return_type,
            Node::Call {
                callee: Callee::Primitive(op),
                args,
            } => match op {
                PrimitiveOp::GetMember | PrimitiveOp::GetMemberValue => {
                    self.type_of(*args.get(1)?)
                }
                PrimitiveOp::GetReal | PrimitiveOp::GetImag => {
                    let operand = self.type_of(*args.first()?)?;
                    self.complex_component(self.types.dereference(operand))
                }
                _ => None,
            },
            Node::Def(_) | Node::Block { .. } | Node::Cond { .. } | Node::Return(_) => None,
        }
    }

    /// Climbs from a node to the statement containing it, i.e. the ancestor
    /// whose parent is a block
    pub fn statement_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;

        loop {
            let parent = self.nodes[current].parent;

            if !parent.is_valid() {
                return None;
            }

            if matches!(self.nodes[parent].node, Node::Block { .. }) {
                return Some(current);
            }

            current = parent;
        }
    }

    /// Whether a node is reachable from one of the program's modules
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;

        while self.nodes[current].parent.is_valid() {
            current = self.nodes[current].parent;
        }

        self.modules
            .iter()
            .any(|module| self.module_block(*module) == Ok(current))
    }

    /// Every node within a body in evaluation order, without descending into
    /// nested declarations
    pub fn nodes_within(&self, body: NodeId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut stack = vec![body];

        while let Some(id) = stack.pop() {
            nodes.push(id);

            if !matches!(self.nodes[id].node, Node::Def(_)) {
                stack.extend(self.children(id).into_iter().rev());
            }
        }

        nodes
    }

    /// All return statements within a body, excluding those of nested
    /// function declarations
    pub fn return_points(&self, body: NodeId) -> Vec<NodeId> {
        self.nodes_within(body)
            .into_iter()
            .filter(|id| matches!(self.nodes[*id].node, Node::Return(_)))
            .collect()
    }

    /// Whether the last statement of a block is a return
    pub fn ends_in_return(&self, block: NodeId) -> bool {
        match &self.nodes[block].node {
            Node::Block { body, .. } => body
                .last()
                .is_some_and(|last| matches!(self.nodes[*last].node, Node::Return(_))),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_program_declares_builtins_in_root_module() {
        let program = Program::new();
        let root_block = program.module_block(program.root_module).unwrap();

        let Node::Block { body, .. } = program.node(root_block) else {
            panic!("module block is not a block");
        };

        // six primitive types plus four reference shadows
        assert_eq!(body.len(), 10);
        assert_eq!(program.type_name(program.builtins.complex64), "complex(64)");
        assert_eq!(program.type_name(program.builtins.real64), "real(64)");

        let shadow = program
            .types
            .shadows
            .reference_of(program.builtins.complex128)
            .unwrap();
        assert_eq!(program.type_name(shadow), "_ref_complex(128)");
    }

    #[test]
    fn complex_components_match_widths() {
        let program = Program::new();
        let builtins = program.builtins;

        assert_eq!(program.complex_component(builtins.complex64), Some(builtins.real32));
        assert_eq!(program.complex_component(builtins.complex128), Some(builtins.real64));
        assert_eq!(program.complex_component(builtins.real64), None);
    }

    #[test]
    fn statement_of_climbs_through_calls() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();
        let x = program
            .add_variable(block, "x", program.builtins.int64)
            .unwrap();

        let source = program.use_of(x);
        let destination = program.use_of(x);
        let call = program.primitive_call(PrimitiveOp::Move, vec![destination, source]);
        program.push_statement(block, call).unwrap();

        assert_eq!(program.statement_of(source), Some(call));
        assert_eq!(program.statement_of(call), Some(call));
        assert!(program.is_attached(source));
    }

    #[test]
    fn return_points_skip_nested_functions() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();

        let outer = program.add_function(block, "outer", &[], None).unwrap();
        let outer_body = program.function(outer).unwrap().body;
        let inner = program.add_function(outer_body, "inner", &[], None).unwrap();
        let inner_body = program.function(inner).unwrap().body;

        let returns = program.return_points(outer_body);

        assert_eq!(returns.len(), 1);
        assert_eq!(program.return_points(inner_body).len(), 1);
        assert_ne!(returns, program.return_points(inner_body));
    }
}
