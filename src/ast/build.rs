//! Constructors used by the upstream resolver (and by tests) to populate a
//! [`Program`], and by the passes to synthesize new nodes.

use super::{
    BlockKind, Callee, FunctionData, Node, NodeId, Program, Symbol, SymbolId, SymbolKind, TypeId,
    primitive::{Immediate, PrimitiveOp},
    ty::{AggregateKind, Substitution, Type, TypeFlag, TypeKind},
};
use crate::{error::InternalError, intern::InternedSymbol};

impl Program {
    fn new_symbol(&mut self, name: &str, ty: Option<TypeId>, kind: SymbolKind) -> SymbolId {
        self.symbols.push(Symbol {
            name: InternedSymbol::new(name),
            ty,
            kind,
            def: NodeId::INVALID,
            is_temp: false,
        })
    }

    /// Creates the declaration node of a symbol without placing it anywhere
    pub fn new_def(&mut self, symbol: SymbolId) -> NodeId {
        let def = self.new_node(Node::Def(symbol));
        self.symbols[symbol].def = def;

        def
    }

    pub fn add_module(&mut self, name: &str) -> SymbolId {
        let block = self.new_block(BlockKind::Scope);
        let module = self.new_symbol(name, None, SymbolKind::Module { block });
        self.modules.push(module);

        module
    }

    pub fn new_block(&mut self, kind: BlockKind) -> NodeId {
        self.new_node(Node::Block {
            kind,
            body: Vec::new(),
        })
    }

    pub fn new_cond(&mut self, condition: NodeId, then_block: NodeId, else_block: Option<NodeId>) -> NodeId {
        self.new_node(Node::Cond {
            condition,
            then_block,
            else_block,
        })
    }

    /// Declares `ty` under `name` at the tail of a module
    pub fn declare_type(&mut self, module: SymbolId, name: &str, ty: TypeId) -> Result<SymbolId, InternalError> {
        let block = self.module_block(module)?;
        let symbol = self.new_symbol(name, Some(ty), SymbolKind::Type);

        self.types.get_mut(ty).symbol = Some(symbol);
        let def = self.new_def(symbol);
        self.insert_at_tail(block, def)?;

        Ok(symbol)
    }

    /// Declares an aggregate type with the given fields, in order
    pub fn add_aggregate(
        &mut self,
        module: SymbolId,
        name: &str,
        kind: AggregateKind,
        fields: &[(&str, TypeId)],
    ) -> Result<TypeId, InternalError> {
        let fields = fields
            .iter()
            .map(|(name, ty)| {
                let field = self.new_symbol(name, Some(*ty), SymbolKind::Field);
                self.new_def(field)
            })
            .collect();

        let ty = self.types.insert(Type::new(TypeKind::Aggregate { kind, fields }));
        self.declare_type(module, name, ty)?;

        Ok(ty)
    }

    pub fn add_record(&mut self, module: SymbolId, name: &str, fields: &[(&str, TypeId)]) -> Result<TypeId, InternalError> {
        self.add_aggregate(module, name, AggregateKind::Record, fields)
    }

    pub fn add_class(&mut self, module: SymbolId, name: &str, fields: &[(&str, TypeId)]) -> Result<TypeId, InternalError> {
        self.add_aggregate(module, name, AggregateKind::Class, fields)
    }

    /// Creates and declares the reference shadow of `value` in the root module
    pub fn add_reference(&mut self, value: TypeId) -> Result<TypeId, InternalError> {
        let reference = self.types.insert(Type::new(TypeKind::Reference));
        self.types.pair_reference(value, reference)?;

        let name = format!("_ref_{}", self.type_name(value));
        self.declare_type(self.root_module, &name, reference)?;

        Ok(reference)
    }

    /// Declares a generic container class instantiated over `element`
    pub fn add_data_class(&mut self, module: SymbolId, name: &str, element: TypeId) -> Result<TypeId, InternalError> {
        let ty = self.add_class(module, name, &[])?;
        let element = self.types.get(element).symbol;

        let container = self.types.get_mut(ty);
        container.flags.insert(TypeFlag::DataClass);
        container.substitutions.push(Substitution {
            name: InternedSymbol::new("eltType"),
            value: element,
        });

        Ok(ty)
    }

    /// Declares a function at the tail of `scope` (a module block or a
    /// function body). The body starts out holding a single `return`.
    pub fn add_function(
        &mut self,
        scope: NodeId,
        name: &str,
        formals: &[(&str, TypeId)],
        return_type: Option<TypeId>,
    ) -> Result<SymbolId, InternalError> {
        let formals = formals
            .iter()
            .map(|(name, ty)| {
                let formal = self.new_symbol(name, Some(*ty), SymbolKind::Formal);
                self.new_def(formal)
            })
            .collect();

        let body = self.new_block(BlockKind::Scope);
        let ret = self.new_node(Node::Return(None));
        self.insert_at_tail(body, ret)?;

        let function = self.new_symbol(
            name,
            None,
            SymbolKind::Function(FunctionData {
                formals,
                return_type,
                body,
            }),
        );
        let def = self.new_def(function);
        self.insert_at_tail(scope, def)?;

        Ok(function)
    }

    pub fn formal(&self, function: SymbolId, position: usize) -> Option<SymbolId> {
        let def = *self.function(function).ok()?.formals.get(position)?;

        match self.node(def) {
            Node::Def(symbol) => Some(*symbol),
            _ => None,
        }
    }

    /// Declares a variable in `block`, ahead of a trailing return
    pub fn add_variable(&mut self, block: NodeId, name: &str, ty: TypeId) -> Result<SymbolId, InternalError> {
        let variable = self.new_symbol(name, Some(ty), SymbolKind::Variable { immediate: None });
        let def = self.new_def(variable);
        self.push_statement(block, def)?;

        Ok(variable)
    }

    /// Creates a compiler temporary. It has no declaration until the caller
    /// creates one with [`Program::new_def`] and places it.
    pub fn new_temp(&mut self, ty: TypeId) -> SymbolId {
        let name = format!("_tmp{}", self.next_temp);
        self.next_temp += 1;

        let temp = self.new_symbol(&name, Some(ty), SymbolKind::Variable { immediate: None });
        self.symbols[temp].is_temp = true;

        temp
    }

    /// The constant symbol holding `value` at type `ty`. Constants are
    /// interned, so equal values share one symbol.
    pub fn constant(&mut self, value: Immediate, ty: TypeId) -> SymbolId {
        let key = (value.key(), ty);

        if let Some(symbol) = self.constants.get(&key) {
            return *symbol;
        }

        let symbol = self.new_symbol(
            &value.to_string(),
            Some(ty),
            SymbolKind::Variable {
                immediate: Some(value),
            },
        );
        self.constants.insert(key, symbol);

        symbol
    }

    /// A new use of `symbol`, caching the symbol's current type
    pub fn use_of(&mut self, symbol: SymbolId) -> NodeId {
        let ty = self.symbols[symbol].ty;
        self.new_node(Node::Use { symbol, ty })
    }

    pub fn primitive_call(&mut self, op: PrimitiveOp, args: Vec<NodeId>) -> NodeId {
        self.new_node(Node::Call {
            callee: Callee::Primitive(op),
            args,
        })
    }

    pub fn call(&mut self, function: SymbolId, args: Vec<NodeId>) -> NodeId {
        self.new_node(Node::Call {
            callee: Callee::Function(function),
            args,
        })
    }

    pub fn set_entry(&mut self, function: SymbolId) -> Result<(), InternalError> {
        self.function(function)?;
        self.entry = Some(function);

        Ok(())
    }
}
