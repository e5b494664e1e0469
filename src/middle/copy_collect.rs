//! Root-set instrumentation for the copying collector.
//!
//! The collector cannot scan stacks, so every location that may hold a heap
//! pointer has to be registered with it explicitly. For each function the
//! class-typed formals and locals are registered at the head of the body,
//! records are searched for class-typed fields (through any depth of by-value
//! nesting, loading each one into a temporary first) and the registrations
//! are dropped again before every return. Module globals are registered once,
//! by the entry function, which also sets up and tears down the collector.

use log::debug;
use serde::Serialize;

use super::PassKind;
use crate::{
    ast::{
        Node, NodeId, Program, SymbolId, SymbolKind, TypeId, index::ProgramIndex,
        primitive::{Immediate, PrimitiveOp},
    },
    error::InternalError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionRoots {
    pub function: String,
    pub registered: usize,
    pub temporaries: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RootSetReport {
    pub functions: Vec<FunctionRoots>,
    /// Globals registered by the entry function
    pub module_roots: usize,
}

impl RootSetReport {
    /// Total function-level registrations
    pub fn registered(&self) -> usize {
        self.functions.iter().map(|function| function.registered).sum()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionRoots> {
        self.functions.iter().find(|function| function.function == name)
    }
}

/// Registrations found in one function. Each group holds the statements for
/// one discovered root: temporary declarations and loads come before the
/// registrations that use them.
#[derive(Debug, Default)]
struct RootSet {
    groups: Vec<Vec<NodeId>>,
    registered: usize,
    temporaries: usize,
}

struct RootSetBuilder<'p> {
    program: &'p mut Program,
    roots: RootSet,
}

pub fn instrument_root_sets(program: &mut Program, region_bytes: i64) -> Result<RootSetReport, InternalError> {
    let entry = program.entry.ok_or(InternalError::MissingEntry)?;
    let entry_body = program.function(entry)?.body;
    ensure_exit(program, entry, entry_body)?;

    program.begin_pass(PassKind::CopyCollection)?;

    let index = ProgramIndex::build(program);
    let mut report = RootSetReport::default();

    for function in index.functions.iter().copied() {
        let body = program.function(function)?.body;
        let roots = RootSetBuilder::collect(program, function)?;

        if roots.registered > 0 {
            ensure_exit(program, function, body)?;
        }

        program.insert_all_at_head(body, roots.groups.into_iter().rev().flatten())?;
        if roots.registered > 0 {
            delete_roots_before_returns(program, body, roots.registered)?;
        }

        debug!(
            "`{}`: {} roots, {} temporaries",
            program.symbol_name(function),
            roots.registered,
            roots.temporaries
        );
        report.functions.push(FunctionRoots {
            function: program.symbol_name(function).to_owned(),
            registered: roots.registered,
            temporaries: roots.temporaries,
        });
    }

    let globals = module_globals(program)?;
    report.module_roots = globals.len();

    let registrations = globals
        .into_iter()
        .rev()
        .map(|global| {
            let global = program.use_of(global);
            program.primitive_call(PrimitiveOp::GcAddNullRoot, vec![global])
        })
        .collect::<Vec<_>>();
    program.insert_all_at_head(entry_body, registrations)?;

    if report.module_roots > 0 {
        delete_roots_before_returns(program, entry_body, report.module_roots)?;
    }

    let region = program.constant(Immediate::Int(region_bytes), program.builtins.int64);
    let region = program.use_of(region);
    let init = program.primitive_call(PrimitiveOp::GcCcInit, vec![region]);
    program.insert_at_head(entry_body, init)?;

    for ret in program.return_points(entry_body) {
        let cleanup = program.primitive_call(PrimitiveOp::GcCleanup, Vec::new());
        program.insert_before(ret, cleanup)?;
    }

    Ok(report)
}

/// Class-typed variables declared at the top level of any module
fn module_globals(program: &Program) -> Result<Vec<SymbolId>, InternalError> {
    let mut globals = Vec::new();

    for module in &program.modules {
        for statement in program.children(program.module_block(*module)?) {
            let Node::Def(symbol) = *program.node(statement) else {
                continue;
            };
            let symbol_data = program.symbol(symbol);

            if matches!(symbol_data.kind, SymbolKind::Variable { .. })
                && symbol_data.ty.is_some_and(|ty| program.types.is_pointer_class(ty))
            {
                globals.push(symbol);
            }
        }
    }

    Ok(globals)
}

/// Registrations are released before returns, so a body that can run off its
/// end would leak them
fn ensure_exit(program: &Program, function: SymbolId, body: NodeId) -> Result<(), InternalError> {
    if program.ends_in_return(body) {
        return Ok(());
    }

    Err(InternalError::MissingReturn {
        function: program.symbol_name(function).to_owned(),
    })
}

fn delete_roots_before_returns(program: &mut Program, body: NodeId, count: usize) -> Result<(), InternalError> {
    let count = program.constant(Immediate::Int(count as i64), program.builtins.int64);

    for ret in program.return_points(body) {
        let count = program.use_of(count);
        let delete = program.primitive_call(PrimitiveOp::GcDeleteRoot, vec![count]);
        program.insert_before(ret, delete)?;
    }

    Ok(())
}

impl<'p> RootSetBuilder<'p> {
    fn collect(program: &'p mut Program, function: SymbolId) -> Result<RootSet, InternalError> {
        let mut builder = Self {
            program,
            roots: RootSet::default(),
        };

        let formals = builder.program.function(function)?.formals.clone();
        let body = builder.program.function(function)?.body;

        for formal in formals {
            if let Node::Def(symbol) = *builder.program.node(formal) {
                builder.classify(symbol)?;
            }
        }
        builder.scan_block(body)?;

        Ok(builder.roots)
    }

    /// Classifies the declarations of a block and of every block nested in
    /// it. Nested function bodies are left to their own function.
    fn scan_block(&mut self, block: NodeId) -> Result<(), InternalError> {
        for statement in self.program.children(block) {
            match self.program.node(statement) {
                Node::Def(symbol) => {
                    let symbol = *symbol;

                    if matches!(self.program.symbol(symbol).kind, SymbolKind::Variable { .. }) {
                        self.classify(symbol)?;
                    }
                }
                Node::Block { .. } => self.scan_block(statement)?,
                Node::Cond {
                    then_block,
                    else_block,
                    ..
                } => {
                    let (then_block, else_block) = (*then_block, *else_block);

                    self.scan_block(then_block)?;
                    if let Some(else_block) = else_block {
                        self.scan_block(else_block)?;
                    }
                }
                Node::Use { .. } | Node::Call { .. } | Node::Return(_) => {}
            }
        }

        Ok(())
    }

    fn classify(&mut self, symbol: SymbolId) -> Result<(), InternalError> {
        let Some(ty) = self.program.symbol(symbol).ty else {
            return Ok(());
        };

        if self.program.types.is_pointer_class(ty) {
            let root = self.add_root(symbol);
            self.roots.groups.push(vec![root]);
        } else if self.program.types.is_record(ty) {
            let mut group = Vec::new();
            self.scan_record(symbol, ty, &mut group)?;

            if !group.is_empty() {
                self.roots.groups.push(group);
            }
        }

        Ok(())
    }

    fn add_root(&mut self, symbol: SymbolId) -> NodeId {
        self.roots.registered += 1;

        let root = self.program.use_of(symbol);
        self.program.primitive_call(PrimitiveOp::GcAddRoot, vec![root])
    }

    fn scan_record(&mut self, base: SymbolId, ty: TypeId, group: &mut Vec<NodeId>) -> Result<(), InternalError> {
        if !self.program.types.is_record(ty) {
            return Err(InternalError::ExpectedRecord {
                symbol: self.program.symbol_name(base).to_owned(),
                found: self.program.type_name(ty),
            });
        }

        for position in 0..self.program.types.fields(ty).len() {
            let Some(field) = self.program.field_symbol(ty, position) else {
                continue;
            };
            let Some(field_type) = self.program.symbol(field).ty else {
                continue;
            };

            if self.program.types.is_pointer_class(field_type) {
                let temp = self.load_field(base, field, field_type, group);
                let root = self.add_root(temp);
                group.push(root);
            } else if self.program.types.is_record(field_type) {
                let temp = self.load_field(base, field, field_type, group);
                self.scan_record(temp, field_type, group)?;
            }
        }

        Ok(())
    }

    /// Copies `base.field` into a new temporary
    fn load_field(&mut self, base: SymbolId, field: SymbolId, ty: TypeId, group: &mut Vec<NodeId>) -> SymbolId {
        let temp = self.program.new_temp(ty);
        let def = self.program.new_def(temp);

        let args = vec![self.program.use_of(base), self.program.use_of(field)];
        let value = self.program.primitive_call(PrimitiveOp::GetMemberValue, args);
        let destination = self.program.use_of(temp);
        let load = self.program.primitive_call(PrimitiveOp::Move, vec![destination, value]);

        group.extend([def, load]);
        self.roots.temporaries += 1;

        temp
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ast::{BlockKind, pretty_print::pretty_print_node, ty::TypeFlag};

    fn render(program: &Program, id: NodeId) -> String {
        strip_ansi_escapes::strip_str(pretty_print_node(program, id))
    }

    fn count_calls(program: &Program, op: PrimitiveOp) -> usize {
        ProgramIndex::build(program)
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    program.node(**call),
                    Node::Call { callee: crate::ast::Callee::Primitive(found), .. } if *found == op
                )
            })
            .count()
    }

    #[test]
    fn nested_records_load_before_registering() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();

        let class = program.add_class(module, "C", &[]).unwrap();
        let inner = program.add_record(module, "Inner", &[("c", class)]).unwrap();
        let outer = program
            .add_record(module, "Outer", &[("inner", inner), ("d", class)])
            .unwrap();

        let main = program.add_function(block, "main", &[], None).unwrap();
        let body = program.function(main).unwrap().body;
        program.add_variable(body, "o", outer).unwrap();
        program.set_entry(main).unwrap();

        let report = instrument_root_sets(&mut program, 1024).unwrap();

        assert_eq!(
            report.function("main"),
            Some(&FunctionRoots {
                function: "main".to_owned(),
                registered: 2,
                temporaries: 3,
            })
        );
        assert_eq!(
            render(&program, body),
            indoc! {"
                {
                    gc_cc_init(1024)
                    var _tmp0: Inner
                    move(_tmp0, get_member_value(o, inner))
                    var _tmp1: C
                    move(_tmp1, get_member_value(_tmp0, c))
                    gc_add_root(_tmp1)
                    var _tmp2: C
                    move(_tmp2, get_member_value(o, d))
                    gc_add_root(_tmp2)
                    var o: Outer
                    gc_delete_root(2)
                    gc_cleanup()
                    return
                }
            "}
        );
    }

    #[test]
    fn references_and_foreign_handles_are_not_roots() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();

        let class = program.add_class(module, "C", &[]).unwrap();
        let reference = program.add_reference(class).unwrap();
        let handle = program.add_class(module, "Handle", &[]).unwrap();
        program.types.get_mut(handle).flags.insert(TypeFlag::NoObject);

        let main = program
            .add_function(block, "main", &[("r", reference), ("h", handle)], None)
            .unwrap();
        let body = program.function(main).unwrap().body;
        program.add_variable(body, "local_ref", reference).unwrap();
        program.add_variable(body, "local_handle", handle).unwrap();
        program.set_entry(main).unwrap();

        let report = instrument_root_sets(&mut program, 1024).unwrap();

        assert_eq!(report.registered(), 0);
        assert_eq!(count_calls(&program, PrimitiveOp::GcAddRoot), 0);
        assert_eq!(count_calls(&program, PrimitiveOp::GcDeleteRoot), 0);
    }

    #[test]
    fn nested_blocks_and_branches_are_scanned() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();
        let class = program.add_class(module, "C", &[]).unwrap();

        let main = program.add_function(block, "main", &[], None).unwrap();
        let body = program.function(main).unwrap().body;
        let flag = program.add_variable(body, "flag", program.builtins.boolean).unwrap();

        let scope = program.new_block(BlockKind::Scope);
        program.push_statement(body, scope).unwrap();
        program.add_variable(scope, "a", class).unwrap();

        let then_block = program.new_block(BlockKind::Scope);
        program.add_variable(then_block, "b", class).unwrap();
        let early_return = program.new_node(Node::Return(None));
        program.insert_at_tail(then_block, early_return).unwrap();

        let else_block = program.new_block(BlockKind::Loop);
        program.add_variable(else_block, "c", class).unwrap();

        let condition = program.use_of(flag);
        let cond = program.new_cond(condition, then_block, Some(else_block));
        program.push_statement(scope, cond).unwrap();
        program.set_entry(main).unwrap();

        let report = instrument_root_sets(&mut program, 1024).unwrap();

        assert_eq!(report.registered(), 3);
        assert_eq!(count_calls(&program, PrimitiveOp::GcAddRoot), 3);
        // one per return path
        assert_eq!(count_calls(&program, PrimitiveOp::GcDeleteRoot), 2);
        assert_eq!(count_calls(&program, PrimitiveOp::GcCleanup), 2);
        assert_eq!(count_calls(&program, PrimitiveOp::GcCcInit), 1);
    }

    #[test]
    fn instrumentation_requires_an_entry() {
        let mut program = Program::new();

        assert_eq!(
            instrument_root_sets(&mut program, 1024),
            Err(InternalError::MissingEntry)
        );
        assert!(!program.applied_passes.contains(&PassKind::CopyCollection));
    }

    #[test]
    fn bodies_that_run_off_their_end_are_rejected() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();
        let class = program.add_class(module, "C", &[]).unwrap();

        let main = program.add_function(block, "main", &[], None).unwrap();
        program.set_entry(main).unwrap();
        let helper = program.add_function(block, "helper", &[], None).unwrap();
        let body = program.function(helper).unwrap().body;
        program.add_variable(body, "object", class).unwrap();

        // without registrations a missing return is harmless
        let bare = program.add_function(block, "bare", &[], None).unwrap();
        let bare_body = program.function(bare).unwrap().body;
        program.remove(program.return_points(bare_body)[0]).unwrap();

        let mut without_return = program.clone();
        without_return.remove(without_return.return_points(body)[0]).unwrap();

        assert_eq!(
            instrument_root_sets(&mut without_return, 1024),
            Err(InternalError::MissingReturn {
                function: "helper".to_owned(),
            })
        );

        let report = instrument_root_sets(&mut program, 1024).unwrap();
        assert_eq!(report.function("helper").map(|roots| roots.registered), Some(1));
        assert_eq!(count_calls(&program, PrimitiveOp::GcDeleteRoot), 1);
    }

    #[test]
    fn entry_must_end_in_a_return() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();
        let main = program.add_function(block, "main", &[], None).unwrap();
        let body = program.function(main).unwrap().body;
        program.remove(program.return_points(body)[0]).unwrap();
        program.set_entry(main).unwrap();

        assert_eq!(
            instrument_root_sets(&mut program, 1024),
            Err(InternalError::MissingReturn {
                function: "main".to_owned(),
            })
        );
        assert!(!program.applied_passes.contains(&PassKind::CopyCollection));
    }
}
