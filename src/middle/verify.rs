//! Post-pass consistency checks. These never change the program; they catch a
//! pass that left it in a state later stages are not prepared for.

use super::PassKind;
use crate::{
    ast::{
        Callee, Node, NodeId, Program, SymbolKind,
        index::ProgramIndex,
        primitive::{Immediate, PrimitiveOp},
        ty::TypeFlag,
    },
    error::InternalError,
};

/// Runs every check that applies to a program with its current set of
/// applied passes
pub fn verify_program(program: &Program) -> Result<(), InternalError> {
    let index = ProgramIndex::build(program);

    verify_use_types(program, &index)?;
    verify_arity(program, &index)?;

    if program.applied_passes.contains(&PassKind::ComplexToRecord) {
        verify_no_complex(program, &index)?;
    }

    if program.applied_passes.contains(&PassKind::CopyCollection) {
        verify_root_balance(program, &index)?;
    }

    Ok(())
}

/// Every use caches the current type of its symbol
pub fn verify_use_types(program: &Program, index: &ProgramIndex) -> Result<(), InternalError> {
    for id in &index.uses {
        let Node::Use { symbol, ty } = program.node(*id) else {
            continue;
        };

        if *ty != program.symbol(*symbol).ty {
            return Err(InternalError::StaleUseType {
                symbol: program.symbol_name(*symbol).to_owned(),
                node: *id,
            });
        }
    }

    Ok(())
}

/// Primitive calls have exactly as many arguments as their operation takes,
/// and member operations name a field
pub fn verify_arity(program: &Program, index: &ProgramIndex) -> Result<(), InternalError> {
    for id in &index.calls {
        let Node::Call {
            callee: Callee::Primitive(op),
            args,
        } = program.node(*id)
        else {
            continue;
        };

        if args.len() != op.arity() {
            return Err(InternalError::ArityMismatch {
                op: op.name(),
                node: *id,
                expected: op.arity(),
                found: args.len(),
            });
        }

        if op.is_member_access() {
            let names_field = matches!(
                program.node(args[1]),
                Node::Use { symbol, .. } if matches!(program.symbol(*symbol).kind, SymbolKind::Field)
            );

            if !names_field {
                return Err(InternalError::MalformedMember {
                    op: op.name(),
                    node: *id,
                });
            }
        }
    }

    Ok(())
}

/// No reachable declaration, use, operation or container instantiation
/// still involves a complex type. Type declarations themselves are not
/// checked; lowering removes the ones it replaces.
pub fn verify_no_complex(program: &Program, index: &ProgramIndex) -> Result<(), InternalError> {
    let types = &program.types;
    let residual = |node, detail: String| InternalError::ResidualComplex { node, detail };

    for id in &index.uses {
        if let Some(ty) = program.type_of(*id).filter(|ty| types.is_complex(*ty)) {
            return Err(residual(*id, format!("use of type `{}`", program.type_name(ty))));
        }
    }

    for id in &index.defs {
        let Node::Def(symbol) = program.node(*id) else {
            continue;
        };
        let symbol_data = program.symbol(*symbol);

        if matches!(symbol_data.kind, SymbolKind::Type) {
            let element = symbol_data
                .ty
                .map(|ty| types.get(ty))
                .filter(|ty| ty.has_flag(TypeFlag::DataClass))
                .and_then(|ty| ty.substitutions.first())
                .and_then(|slot| slot.value)
                .and_then(|element| program.symbol(element).ty)
                .filter(|element| types.is_complex(*element));

            if let Some(element) = element {
                return Err(residual(
                    *id,
                    format!("instantiated over `{}`", program.type_name(element)),
                ));
            }

            continue;
        }

        let declared = symbol_data.ty.filter(|ty| types.is_complex(*ty));
        let returned = program
            .function(*symbol)
            .ok()
            .and_then(|function| function.return_type)
            .filter(|ty| types.is_complex(*ty));

        if let Some(ty) = declared.or(returned) {
            return Err(residual(
                *id,
                format!("`{}` declared with `{}`", program.symbol_name(*symbol), program.type_name(ty)),
            ));
        }
    }

    for id in &index.calls {
        if let Node::Call {
            callee: Callee::Primitive(op),
            ..
        } = program.node(*id)
        {
            if op.is_complex_specific() {
                return Err(residual(*id, format!("call to `{op}`")));
            }
        }
    }

    Ok(())
}

/// Every function that registers roots ends in a return, and the
/// `gc_delete_root` calls right before each of its returns release exactly
/// as many roots as it registered. The entry function also counts the module
/// globals it registers.
pub fn verify_root_balance(program: &Program, index: &ProgramIndex) -> Result<(), InternalError> {
    for function in index.functions.iter().copied() {
        let body = program.function(function)?.body;
        let is_entry = program.entry == Some(function);

        let registered = program
            .nodes_within(body)
            .into_iter()
            .filter(|id| match program.node(*id) {
                Node::Call {
                    callee: Callee::Primitive(PrimitiveOp::GcAddRoot),
                    ..
                } => true,
                Node::Call {
                    callee: Callee::Primitive(PrimitiveOp::GcAddNullRoot),
                    ..
                } => is_entry,
                _ => false,
            })
            .count();

        if registered == 0 {
            continue;
        }

        let name = || program.symbol_name(function).to_owned();

        if !program.ends_in_return(body) {
            return Err(InternalError::MissingReturn { function: name() });
        }

        for ret in program.return_points(body) {
            let released = released_before(program, ret);

            if released != registered {
                return Err(InternalError::UnbalancedRoots {
                    function: name(),
                    node: ret,
                    registered,
                    released,
                });
            }
        }
    }

    Ok(())
}

/// Roots released by the run of collector calls directly preceding a return
fn released_before(program: &Program, ret: NodeId) -> usize {
    let Node::Block { body, .. } = program.node(program.parent(ret)) else {
        return 0;
    };
    let Some(position) = body.iter().position(|id| *id == ret) else {
        return 0;
    };

    body[..position]
        .iter()
        .rev()
        .map_while(|id| match program.node(*id) {
            Node::Call {
                callee: Callee::Primitive(PrimitiveOp::GcCleanup),
                ..
            } => Some(0),
            Node::Call {
                callee: Callee::Primitive(PrimitiveOp::GcDeleteRoot),
                args,
            } => Some(args.first().map_or(0, |count| root_count(program, *count))),
            _ => None,
        })
        .sum()
}

fn root_count(program: &Program, count: NodeId) -> usize {
    let Node::Use { symbol, .. } = program.node(count) else {
        return 0;
    };

    match program.symbol(*symbol).kind {
        SymbolKind::Variable {
            immediate: Some(Immediate::Int(count)),
        } => usize::try_from(count).unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_use_types_are_reported() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();
        let x = program.add_variable(block, "x", program.builtins.int64).unwrap();

        let operand = program.use_of(x);
        program.push_statement(block, operand).unwrap();
        program.symbol_mut(x).ty = Some(program.builtins.real64);

        assert_eq!(
            verify_program(&program),
            Err(InternalError::StaleUseType {
                symbol: "x".to_owned(),
                node: operand,
            })
        );
    }

    #[test]
    fn member_operations_must_name_a_field() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();
        let x = program.add_variable(block, "x", program.builtins.int64).unwrap();
        let one = program.constant(Immediate::Int(1), program.builtins.int64);

        let args = vec![program.use_of(x), program.use_of(one)];
        let call = program.primitive_call(PrimitiveOp::GetMemberValue, args);
        program.push_statement(block, call).unwrap();

        assert_eq!(
            verify_program(&program),
            Err(InternalError::MalformedMember {
                op: "get_member_value",
                node: call,
            })
        );
    }

    #[test]
    fn arity_is_checked() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();

        let call = program.primitive_call(PrimitiveOp::GcDeleteRoot, Vec::new());
        program.push_statement(block, call).unwrap();

        assert_eq!(
            verify_program(&program),
            Err(InternalError::ArityMismatch {
                op: "gc_delete_root",
                node: call,
                expected: 1,
                found: 0,
            })
        );
    }

    #[test]
    fn complex_check_only_applies_after_lowering() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();
        let z = program.add_variable(block, "z", program.builtins.complex64).unwrap();
        let def = program.symbol(z).def;

        assert_eq!(verify_program(&program), Ok(()));

        program.applied_passes.insert(PassKind::ComplexToRecord);

        assert!(matches!(
            verify_program(&program),
            Err(InternalError::ResidualComplex { node, .. }) if node == def
        ));
    }

    #[test]
    fn root_registrations_must_be_released_on_every_return() {
        let mut program = Program::new();
        let module = program.add_module("m");
        let block = program.module_block(module).unwrap();
        let class = program.add_class(module, "Node", &[]).unwrap();
        let helper = program.add_function(block, "helper", &[], None).unwrap();
        let body = program.function(helper).unwrap().body;
        let object = program.add_variable(body, "object", class).unwrap();

        let root = program.use_of(object);
        let add = program.primitive_call(PrimitiveOp::GcAddRoot, vec![root]);
        program.insert_at_head(body, add).unwrap();
        program.applied_passes.insert(PassKind::CopyCollection);

        let ret = program.return_points(body)[0];
        assert_eq!(
            verify_program(&program),
            Err(InternalError::UnbalancedRoots {
                function: "helper".to_owned(),
                node: ret,
                registered: 1,
                released: 0,
            })
        );

        let one = program.constant(Immediate::Int(1), program.builtins.int64);
        let one = program.use_of(one);
        let delete = program.primitive_call(PrimitiveOp::GcDeleteRoot, vec![one]);
        program.insert_before(ret, delete).unwrap();

        assert_eq!(verify_program(&program), Ok(()));

        program.remove(ret).unwrap();

        assert_eq!(
            verify_program(&program),
            Err(InternalError::MissingReturn {
                function: "helper".to_owned(),
            })
        );
    }
}
