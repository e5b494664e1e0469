//! Lowers the primitive complex types to ordinary records.
//!
//! Every complex width gets a record with two fields of the component type
//! (`re` and `im`, in that order). The complex type is then retired and every
//! trace of it is rewritten in terms of the record: literals become
//! temporaries initialized field by field, declarations are retyped, type
//! operands are re-pointed, `get_real`/`get_imag` become member accesses and
//! generic containers are re-instantiated over the record.
//!
//! All rewrite rules scan the [`ProgramIndex`] taken when the pass starts, so
//! nodes the pass creates itself are never rewritten a second time.

use hashbrown::HashMap;
use log::{debug, warn};
use serde::Serialize;

use super::{PassKind, SubstitutionPolicy};
use crate::{
    ast::{
        Callee, Node, NodeId, Program, SymbolId, SymbolKind, TypeId,
        index::ProgramIndex,
        primitive::{Immediate, PrimitiveOp},
        ty::{TypeFlag, TypeKind},
    },
    error::InternalError,
    intern::InternedSymbol,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoweringReport {
    /// Names of the records standing in for the complex types
    pub records: Vec<String>,
    /// Temporaries holding lowered complex literals
    pub temporaries: usize,
    pub retyped_declarations: usize,
    /// `get_real`/`get_imag` calls turned into member accesses
    pub rewritten_operations: usize,
    pub repointed_type_uses: usize,
    pub substitutions_changed: usize,
    /// Container slots cleared because their complex type had no record
    pub substitutions_cleared: usize,
    pub refreshed_uses: usize,
}

/// The record replacing one complex type
#[derive(Debug, Clone, Copy)]
struct LoweredComplex {
    record: TypeId,
    record_symbol: SymbolId,
    component: TypeId,
    /// Real part first
    fields: [SymbolId; 2],
}

struct LoweringContext<'p> {
    program: &'p mut Program,
    index: ProgramIndex,
    lowered: HashMap<TypeId, LoweredComplex>,
    report: LoweringReport,
}

pub fn lower_complex_types(
    program: &mut Program,
    policy: SubstitutionPolicy,
) -> Result<LoweringReport, InternalError> {
    program.begin_pass(PassKind::ComplexToRecord)?;

    let index = ProgramIndex::build(program);
    let mut context = LoweringContext {
        program,
        index,
        lowered: HashMap::new(),
        report: LoweringReport::default(),
    };

    context.create_records()?;
    context.lower_uses()?;
    context.retype_declarations()?;
    context.rewrite_operations()?;
    context.substitute_data_classes(policy)?;
    context.refresh_use_types();

    Ok(context.report)
}

impl LoweringContext<'_> {
    fn create_records(&mut self) -> Result<(), InternalError> {
        let root = self.program.root_module;

        for (complex, component) in self.program.builtins.complex_widths() {
            let name = match self.program.types.get(complex).kind {
                TypeKind::Primitive { width, .. } => format!("_complex{width}"),
                _ => {
                    return Err(InternalError::UnknownComplexWidth {
                        ty: self.program.type_name(complex),
                    });
                }
            };

            let record = self
                .program
                .add_record(root, &name, &[("re", component), ("im", component)])?;
            let lowered = self.record_layout(record, component)?;

            if let Some(reference) = self.program.types.shadows.transfer(complex, record)? {
                self.rename_shadow(reference, &name);
            }
            let complex_symbol = self.program.types.get(complex).symbol;
            self.program.types.retire(complex);

            if let Some(symbol) = complex_symbol {
                let def = self.program.symbol(symbol).def;

                if def.is_valid() && self.program.is_attached(def) {
                    self.program.remove(def)?;
                }
            }

            debug!("lowering `{}` to record `{name}`", self.program.type_name(complex));
            self.lowered.insert(complex, lowered);
            self.report.records.push(name);
        }

        Ok(())
    }

    /// Shadows are named after their value type, so a shadow moving over to
    /// a record takes on the record's name
    fn rename_shadow(&mut self, reference: TypeId, record_name: &str) {
        if let Some(symbol) = self.program.types.get(reference).symbol {
            self.program.symbol_mut(symbol).name = InternedSymbol::new(&format!("_ref_{record_name}"));
        }
    }

    fn record_layout(&self, record: TypeId, component: TypeId) -> Result<LoweredComplex, InternalError> {
        let layout = (
            self.program.types.get(record).symbol,
            self.program.field_symbol(record, 0),
            self.program.field_symbol(record, 1),
        );

        match layout {
            (Some(record_symbol), Some(re), Some(im)) => Ok(LoweredComplex {
                record,
                record_symbol,
                component,
                fields: [re, im],
            }),
            _ => Err(InternalError::ExpectedRecord {
                symbol: self.program.type_name(record),
                found: self.program.type_name(record),
            }),
        }
    }

    fn lowered_for(&self, complex: TypeId) -> Result<LoweredComplex, InternalError> {
        self.lowered
            .get(&complex)
            .copied()
            .ok_or_else(|| InternalError::UnknownComplexWidth {
                ty: self.program.type_name(complex),
            })
    }

    fn complex_type_of(&self, symbol: SymbolId) -> Option<TypeId> {
        self.program
            .symbol(symbol)
            .ty
            .filter(|ty| self.program.types.is_complex(*ty))
    }

    fn lower_uses(&mut self) -> Result<(), InternalError> {
        for id in self.index.uses.clone() {
            let Node::Use { symbol, .. } = *self.program.node(id) else {
                continue;
            };
            let Some(complex) = self.complex_type_of(symbol) else {
                continue;
            };
            let lowered = self.lowered_for(complex)?;

            let declared = self.program.symbol(symbol).def.is_valid();
            match self.program.symbol(symbol).kind {
                SymbolKind::Variable {
                    immediate: Some(immediate),
                } => self.lower_literal(id, symbol, immediate, lowered)?,
                SymbolKind::Type => {
                    self.program.replace(
                        id,
                        Node::Use {
                            symbol: lowered.record_symbol,
                            ty: Some(lowered.record),
                        },
                    );
                    self.report.repointed_type_uses += 1;
                }
                _ if !declared => {
                    return Err(InternalError::UnclassifiedComplex {
                        symbol: self.program.symbol_name(symbol).to_owned(),
                        node: id,
                    });
                }
                // declared symbols are retyped through their declaration
                _ => {}
            }
        }

        debug!("lowered {} complex literals", self.report.temporaries);

        Ok(())
    }

    /// Replaces a use of a complex constant with a fresh record temporary
    /// whose fields are set right before the enclosing statement
    fn lower_literal(
        &mut self,
        id: NodeId,
        constant: SymbolId,
        immediate: Immediate,
        lowered: LoweredComplex,
    ) -> Result<(), InternalError> {
        let (re, im) = match immediate {
            Immediate::Complex { re, im } => (re, im),
            Immediate::Real(re) => (re, 0.0),
            Immediate::Int(re) => (re as f64, 0.0),
            Immediate::Bool(_) => {
                return Err(InternalError::UnclassifiedComplex {
                    symbol: self.program.symbol_name(constant).to_owned(),
                    node: id,
                });
            }
        };

        let statement = self
            .program
            .statement_of(id)
            .ok_or(InternalError::DetachedNode { node: id })?;

        let temp = self.program.new_temp(lowered.record);
        let def = self.program.new_def(temp);
        self.program.insert_before(statement, def)?;

        for (field, value) in lowered.fields.into_iter().zip([re, im]) {
            let value = self.program.constant(Immediate::Real(value), lowered.component);
            let args = vec![
                self.program.use_of(temp),
                self.program.use_of(field),
                self.program.use_of(value),
            ];
            let set = self.program.primitive_call(PrimitiveOp::SetMember, args);
            self.program.insert_before(statement, set)?;
        }

        self.program.replace(
            id,
            Node::Use {
                symbol: temp,
                ty: Some(lowered.record),
            },
        );
        self.report.temporaries += 1;

        Ok(())
    }

    fn retype_declarations(&mut self) -> Result<(), InternalError> {
        for id in self.index.defs.clone() {
            let Node::Def(symbol) = *self.program.node(id) else {
                continue;
            };

            if matches!(
                self.program.symbol(symbol).kind,
                SymbolKind::Type | SymbolKind::Module { .. }
            ) {
                continue;
            }

            if let Some(complex) = self.complex_type_of(symbol) {
                let lowered = self.lowered_for(complex)?;
                self.program.symbol_mut(symbol).ty = Some(lowered.record);
                self.report.retyped_declarations += 1;
            }

            let return_type = self
                .program
                .function(symbol)
                .ok()
                .and_then(|function| function.return_type)
                .filter(|ty| self.program.types.is_complex(*ty));

            if let Some(complex) = return_type {
                let lowered = self.lowered_for(complex)?;
                self.program.function_mut(symbol)?.return_type = Some(lowered.record);
                self.report.retyped_declarations += 1;
            }
        }

        debug!("retyped {} declarations", self.report.retyped_declarations);

        Ok(())
    }

    fn describe_operand(&self, operand: NodeId) -> String {
        match self.program.node(operand) {
            Node::Use { symbol, .. } => self.program.symbol_name(*symbol).to_owned(),
            _ => format!("node {operand}"),
        }
    }

    fn rewrite_operations(&mut self) -> Result<(), InternalError> {
        for id in self.index.calls.clone() {
            let Node::Call {
                callee: Callee::Primitive(op),
                args,
            } = self.program.node(id)
            else {
                continue;
            };
            let op = *op;

            let position = match op {
                PrimitiveOp::GetReal => 0,
                PrimitiveOp::GetImag => 1,
                _ => continue,
            };

            let operand = match args.as_slice() {
                [operand] => *operand,
                _ => {
                    return Err(InternalError::ArityMismatch {
                        op: op.name(),
                        node: id,
                        expected: op.arity(),
                        found: args.len(),
                    });
                }
            };

            let operand_type = self
                .program
                .type_of(operand)
                .map(|ty| self.program.types.dereference(ty));
            let Some(record) = operand_type.filter(|ty| self.program.types.is_record(*ty)) else {
                return Err(InternalError::ExpectedRecord {
                    symbol: self.describe_operand(operand),
                    found: operand_type
                        .map(|ty| self.program.type_name(ty))
                        .unwrap_or_else(|| "?".to_owned()),
                });
            };

            let Some(field) = self.program.field_symbol(record, position) else {
                return Err(InternalError::ExpectedRecord {
                    symbol: self.describe_operand(operand),
                    found: self.program.type_name(record),
                });
            };

            let field = self.program.use_of(field);
            self.program.replace(
                id,
                Node::Call {
                    callee: Callee::Primitive(PrimitiveOp::GetMember),
                    args: vec![operand, field],
                },
            );
            self.report.rewritten_operations += 1;
        }

        debug!("rewrote {} complex operations", self.report.rewritten_operations);

        Ok(())
    }

    fn substitute_data_classes(&mut self, policy: SubstitutionPolicy) -> Result<(), InternalError> {
        for container in self.index.type_symbols.clone() {
            let Some(ty) = self.program.symbol(container).ty else {
                continue;
            };

            let data_class = self.program.types.get(ty);
            if !data_class.has_flag(TypeFlag::DataClass) {
                continue;
            }

            let Some(element) = data_class.substitutions.first().and_then(|slot| slot.value) else {
                continue;
            };
            let Some(complex) = self.complex_type_of(element) else {
                continue;
            };

            let replacement = match self.lowered.get(&complex) {
                Some(lowered) => {
                    self.report.substitutions_changed += 1;
                    Some(lowered.record_symbol)
                }
                None if policy == SubstitutionPolicy::Clear => {
                    warn!(
                        "`{}` is instantiated over `{}` which has no record counterpart, clearing it",
                        self.program.symbol_name(container),
                        self.program.type_name(complex)
                    );
                    self.report.substitutions_cleared += 1;
                    None
                }
                None => {
                    return Err(InternalError::UnknownSubstitution {
                        container: self.program.symbol_name(container).to_owned(),
                        ty: self.program.type_name(complex),
                    });
                }
            };

            self.program.types.get_mut(ty).substitutions[0].value = replacement;
        }

        Ok(())
    }

    fn refresh_use_types(&mut self) {
        let fresh = self.index.fresh_uses(self.program);

        for id in self.index.uses.iter().copied().chain(fresh) {
            if self.program.refresh_use_type(id) {
                self.report.refreshed_uses += 1;
            }
        }
    }
}
