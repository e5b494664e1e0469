use colored::Colorize;
use itertools::Itertools;

use super::{
    BlockKind, Callee, Node, NodeId, Program, SymbolId, SymbolKind, TypeId,
    ty::{AggregateKind, TypeKind},
};

/// Renders the whole program, one module after the other
pub fn pretty_print_program(program: &Program) -> String {
    let mut printer = PrettyPrinter::new(program);

    for module in &program.modules {
        printer.module(*module);
    }

    printer.out
}

/// Renders a single statement (and everything nested in it)
pub fn pretty_print_node(program: &Program, id: NodeId) -> String {
    let mut printer = PrettyPrinter::new(program);
    printer.statement(id);

    printer.out
}

/// Same as [`pretty_print_program`] without terminal colors
pub fn render_plain(program: &Program) -> String {
    strip_ansi_escapes::strip_str(pretty_print_program(program))
}

struct PrettyPrinter<'p> {
    program: &'p Program,
    out: String,
    indent: usize,
}

impl<'p> PrettyPrinter<'p> {
    fn new(program: &'p Program) -> Self {
        Self {
            program,
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: impl core::fmt::Display) {
        self.out.push_str(&"    ".repeat(self.indent));
        self.out.push_str(&text.to_string());
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn module(&mut self, module: SymbolId) {
        let Ok(block) = self.program.module_block(module) else {
            return;
        };

        self.line(format!(
            "{} {} {}",
            "module".magenta(),
            self.program.symbol_name(module).blue(),
            "{".white()
        ));
        self.nested(|this| this.block_body(block));
        self.line("}".white());
    }

    fn block_body(&mut self, block: NodeId) {
        let program = self.program;

        for statement in program.children(block) {
            self.statement(statement);
        }
    }

    fn type_name(&self, ty: Option<TypeId>) -> String {
        match ty {
            Some(ty) => self.program.type_name(ty),
            None => "?".to_owned(),
        }
    }

    fn typed_name(&self, symbol: SymbolId) -> String {
        format!(
            "{}: {}",
            self.program.symbol_name(symbol),
            self.type_name(self.program.symbol(symbol).ty).yellow()
        )
    }

    fn statement(&mut self, id: NodeId) {
        let program = self.program;

        match program.node(id) {
            Node::Def(symbol) => self.definition(*symbol),
            Node::Block { kind, .. } => {
                let open = match kind {
                    BlockKind::Scope => "{".white().to_string(),
                    BlockKind::Loop => format!("{} {}", "loop".magenta(), "{".white()),
                };
                self.line(open);
                self.nested(|this| this.block_body(id));
                self.line("}".white());
            }
            Node::Cond {
                condition,
                then_block,
                else_block,
            } => {
                self.line(format!(
                    "{} {} {}",
                    "if".magenta(),
                    self.expression(*condition),
                    "{".white()
                ));
                self.nested(|this| this.block_body(*then_block));

                if let Some(else_block) = else_block {
                    self.line(format!("{} {} {}", "}".white(), "else".magenta(), "{".white()));
                    self.nested(|this| this.block_body(*else_block));
                }

                self.line("}".white());
            }
            Node::Return(value) => match value {
                Some(value) => self.line(format!("{} {}", "return".magenta(), self.expression(*value))),
                None => self.line("return".magenta()),
            },
            Node::Use { .. } | Node::Call { .. } => self.line(self.expression(id)),
        }
    }

    fn definition(&mut self, symbol: SymbolId) {
        let program = self.program;
        let name = program.symbol_name(symbol);

        match &program.symbol(symbol).kind {
            SymbolKind::Function(function) => {
                let formals = function
                    .formals
                    .iter()
                    .filter_map(|def| match program.node(*def) {
                        Node::Def(formal) => Some(self.typed_name(*formal)),
                        _ => None,
                    })
                    .join(", ");
                let return_type = function
                    .return_type
                    .map(|ty| format!(" -> {}", program.type_name(ty).yellow()))
                    .unwrap_or_default();

                self.line(format!(
                    "{} {}({formals}){return_type} {}",
                    "fn".magenta(),
                    name.blue(),
                    "{".white()
                ));
                let body = function.body;
                self.nested(|this| this.block_body(body));
                self.line("}".white());
            }
            SymbolKind::Type => self.type_definition(symbol),
            SymbolKind::Variable { .. } | SymbolKind::Formal | SymbolKind::Field => {
                self.line(format!("{} {}", "var".magenta(), self.typed_name(symbol)))
            }
            SymbolKind::Module { .. } => self.module(symbol),
        }
    }

    fn type_definition(&mut self, symbol: SymbolId) {
        let program = self.program;
        let name = program.symbol_name(symbol);
        let Some(id) = program.symbol(symbol).ty else {
            return;
        };
        let ty = program.types.get(id);

        match &ty.kind {
            TypeKind::Primitive { .. } => self.line(format!("{} {}", "primitive".magenta(), name.yellow())),
            TypeKind::Reference => {
                let value = program
                    .types
                    .shadows
                    .value_of(id)
                    .map(|value| program.type_name(value))
                    .unwrap_or_else(|| "?".to_owned());

                self.line(format!(
                    "{} {} = {} {}",
                    "type".magenta(),
                    name.yellow(),
                    "ref".magenta(),
                    value.yellow()
                ))
            }
            TypeKind::Aggregate { kind, fields } => {
                let keyword = match kind {
                    AggregateKind::Class => "class",
                    AggregateKind::Record => "record",
                };
                let substitutions = if ty.substitutions.is_empty() {
                    String::new()
                } else {
                    let slots = ty
                        .substitutions
                        .iter()
                        .map(|substitution| {
                            let value = substitution
                                .value
                                .map(|value| program.symbol_name(value))
                                .unwrap_or("?");
                            format!("{} = {}", substitution.name, value.yellow())
                        })
                        .join(", ");
                    format!("<{slots}>")
                };

                if fields.is_empty() {
                    self.line(format!(
                        "{} {}{substitutions} {}",
                        keyword.magenta(),
                        name.yellow(),
                        "{}".white()
                    ));
                    return;
                }

                self.line(format!(
                    "{} {}{substitutions} {}",
                    keyword.magenta(),
                    name.yellow(),
                    "{".white()
                ));
                self.nested(|this| {
                    for field in fields {
                        if let Node::Def(field) = program.node(*field) {
                            this.line(this.typed_name(*field));
                        }
                    }
                });
                self.line("}".white());
            }
        }
    }

    fn expression(&self, id: NodeId) -> String {
        match self.program.node(id) {
            Node::Use { symbol, .. } => self.program.symbol_name(*symbol).to_owned(),
            Node::Call { callee, args } => {
                let args = args.iter().map(|arg| self.expression(*arg)).join(", ");
                let callee = match callee {
                    Callee::Primitive(op) => op.name().cyan(),
                    Callee::Function(function) => self.program.symbol_name(*function).blue(),
                };

                format!("{callee}({args})")
            }
            Node::Def(symbol) => self.program.symbol_name(*symbol).to_owned(),
            Node::Block { .. } | Node::Cond { .. } | Node::Return(_) => "<statement>".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ast::primitive::{Immediate, PrimitiveOp};

    #[test]
    fn prints_functions_and_records() {
        let mut program = Program::new();
        let module = program.add_module("demo");
        let block = program.module_block(module).unwrap();
        let real = program.builtins.real64;

        let point = program.add_record(module, "point", &[("x", real), ("y", real)]).unwrap();
        let function = program.add_function(block, "origin", &[("p", point)], Some(real)).unwrap();
        let body = program.function(function).unwrap().body;

        let p = program.formal(function, 0).unwrap();
        let x = program.field_symbol(point, 0).unwrap();
        let zero = program.constant(Immediate::Real(0.0), real);
        let args = vec![program.use_of(p), program.use_of(x), program.use_of(zero)];
        let set = program.primitive_call(PrimitiveOp::SetMember, args);
        program.push_statement(body, set).unwrap();

        let demo_block = program.module_block(module).unwrap();
        let mut plain = String::new();
        for statement in program.children(demo_block) {
            plain.push_str(&strip_ansi_escapes::strip_str(pretty_print_node(&program, statement)));
        }

        assert_eq!(
            plain,
            indoc! {"
                record point {
                    x: real(64)
                    y: real(64)
                }
                fn origin(p: point) -> real(64) {
                    set_member(p, x, 0.0)
                    return
                }
            "}
        );
    }

    #[test]
    fn prints_builtin_declarations() {
        let program = Program::new();
        let plain = render_plain(&program);

        assert!(plain.starts_with("module _root {\n    primitive bool(8)\n"));
        assert!(plain.contains("    type _ref_complex(64) = ref complex(64)\n"));
    }
}
