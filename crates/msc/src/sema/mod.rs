//! Semantic analysis
//!
//! Runs in three steps over all trees of a compilation:
//! 1. Declaration: referenced images and source classes fill the [`SymbolTable`]
//! 2. Binding: each method body becomes a bound tree with resolved types
//! 3. Flow: reachability checks on the bound bodies
//!
//! Declaration diagnostics and body diagnostics are kept apart so callers
//! can ask for either stage.

mod binder;
pub(crate) mod bound;
mod declare;
mod entry;
mod flow;
mod scope;
pub(crate) mod symbols;
pub(crate) mod types;

use log::debug;
use msvm::Image;

use self::binder::{Binder, MethodContext};
use self::bound::{BoundFieldInit, BoundProgram, BoundType, FieldRef, MethodRef};
use self::symbols::SymbolTable;
use self::types::Ty;
use crate::diagnostics::{Diagnostic, DiagnosticBag};
use crate::syntax::SyntaxTree;

/// Result of analyzing a compilation
#[derive(Debug)]
pub(crate) struct Analysis {
    pub table: SymbolTable,
    pub program: BoundProgram,
    pub entry_point: Option<MethodRef>,
    pub declaration_diagnostics: Vec<Diagnostic>,
    pub body_diagnostics: Vec<Diagnostic>,
}

/// Analyze `trees` against the types of the referenced images
pub(crate) fn analyze(
    trees: &[SyntaxTree],
    references: &[Image],
    executable: bool,
    main_type: Option<&str>,
) -> Analysis {
    let mut table = SymbolTable::new();
    for image in references {
        table.import_types(image);
    }
    for image in references {
        table.import_members(image);
    }

    let mut declarations = DiagnosticBag::new();
    let sources = declare::declare(trees, &mut table, &mut declarations);
    let entry_point = if executable {
        entry::find_entry_point(&table, trees, main_type, &mut declarations)
    } else {
        None
    };

    let mut bodies = DiagnosticBag::new();
    let mut program = BoundProgram::default();
    for source in &sources {
        let tree = &trees[source.tree];
        let symbol = table.get(source.id);
        let mut bound = BoundType {
            id: source.id,
            methods: Vec::new(),
            static_inits: Vec::new(),
        };

        for (index, decl) in source.methods.iter().enumerate() {
            let method = &symbol.methods[index];
            let context = MethodContext {
                type_id: source.id,
                method: Some(index),
                is_static: method.is_static,
                return_ty: method.ret.clone(),
                params: &method.params,
            };
            let body = Binder::new(&table, tree, &source.context, context, &mut bodies)
                .bind_body(MethodRef { ty: source.id, index }, &decl.body);
            flow::check_method(&table, tree, &body, &mut bodies);
            bound.methods.push(body);
        }

        for (index, declarator) in source.fields.iter().enumerate() {
            let Some(init) = &declarator.init else { continue };
            let field = &symbol.fields[index];
            let context = MethodContext {
                type_id: source.id,
                method: None,
                is_static: true,
                return_ty: Ty::Void,
                params: &[],
            };
            let value = Binder::new(&table, tree, &source.context, context, &mut bodies)
                .bind_initializer(init, &field.ty);
            // Instance initializers are checked but never run: nothing constructs objects
            if field.is_static {
                bound.static_inits.push(BoundFieldInit {
                    field: FieldRef { ty: source.id, index },
                    value,
                });
            }
        }
        program.types.push(bound);
    }

    let declaration_diagnostics = declarations.into_vec();
    let body_diagnostics = bodies.into_vec();
    debug!(
        "analyzed {} types: {} declaration and {} body diagnostics",
        program.types.len(),
        declaration_diagnostics.len(),
        body_diagnostics.len()
    );
    Analysis {
        table,
        program,
        entry_point,
        declaration_diagnostics,
        body_diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::bound::{BoundExprKind, BoundStmtKind};
    use crate::sema::types::ConstValue;
    use pretty_assertions::assert_eq;

    fn analyze_one(source: &str) -> Analysis {
        analyze(&[SyntaxTree::parse(source)], &[msvm::corlib::image()], false, None)
    }

    fn body_ids(source: &str) -> Vec<&'static str> {
        analyze_one(source).body_diagnostics.iter().map(|d| d.id()).collect()
    }

    #[test]
    fn test_constant_folding_in_return() {
        let analysis = analyze_one("public class Calculator { public static object Evaluate() { return 6 * 7; } }");
        assert!(analysis.body_diagnostics.is_empty());
        let body = &analysis.program.types[0].methods[0].body;
        let BoundStmtKind::Block(stmts) = &body.kind else {
            panic!("expected block");
        };
        let BoundStmtKind::Return(Some(value)) = &stmts[0].kind else {
            panic!("expected return");
        };
        assert_eq!(value.kind, BoundExprKind::Const(ConstValue::Int(42)));
        assert_eq!(value.ty, Ty::Int);
    }

    #[test]
    fn test_binding_errors() {
        assert_eq!(body_ids("class P { static void F() { y = 1; } }"), vec!["CS0103"]);
        assert_eq!(body_ids("class P { static void F() { int x = \"s\"; x++; } }"), vec!["CS0029"]);
        assert_eq!(body_ids("class P { static void F() { bool b = 1 + true; b = !b; } }"), vec!["CS0019"]);
        assert_eq!(body_ids("class P { static int F() { return; } }"), vec!["CS0126"]);
        assert_eq!(body_ids("class P { static void F() { break; } }"), vec!["CS0139"]);
        assert_eq!(body_ids("class P { static void F() { int a = 1 / 0; a++; } }"), vec!["CS0020"]);
    }

    #[test]
    fn test_calls_and_members() {
        assert_eq!(body_ids("class P { static void F() { System.Console.WriteLine(1); } }"), Vec::<&str>::new());
        assert_eq!(body_ids("class P { static void F() { Console.WriteLine(); } }"), vec!["CS0103"]);
        assert_eq!(
            body_ids("using System; class P { static void F() { Console.WriteLine(1, 2, 3); } }"),
            vec!["CS1501"]
        );
        assert_eq!(
            body_ids("using System; class P { static void F() { int n = Math.Abs(\"x\"); n++; } }"),
            vec!["CS1503"]
        );
        assert_eq!(body_ids("class P { int count; static void F() { count = 1; } }"), vec!["CS0120"]);
        assert_eq!(body_ids("class P { static void F() { string s = \"ab\"; int n = s.Length; n++; } }"), Vec::<&str>::new());
    }

    #[test]
    fn test_locals() {
        assert_eq!(body_ids("class P { static void F() { int x; } }"), vec!["CS0168"]);
        assert_eq!(body_ids("class P { static void F() { int x = 1; } }"), vec!["CS0219"]);
        assert_eq!(body_ids("class P { static void F() { int x = 1; int x = 2; x++; } }"), vec!["CS0128"]);
        assert_eq!(body_ids("class P { static void F(int x) { int x = 2; } }"), vec!["CS0136"]);
        assert_eq!(body_ids("class P { static void F() { var v = null; } }"), vec!["CS0815"]);
    }
}
