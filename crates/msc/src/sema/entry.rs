//! Entry point selection for executables

use log::debug;

use super::bound::MethodRef;
use super::symbols::{MethodSymbol, SymbolTable};
use super::types::Ty;
use crate::diagnostics::{DiagnosticBag, ErrorCode, Location};
use crate::syntax::SyntaxTree;

fn has_entry_signature(method: &MethodSymbol) -> bool {
    let returns = matches!(method.ret, Ty::Void | Ty::Int);
    let params = match method.params.as_slice() {
        [] => true,
        [only] => only.ty == Ty::Array(Box::new(Ty::String)),
        _ => false,
    };
    returns && params
}

/// Find the single static `Main` of an executable.
///
/// `main_type` restricts the search to one type, given by full name.
pub(crate) fn find_entry_point(
    table: &SymbolTable,
    trees: &[SyntaxTree],
    main_type: Option<&str>,
    diagnostics: &mut DiagnosticBag,
) -> Option<MethodRef> {
    let restrict = match main_type {
        Some(name) => match table.lookup(name).filter(|id| table.get(*id).is_source()) {
            Some(id) => Some(id),
            None => {
                diagnostics.add(ErrorCode::MainTypeNotFound, Location::None, vec![name.to_string()]);
                return None;
            }
        },
        None => None,
    };

    let mut candidates = Vec::new();
    for (id, ty) in table.source_types() {
        for (index, method) in ty.methods_named("Main") {
            if !method.is_static {
                continue;
            }
            let Some(decl) = method.decl else { continue };
            if !has_entry_signature(method) {
                let args = vec![table.method_display(id, index)];
                diagnostics.report_with(ErrorCode::InvalidMainSig, &trees[decl.tree], decl.name_span, args);
                continue;
            }
            if restrict.is_none_or(|only| only == id) {
                candidates.push((MethodRef { ty: id, index }, decl));
            }
        }
    }

    match candidates.as_slice() {
        [(entry, _)] => {
            debug!("entry point: {}", table.method_display(entry.ty, entry.index));
            Some(*entry)
        }
        [] => {
            match main_type {
                Some(name) => diagnostics.add(ErrorCode::MainTypeNoMain, Location::None, vec![name.to_string()]),
                None => diagnostics.add(ErrorCode::NoEntryPoint, Location::None, Vec::new()),
            }
            None
        }
        many => {
            for (_, decl) in many {
                diagnostics.report(ErrorCode::MultipleEntryPoints, &trees[decl.tree], decl.name_span);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::analyze;
    use pretty_assertions::assert_eq;

    fn entry_ids(source: &str, main_type: Option<&str>) -> Vec<&'static str> {
        let trees = [SyntaxTree::parse(source)];
        let analysis = analyze(&trees, &[msvm::corlib::image()], true, main_type);
        analysis.declaration_diagnostics.iter().map(|d| d.id()).collect()
    }

    #[test]
    fn test_single_main() {
        assert_eq!(entry_ids("class P { static void Main() { } }", None), Vec::<&str>::new());
        assert_eq!(
            entry_ids("class P { static int Main(string[] args) { return 0; } }", None),
            Vec::<&str>::new()
        );
    }

    #[test]
    fn test_missing_and_ambiguous_main() {
        assert_eq!(entry_ids("class P { static void Run() { } }", None), vec!["CS5001"]);
        assert_eq!(
            entry_ids("class A { static void Main() { } } class B { static void Main() { } }", None),
            vec!["CS0017", "CS0017"]
        );
        assert_eq!(
            entry_ids("class A { static void Main() { } } class B { static void Main() { } }", Some("B")),
            Vec::<&str>::new()
        );
    }

    #[test]
    fn test_wrong_signature_and_main_type() {
        assert_eq!(
            entry_ids("class P { static string Main() { return null; } static void Main(string[] a) { } }", None),
            vec!["CS0028"]
        );
        assert_eq!(entry_ids("class P { static void Main() { } }", Some("Q")), vec!["CS1555"]);
        assert_eq!(
            entry_ids("class P { static void Main() { } } class Q { }", Some("Q")),
            vec!["CS1558"]
        );
    }
}
