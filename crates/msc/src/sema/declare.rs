//! Declaration pass: registers source types and member signatures

use log::trace;

use super::symbols::{
    qualify, Access, FieldSymbol, LookupContext, MethodSymbol, NameLookup, ParamSymbol,
    SourceDecl, SymbolTable, TypeOrigin, TypeSymbol,
};
use super::types::{Ty, TypeId};
use crate::common::Span;
use crate::diagnostics::{DiagnosticBag, ErrorCode};
use crate::syntax::ast::*;
use crate::syntax::SyntaxTree;

/// A source class with the syntax behind each of its members
pub(crate) struct SourceType<'a> {
    pub id: TypeId,
    pub tree: usize,
    pub decl: &'a ClassDecl,
    pub context: LookupContext,
    /// Aligned with the symbol's `methods`
    pub methods: Vec<&'a MethodDecl>,
    /// Aligned with the symbol's `fields`
    pub fields: Vec<&'a VarDeclarator>,
}

struct PendingUsing<'a> {
    tree: usize,
    using: &'a UsingDirective,
}

/// Register every class in `trees` and resolve member signatures
pub(crate) fn declare<'a>(
    trees: &'a [SyntaxTree],
    table: &mut SymbolTable,
    diagnostics: &mut DiagnosticBag,
) -> Vec<SourceType<'a>> {
    let mut types = Vec::new();
    let mut usings = Vec::new();

    for (index, tree) in trees.iter().enumerate() {
        let root = tree.root();
        let context = LookupContext {
            namespace: String::new(),
            usings: using_names(&root.usings),
        };
        usings.extend(root.usings.iter().map(|using| PendingUsing { tree: index, using }));
        declare_members(
            trees,
            index,
            &root.members,
            &context,
            table,
            diagnostics,
            &mut types,
            &mut usings,
        );
    }

    for pending in &usings {
        let name = dotted(&pending.using.name);
        if !name.is_empty() && !table.is_namespace(&name) {
            let span = name_span(&pending.using.name);
            diagnostics.report_with(ErrorCode::TypeNotFound, &trees[pending.tree], span, vec![name]);
        }
    }

    for source in &mut types {
        declare_type_members(&trees[source.tree], source, table, diagnostics);
    }

    trace!("declared {} source types", types.len());
    types
}

#[allow(clippy::too_many_arguments)]
fn declare_members<'a>(
    trees: &'a [SyntaxTree],
    tree_index: usize,
    members: &'a [NamespaceMember],
    context: &LookupContext,
    table: &mut SymbolTable,
    diagnostics: &mut DiagnosticBag,
    types: &mut Vec<SourceType<'a>>,
    usings: &mut Vec<PendingUsing<'a>>,
) {
    let tree = &trees[tree_index];
    for member in members {
        match member {
            NamespaceMember::Namespace(ns) => {
                let mut inner = LookupContext {
                    namespace: qualify(&context.namespace, &ns.dotted_name()),
                    usings: context.usings.clone(),
                };
                inner.usings.extend(using_names(&ns.usings));
                usings.extend(ns.usings.iter().map(|using| PendingUsing {
                    tree: tree_index,
                    using,
                }));
                declare_members(
                    trees,
                    tree_index,
                    &ns.members,
                    &inner,
                    table,
                    diagnostics,
                    types,
                    usings,
                );
            }
            NamespaceMember::Class(class) => {
                if class.name.is_missing() {
                    continue;
                }
                let full_name = qualify(&context.namespace, &class.name.name);
                let access = if class.modifiers.is_public() {
                    Access::Public
                } else {
                    Access::Internal
                };
                let origin = TypeOrigin::Source(SourceDecl {
                    tree: tree_index,
                    name_span: class.name.span,
                });
                let Some(id) = table.add_type(TypeSymbol::new(full_name, access, origin)) else {
                    let namespace = if context.namespace.is_empty() {
                        "<global namespace>".to_string()
                    } else {
                        context.namespace.clone()
                    };
                    diagnostics.report_with(
                        ErrorCode::DuplicateNameInNamespace,
                        tree,
                        class.name.span,
                        vec![namespace, class.name.name.clone()],
                    );
                    continue;
                };
                if table.predefined(PredefinedType::Object).is_none() {
                    diagnostics.report_with(
                        ErrorCode::PredefinedTypeNotFound,
                        tree,
                        class.name.span,
                        vec![PredefinedType::Object.metadata_name().to_string()],
                    );
                }
                types.push(SourceType {
                    id,
                    tree: tree_index,
                    decl: class,
                    context: context.clone(),
                    methods: Vec::new(),
                    fields: Vec::new(),
                });
            }
        }
    }
}

fn member_access(modifiers: &Modifiers) -> Access {
    if modifiers.is_public() {
        Access::Public
    } else if modifiers.has(ModifierKind::Internal) {
        Access::Internal
    } else {
        Access::Private
    }
}

fn declare_type_members<'a>(
    tree: &SyntaxTree,
    source: &mut SourceType<'a>,
    table: &mut SymbolTable,
    diagnostics: &mut DiagnosticBag,
) {
    let decl: &'a ClassDecl = source.decl;
    let type_name = table.get(source.id).full_name.clone();
    let simple_name = decl.name.name.clone();

    for member in &decl.members {
        match member {
            MemberDecl::Method(method) => {
                if method.name.is_missing() {
                    continue;
                }
                let ret = resolve_type(table, &source.context, &method.return_type, tree, diagnostics);
                let mut params: Vec<ParamSymbol> = Vec::new();
                for param in &method.params {
                    let ty = resolve_type(table, &source.context, &param.ty, tree, diagnostics);
                    if ty == Ty::Void {
                        diagnostics.report(ErrorCode::VoidParameter, tree, param.ty.span);
                    }
                    if param.name.is_missing() {
                        continue;
                    }
                    if params.iter().any(|p| p.name == param.name.name) {
                        diagnostics.report_with(
                            ErrorCode::DuplicateParamName,
                            tree,
                            param.name.span,
                            vec![param.name.name.clone()],
                        );
                    }
                    params.push(ParamSymbol {
                        name: param.name.name.clone(),
                        ty,
                    });
                }

                let name = &method.name;
                let symbol = table.get(source.id);
                if name.name == simple_name {
                    diagnostics.report_with(
                        ErrorCode::MemberNameSameAsType,
                        tree,
                        name.span,
                        vec![name.name.clone()],
                    );
                } else if symbol.field_named(&name.name).is_some() {
                    diagnostics.report_with(
                        ErrorCode::DuplicateNameInType,
                        tree,
                        name.span,
                        vec![type_name.clone(), name.name.clone()],
                    );
                } else if symbol.methods_named(&name.name).any(|(_, m)| {
                    m.params.len() == params.len()
                        && m.params.iter().zip(&params).all(|(a, b)| a.ty == b.ty)
                }) {
                    diagnostics.report_with(
                        ErrorCode::MemberAlreadyExists,
                        tree,
                        name.span,
                        vec![type_name.clone(), name.name.clone()],
                    );
                }

                table.get_mut(source.id).methods.push(MethodSymbol {
                    name: name.name.clone(),
                    params,
                    ret,
                    is_static: method.modifiers.is_static(),
                    access: member_access(&method.modifiers),
                    decl: Some(SourceDecl {
                        tree: source.tree,
                        name_span: name.span,
                    }),
                });
                source.methods.push(method);
            }
            MemberDecl::Field(field) => {
                let ty = resolve_type(table, &source.context, &field.ty, tree, diagnostics);
                if ty == Ty::Void {
                    diagnostics.report(ErrorCode::VoidField, tree, field.ty.span);
                }
                for declarator in &field.declarators {
                    let name = &declarator.name;
                    if name.is_missing() {
                        continue;
                    }
                    let symbol = table.get(source.id);
                    if name.name == simple_name {
                        diagnostics.report_with(
                            ErrorCode::MemberNameSameAsType,
                            tree,
                            name.span,
                            vec![name.name.clone()],
                        );
                    } else if symbol.field_named(&name.name).is_some()
                        || symbol.methods_named(&name.name).next().is_some()
                    {
                        diagnostics.report_with(
                            ErrorCode::DuplicateNameInType,
                            tree,
                            name.span,
                            vec![type_name.clone(), name.name.clone()],
                        );
                        continue;
                    }
                    table.get_mut(source.id).fields.push(FieldSymbol {
                        name: name.name.clone(),
                        ty: ty.clone(),
                        is_static: field.modifiers.is_static(),
                        access: member_access(&field.modifiers),
                        decl: Some(SourceDecl {
                            tree: source.tree,
                            name_span: name.span,
                        }),
                    });
                    source.fields.push(declarator);
                }
            }
        }
    }
}

/// Resolve a type as written in source, reporting unknown names
pub(crate) fn resolve_type(
    table: &SymbolTable,
    context: &LookupContext,
    syntax: &TypeSyntax,
    tree: &SyntaxTree,
    diagnostics: &mut DiagnosticBag,
) -> Ty {
    match &syntax.kind {
        TypeSyntaxKind::Predefined(predefined) => {
            if table.predefined(*predefined).is_none() {
                diagnostics.report_with(
                    ErrorCode::PredefinedTypeNotFound,
                    tree,
                    syntax.span,
                    vec![predefined.metadata_name().to_string()],
                );
            }
            match predefined {
                PredefinedType::Void => Ty::Void,
                PredefinedType::Int => Ty::Int,
                PredefinedType::Bool => Ty::Bool,
                PredefinedType::String => Ty::String,
                PredefinedType::Object => Ty::Object,
            }
        }
        TypeSyntaxKind::Array(element) => {
            let element = resolve_type(table, context, element, tree, diagnostics);
            if element.is_error() {
                Ty::Error
            } else {
                Ty::Array(Box::new(element))
            }
        }
        TypeSyntaxKind::Named(parts) => match resolve_qualified(table, context, parts, tree, diagnostics) {
            Some(NameLookup::Type(id)) => table.ty_of(id),
            Some(NameLookup::Namespace(ns)) => {
                diagnostics.report_with(
                    ErrorCode::BadSkKnown,
                    tree,
                    syntax.span,
                    vec![ns, "namespace".to_string()],
                );
                Ty::Error
            }
            Some(NameLookup::NotFound) | None => Ty::Error,
        },
        TypeSyntaxKind::Missing => Ty::Error,
    }
}

/// Resolve `A.B.C` part by part; `None` once an error has been reported
pub(crate) fn resolve_qualified(
    table: &SymbolTable,
    context: &LookupContext,
    parts: &[Ident],
    tree: &SyntaxTree,
    diagnostics: &mut DiagnosticBag,
) -> Option<NameLookup> {
    let (first, rest) = parts.split_first()?;
    if first.is_missing() {
        return None;
    }
    let mut current = context.lookup_simple(table, &first.name);
    if current == NameLookup::NotFound {
        diagnostics.report_with(ErrorCode::TypeNotFound, tree, first.span, vec![first.name.clone()]);
        return None;
    }
    for part in rest {
        if part.is_missing() {
            return None;
        }
        let container = match &current {
            NameLookup::Namespace(ns) => ns.clone(),
            NameLookup::Type(id) => table.get(*id).full_name.clone(),
            NameLookup::NotFound => return None,
        };
        current = match &current {
            NameLookup::Namespace(ns) => LookupContext::lookup_in(table, ns, &part.name),
            _ => NameLookup::NotFound,
        };
        if current == NameLookup::NotFound {
            diagnostics.report_with(
                ErrorCode::TypeNotInNamespace,
                tree,
                part.span,
                vec![part.name.clone(), container],
            );
            return None;
        }
    }
    Some(current)
}

fn using_names(usings: &[UsingDirective]) -> Vec<String> {
    usings.iter().map(|u| dotted(&u.name)).collect()
}

fn dotted(parts: &[Ident]) -> String {
    let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
    names.join(".")
}

fn name_span(parts: &[Ident]) -> Span {
    parts
        .iter()
        .map(|p| p.span)
        .reduce(Span::merge)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;
    use pretty_assertions::assert_eq;

    fn declare_source(source: &str) -> (SymbolTable, Vec<Diagnostic>) {
        let trees = vec![SyntaxTree::parse(source)];
        let image = msvm::corlib::image();
        let mut table = SymbolTable::new();
        table.import_types(&image);
        table.import_members(&image);
        let mut diagnostics = DiagnosticBag::new();
        declare(&trees, &mut table, &mut diagnostics);
        (table, diagnostics.into_vec())
    }

    fn ids(diagnostics: &[Diagnostic]) -> Vec<&'static str> {
        diagnostics.iter().map(Diagnostic::id).collect()
    }

    #[test]
    fn test_types_and_members_are_registered() {
        let (table, diagnostics) = declare_source(
            "namespace Demo { public class Shapes { static int count; public static int Area(int w, int h) { return w * h; } } }",
        );
        assert!(diagnostics.is_empty());
        let id = table.lookup("Demo.Shapes").unwrap();
        let shapes = table.get(id);
        assert_eq!(shapes.access, Access::Public);
        assert_eq!(shapes.fields[0].access, Access::Private);
        assert_eq!(table.method_display(id, 0), "Demo.Shapes.Area(int, int)");
    }

    #[test]
    fn test_duplicates_are_reported() {
        let (_, diagnostics) = declare_source(
            "class A { void F(int x, int x) {} void F(int a, int b) {} int F; int A; } class A {}",
        );
        assert_eq!(ids(&diagnostics), vec!["CS0101", "CS0100", "CS0111", "CS0102", "CS0542"]);
    }

    #[test]
    fn test_unknown_types_and_usings() {
        let (_, diagnostics) = declare_source("using Nope; class A { Widget w; System.Nothing n; void F(void v) {} }");
        assert_eq!(ids(&diagnostics), vec!["CS0246", "CS0246", "CS0234", "CS1536"]);
        assert_eq!(diagnostics[0].arguments(), ["Nope".to_string()]);
        assert_eq!(diagnostics[1].arguments(), ["Widget".to_string()]);
    }

    #[test]
    fn test_missing_corlib() {
        let trees = vec![SyntaxTree::parse("class A { int x; }")];
        let mut table = SymbolTable::new();
        let mut diagnostics = DiagnosticBag::new();
        declare(&trees, &mut table, &mut diagnostics);
        let diagnostics = diagnostics.into_vec();
        assert_eq!(ids(&diagnostics), vec!["CS0518", "CS0518"]);
        assert_eq!(diagnostics[0].arguments(), ["System.Object".to_string()]);
    }
}
