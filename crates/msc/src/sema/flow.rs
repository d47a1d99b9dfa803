
//! Reachability over bound method bodies
//!
//! Reports unreachable statements (CS0162) and non-void methods whose
//! end can be reached (CS0161). Constant conditions are honored, so
//! `while (true)` without a `break` never completes normally.

use super::bound::{BoundMethod, BoundStmt, BoundStmtKind};
use super::symbols::SymbolTable;
use super::types::Ty;
use crate::common::{ensure_sufficient_stack, Span};
use crate::diagnostics::{DiagnosticBag, ErrorCode};
use crate::syntax::SyntaxTree;

struct Flow<'a> {
    tree: &'a SyntaxTree,
    diagnostics: &'a mut DiagnosticBag,
    /// One entry per enclosing loop: whether a reachable `break` targets it
    loops: Vec<bool>,
}

/// Check one method body
pub(crate) fn check_method(
    table: &SymbolTable,
    tree: &SyntaxTree,
    method: &BoundMethod,
    diagnostics: &mut DiagnosticBag,
) {
    let mut flow = Flow {
        tree,
        diagnostics,
        loops: Vec::new(),
    };
    let end_reachable = flow.visit(&method.body, true);

    let symbol = &table.get(method.method.ty).methods[method.method.index];
    if end_reachable && symbol.ret != Ty::Void && !symbol.ret.is_error() {
        if let Some(decl) = symbol.decl {
            let args = vec![table.method_display(method.method.ty, method.method.index)];
            flow.diagnostics
                .report_with(ErrorCode::NotAllCodePathsReturn, tree, decl.name_span, args);
        }
    }
}

/// First statement worth warning about in an unreachable region
fn first_reportable(stmt: &BoundStmt) -> Option<Span> {
    match &stmt.kind {
        BoundStmtKind::Local { init: None, .. } | BoundStmtKind::Empty => None,
        BoundStmtKind::Block(stmts) => stmts.iter().find_map(first_reportable),
        _ => Some(stmt.span),
    }
}

impl Flow<'_> {
    /// Warn if `stmt` starts an unreachable region; `false` if nothing to flag
    fn warn_unreachable(&mut self, stmt: &BoundStmt) -> bool {
        match first_reportable(stmt) {
            Some(span) => {
                self.diagnostics.report(ErrorCode::UnreachableCode, self.tree, span);
                true
            }
            None => false,
        }
    }

    /// Visit a statement entered with the given reachability.
    /// Returns whether its end is reachable.
    fn visit(&mut self, stmt: &BoundStmt, reachable: bool) -> bool {
        ensure_sufficient_stack(|| {
            match &stmt.kind {
                BoundStmtKind::Block(stmts) => {
                    let mut live = reachable;
                    let mut warned = !reachable;
                    for stmt in stmts {
                        if !live && !warned {
                            warned = self.warn_unreachable(stmt);
                        }
                        live = self.visit(stmt, live);
                    }
                    live
                }
                BoundStmtKind::Local { .. } | BoundStmtKind::Expr(_) | BoundStmtKind::Empty => reachable,
                BoundStmtKind::Return(_) | BoundStmtKind::Continue => false,
                BoundStmtKind::Break => {
                    if reachable {
                        if let Some(target) = self.loops.last_mut() {
                            *target = true;
                        }
                    }
                    false
                }
                BoundStmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    let constant = condition.const_value().and_then(|c| c.as_bool());
                    let then_end = self.branch(then_branch, reachable, reachable && constant != Some(false));
                    let else_live = reachable && constant != Some(true);
                    let else_end = match else_branch {
                        Some(stmt) => self.branch(stmt, reachable, else_live),
                        None => else_live,
                    };
                    then_end || else_end
                }
                BoundStmtKind::While { condition, body } => {
                    let constant = condition.const_value().and_then(|c| c.as_bool());
                    self.loop_body(body, reachable, constant)
                }
                BoundStmtKind::For {
                    init,
                    condition,
                    body,
                    ..
                } => {
                    let mut live = reachable;
                    for stmt in init {
                        live = self.visit(stmt, live);
                    }
                    let constant = match condition {
                        Some(condition) => condition.const_value().and_then(|c| c.as_bool()),
                        None => Some(true),
                    };
                    self.loop_body(body, live, constant)
                }
            }
        })
    }

    fn branch(&mut self, stmt: &BoundStmt, parent_reachable: bool, reachable: bool) -> bool {
        if parent_reachable && !reachable {
            self.warn_unreachable(stmt);
        }
        self.visit(stmt, reachable)
    }

    fn loop_body(&mut self, body: &BoundStmt, reachable: bool, constant: Option<bool>) -> bool {
        self.loops.push(false);
        self.branch(body, reachable, reachable && constant != Some(false));
        let broke = self.loops.pop().unwrap_or(false);
        (reachable && constant != Some(true)) || broke
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::analyze;
    use crate::syntax::SyntaxTree;
    use pretty_assertions::assert_eq;

    fn warnings(body: &str) -> Vec<&'static str> {
        let source = format!("class P {{ static int F(int n) {{ {} }} }}", body);
        let tree = SyntaxTree::parse(source);
        let analysis = analyze(&[tree], &[msvm::corlib::image()], false, None);
        analysis
            .body_diagnostics
            .iter()
            .filter(|d| matches!(d.id(), "CS0161" | "CS0162"))
            .map(|d| d.id())
            .collect()
    }

    #[test]
    fn test_missing_return() {
        assert_eq!(warnings(""), vec!["CS0161"]);
        assert_eq!(warnings("if (n > 0) return 1;"), vec!["CS0161"]);
        assert_eq!(warnings("if (n > 0) return 1; else return 2;"), Vec::<&str>::new());
    }

    #[test]
    fn test_infinite_loops_never_complete() {
        assert_eq!(warnings("while (true) { }"), Vec::<&str>::new());
        assert_eq!(warnings("for (;;) { }"), Vec::<&str>::new());
        assert_eq!(warnings("while (true) { break; }"), vec!["CS0161"]);
    }

    #[test]
    fn test_unreachable_code() {
        assert_eq!(warnings("return 1; n = 2; n = 3;"), vec!["CS0162"]);
        assert_eq!(warnings("if (false) { n = 1; } return n;"), vec!["CS0162"]);
        assert_eq!(warnings("return 1; int unused;"), Vec::<&str>::new());
    }
}
