//! Recursive descent parser
//!
//! The parser is total: every input produces a `CompilationUnit`. Missing
//! tokens are reported and synthesized, unexpected tokens are reported and
//! skipped.

use crate::common::{ensure_sufficient_stack, Span};
use crate::diagnostics::ErrorCode;
use crate::syntax::ast::*;
use crate::syntax::lexer::{Lexer, Token, TokenKind};
use crate::syntax::SyntaxError;

/// Deepest nesting of statements and expressions the parser accepts
const MAX_NESTING: usize = 256;

/// Binary operator and its precedence level, loosest first
fn binary_op(kind: &TokenKind) -> Option<(usize, BinaryOp)> {
    let op = match kind {
        TokenKind::PipePipe => (0, BinaryOp::LogicalOr),
        TokenKind::AmpAmp => (1, BinaryOp::LogicalAnd),
        TokenKind::Pipe => (2, BinaryOp::BitOr),
        TokenKind::Caret => (3, BinaryOp::BitXor),
        TokenKind::Amp => (4, BinaryOp::BitAnd),
        TokenKind::EqEq => (5, BinaryOp::Eq),
        TokenKind::NotEq => (5, BinaryOp::Ne),
        TokenKind::Lt => (6, BinaryOp::Lt),
        TokenKind::Gt => (6, BinaryOp::Gt),
        TokenKind::LtEq => (6, BinaryOp::Le),
        TokenKind::GtEq => (6, BinaryOp::Ge),
        TokenKind::LtLt => (7, BinaryOp::Shl),
        TokenKind::GtGt => (7, BinaryOp::Shr),
        TokenKind::Plus => (8, BinaryOp::Add),
        TokenKind::Minus => (8, BinaryOp::Sub),
        TokenKind::Star => (9, BinaryOp::Mul),
        TokenKind::Slash => (9, BinaryOp::Div),
        TokenKind::Percent => (9, BinaryOp::Rem),
        _ => return None,
    };
    Some(op)
}

fn compound_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::PlusEq => BinaryOp::Add,
        TokenKind::MinusEq => BinaryOp::Sub,
        TokenKind::StarEq => BinaryOp::Mul,
        TokenKind::SlashEq => BinaryOp::Div,
        TokenKind::PercentEq => BinaryOp::Rem,
        TokenKind::AmpEq => BinaryOp::BitAnd,
        TokenKind::PipeEq => BinaryOp::BitOr,
        TokenKind::CaretEq => BinaryOp::BitXor,
        TokenKind::LtLtEq => BinaryOp::Shl,
        TokenKind::GtGtEq => BinaryOp::Shr,
        _ => return None,
    })
}

/// Recursive descent parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source_len: usize,
    errors: Vec<SyntaxError>,
    depth: usize,
}

impl Parser {
    /// Create a new parser for the given source
    pub fn new(source: &str) -> Self {
        let (tokens, errors) = Lexer::new(source).tokenize_all();
        Self {
            tokens,
            pos: 0,
            source_len: source.len(),
            errors,
            depth: 0,
        }
    }

    /// Parse a complete compilation unit
    pub fn parse(mut self) -> (CompilationUnit, Vec<SyntaxError>) {
        let usings = self.parse_usings();
        let members = self.parse_namespace_members(false);
        let unit = CompilationUnit {
            usings,
            members,
            span: Span::new(0, self.source_len),
        };
        let mut errors = self.errors;
        errors.sort_by_key(|e| e.span.start);
        (unit, errors)
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind_at(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !self.at_end() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// End of the last consumed token; missing tokens are reported here
    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            Span::at(0)
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn error(&mut self, code: ErrorCode, span: Span, args: Vec<String>) {
        self.errors.push(SyntaxError::new(code, span, args));
    }

    fn error_missing(&mut self, code: ErrorCode, args: Vec<String>) {
        let at = Span::at(self.prev_end());
        self.error(code, at, args);
    }

    fn expect(&mut self, kind: &TokenKind, code: ErrorCode) -> bool {
        if self.match_token(kind) {
            true
        } else {
            let args = if code == ErrorCode::SyntaxErrorExpected {
                vec![kind.text().to_string()]
            } else {
                Vec::new()
            };
            self.error_missing(code, args);
            false
        }
    }

    /// Run a nested parse one level deeper, or report CS8078 and skip the
    /// nested construct when the limit is reached
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> T,
        fallback: impl FnOnce(&mut Self, Span) -> T,
    ) -> T {
        if self.depth >= MAX_NESTING {
            let at = self.current().span;
            self.error(ErrorCode::TooComplex, at, Vec::new());
            self.skip_nested();
            return fallback(self, Span::at(at.start));
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| parse(self));
        self.depth -= 1;
        result
    }

    /// Skip to the `;`, `,` or closing bracket that ends the enclosing
    /// construct, stepping over balanced brackets
    fn skip_nested(&mut self) {
        let mut open = 0usize;
        loop {
            match self.current().kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => open += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if open == 0 {
                        return;
                    }
                    open -= 1;
                }
                TokenKind::Semi | TokenKind::Comma if open == 0 => return,
                TokenKind::Eof => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_ident(&mut self) -> Ident {
        if let TokenKind::Identifier(name) = &self.current().kind {
            let ident = Ident::new(name.clone(), self.current().span);
            self.advance();
            ident
        } else {
            let span = self.current().span;
            self.error(ErrorCode::IdentifierExpected, span, Vec::new());
            Ident::missing(Span::at(self.prev_end()))
        }
    }

    fn parse_qualified_name(&mut self) -> Vec<Ident> {
        let mut parts = vec![self.parse_ident()];
        while self.check(&TokenKind::Dot) && matches!(self.kind_at(1), TokenKind::Identifier(_)) {
            self.advance();
            parts.push(self.parse_ident());
        }
        parts
    }

    /// Tokens that begin a type or namespace member
    fn at_declaration_start(&self) -> bool {
        let kind = &self.current().kind;
        kind.is_modifier() || matches!(kind, TokenKind::Class | TokenKind::Namespace)
    }

    fn can_start_type(&self) -> bool {
        let kind = &self.current().kind;
        kind.is_predefined_type() || matches!(kind, TokenKind::Identifier(_))
    }

    // =========================================================================
    // Namespaces and types
    // =========================================================================

    fn parse_usings(&mut self) -> Vec<UsingDirective> {
        let mut usings = Vec::new();
        while self.check(&TokenKind::Using) {
            let start = self.advance().span;
            let name = self.parse_qualified_name();
            self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);
            usings.push(UsingDirective {
                name,
                span: start.merge(self.prev_span()),
            });
        }
        usings
    }

    fn parse_namespace_members(&mut self, in_namespace: bool) -> Vec<NamespaceMember> {
        let mut members = Vec::new();
        loop {
            match &self.current().kind {
                TokenKind::Eof => break,
                TokenKind::RBrace if in_namespace => break,
                TokenKind::Namespace => {
                    let namespace = self.nested(|parser| Some(parser.parse_namespace()), |_, _| None);
                    members.extend(namespace.map(NamespaceMember::Namespace));
                }
                kind if kind.is_modifier() || matches!(kind, TokenKind::Class) => {
                    if let Some(class) = self.parse_class() {
                        members.push(NamespaceMember::Class(class));
                    }
                }
                _ => {
                    let span = self.current().span;
                    self.error(ErrorCode::NamespaceMemberExpected, span, Vec::new());
                    self.skip_to_namespace_member(in_namespace);
                }
            }
        }
        members
    }

    fn skip_to_namespace_member(&mut self, in_namespace: bool) {
        self.advance();
        while !self.at_end() && !self.at_declaration_start() {
            if in_namespace && self.check(&TokenKind::RBrace) {
                break;
            }
            self.advance();
        }
    }

    fn parse_namespace(&mut self) -> NamespaceDecl {
        let start = self.advance().span;
        let name = self.parse_qualified_name();
        let mut usings = Vec::new();
        let mut members = Vec::new();
        if self.expect(&TokenKind::LBrace, ErrorCode::OpenBraceExpected) {
            usings = self.parse_usings();
            members = self.parse_namespace_members(true);
            self.expect(&TokenKind::RBrace, ErrorCode::CloseBraceExpected);
        }
        NamespaceDecl {
            name,
            usings,
            members,
            span: start.merge(self.prev_span()),
        }
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            let kind = match self.current().kind {
                TokenKind::Public => ModifierKind::Public,
                TokenKind::Private => ModifierKind::Private,
                TokenKind::Internal => ModifierKind::Internal,
                TokenKind::Protected => ModifierKind::Protected,
                TokenKind::Static => ModifierKind::Static,
                _ => break,
            };
            let span = self.advance().span;
            if modifiers.has(kind) {
                self.error(ErrorCode::DuplicateModifier, span, vec![kind.keyword().to_string()]);
            } else {
                modifiers.0.push(Modifier { kind, span });
            }
        }
        modifiers
    }

    fn parse_class(&mut self) -> Option<ClassDecl> {
        let start = self.current().span;
        let modifiers = self.parse_modifiers();
        if !self.check(&TokenKind::Class) {
            let span = self.current().span;
            self.error(ErrorCode::NamespaceMemberExpected, span, Vec::new());
            if !self.at_end() && !self.at_declaration_start() {
                self.skip_to_namespace_member(true);
            }
            return None;
        }
        self.advance();
        let name = self.parse_ident();

        let mut members = Vec::new();
        if self.expect(&TokenKind::LBrace, ErrorCode::OpenBraceExpected) {
            loop {
                match &self.current().kind {
                    TokenKind::RBrace => {
                        self.advance();
                        break;
                    }
                    TokenKind::Eof | TokenKind::Namespace => {
                        self.error_missing(ErrorCode::CloseBraceExpected, Vec::new());
                        break;
                    }
                    _ => {
                        let before = self.pos;
                        if let Some(member) = self.parse_member() {
                            members.push(member);
                        }
                        if self.pos == before {
                            self.advance();
                        }
                    }
                }
            }
        }

        Some(ClassDecl {
            modifiers,
            name,
            members,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_member(&mut self) -> Option<MemberDecl> {
        let start = self.current().span;
        let modifiers = self.parse_modifiers();

        if !self.can_start_type() {
            let token = self.current().clone();
            let text = if token.kind == TokenKind::Eof {
                String::new()
            } else {
                token.kind.text().to_string()
            };
            self.error(ErrorCode::InvalidMemberDecl, token.span, vec![text]);
            if !matches!(token.kind, TokenKind::RBrace | TokenKind::Eof) {
                self.advance();
            }
            return None;
        }

        let ty = self.parse_type();
        let name = self.parse_ident();

        if self.check(&TokenKind::LParen) {
            let params = self.parse_parameter_list();
            let body = if self.check(&TokenKind::LBrace) {
                self.parse_block()
            } else {
                self.error_missing(ErrorCode::OpenBraceExpected, Vec::new());
                self.match_token(&TokenKind::Semi);
                Block::new(Vec::new(), Span::at(self.prev_end()))
            };
            return Some(MemberDecl::Method(MethodDecl {
                modifiers,
                return_type: ty,
                name,
                params,
                span: start.merge(body.span),
                body,
            }));
        }

        let declarators = self.parse_declarators_after(name);
        self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);
        Some(MemberDecl::Field(FieldDecl {
            modifiers,
            ty,
            declarators,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_parameter_list(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        self.advance(); // (
        if !self.check(&TokenKind::RParen) {
            loop {
                if !self.can_start_type() {
                    let span = self.current().span;
                    self.error(ErrorCode::TypeExpected, span, Vec::new());
                    break;
                }
                let ty = self.parse_type();
                let name = self.parse_ident();
                params.push(Param {
                    span: ty.span.merge(name.span),
                    ty,
                    name,
                });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, ErrorCode::CloseParenExpected);
        params
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn parse_type(&mut self) -> TypeSyntax {
        let mut ty = self.parse_non_array_type();
        while self.check(&TokenKind::LBracket) && matches!(self.kind_at(1), TokenKind::RBracket) {
            self.advance();
            let close = self.advance().span;
            let span = ty.span.merge(close);
            ty = TypeSyntax::new(TypeSyntaxKind::Array(Box::new(ty)), span);
        }
        ty
    }

    fn parse_non_array_type(&mut self) -> TypeSyntax {
        let token = self.current().clone();
        let predefined = match token.kind {
            TokenKind::Void => Some(PredefinedType::Void),
            TokenKind::Int => Some(PredefinedType::Int),
            TokenKind::Bool => Some(PredefinedType::Bool),
            TokenKind::String => Some(PredefinedType::String),
            TokenKind::Object => Some(PredefinedType::Object),
            _ => None,
        };
        if let Some(p) = predefined {
            self.advance();
            return TypeSyntax::new(TypeSyntaxKind::Predefined(p), token.span);
        }
        if matches!(token.kind, TokenKind::Identifier(_)) {
            let parts = self.parse_qualified_name();
            let span = parts
                .iter()
                .fold(token.span, |span, part| span.merge(part.span));
            return TypeSyntax::new(TypeSyntaxKind::Named(parts), span);
        }
        self.error(ErrorCode::TypeExpected, token.span, Vec::new());
        TypeSyntax::missing(Span::at(self.prev_end()))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_block(&mut self) -> Block {
        let start = self.current().span;
        self.expect(&TokenKind::LBrace, ErrorCode::OpenBraceExpected);
        let mut stmts = Vec::new();
        loop {
            if self.match_token(&TokenKind::RBrace) {
                break;
            }
            if self.at_end() || self.at_declaration_start() {
                self.error_missing(ErrorCode::CloseBraceExpected, Vec::new());
                break;
            }
            let before = self.pos;
            stmts.push(self.parse_statement());
            if self.pos == before {
                self.advance();
            }
        }
        Block::new(stmts, start.merge(self.prev_span()))
    }

    fn parse_statement(&mut self) -> Stmt {
        self.nested(Self::parse_statement_inner, |parser, span| {
            parser.match_token(&TokenKind::Semi);
            Stmt::new(StmtKind::Empty, span)
        })
    }

    fn parse_statement_inner(&mut self) -> Stmt {
        let start = self.current().span;
        let kind = match self.current().kind {
            TokenKind::LBrace => StmtKind::Block(self.parse_block()),
            TokenKind::Semi => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expression())
                };
                self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);
                StmtKind::Continue
            }
            _ if self.is_local_declaration() => {
                let decl = self.parse_local_decl();
                self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);
                StmtKind::LocalDecl(decl)
            }
            _ => {
                let before = self.pos;
                let expr = self.parse_expression();
                if self.pos == before {
                    // Nothing consumed; the term error is already reported.
                    self.advance();
                    StmtKind::Empty
                } else {
                    self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);
                    StmtKind::Expr(expr)
                }
            }
        };
        Stmt::new(kind, start.merge(self.prev_span()))
    }

    fn parse_if_statement(&mut self) -> StmtKind {
        self.advance();
        self.expect(&TokenKind::LParen, ErrorCode::SyntaxErrorExpected);
        let condition = self.parse_expression();
        self.expect(&TokenKind::RParen, ErrorCode::CloseParenExpected);
        let then_branch = Box::new(self.parse_statement());
        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()))
        } else {
            None
        };
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        }
    }

    fn parse_while_statement(&mut self) -> StmtKind {
        self.advance();
        self.expect(&TokenKind::LParen, ErrorCode::SyntaxErrorExpected);
        let condition = self.parse_expression();
        self.expect(&TokenKind::RParen, ErrorCode::CloseParenExpected);
        let body = Box::new(self.parse_statement());
        StmtKind::While { condition, body }
    }

    fn parse_for_statement(&mut self) -> StmtKind {
        self.advance();
        self.expect(&TokenKind::LParen, ErrorCode::SyntaxErrorExpected);

        let init = if self.check(&TokenKind::Semi) {
            None
        } else if self.is_local_declaration() {
            Some(ForInit::Decl(self.parse_local_decl()))
        } else {
            Some(ForInit::Exprs(self.parse_expression_list()))
        };
        self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);

        let condition = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(&TokenKind::Semi, ErrorCode::SemicolonExpected);

        let update = if self.check(&TokenKind::RParen) {
            Vec::new()
        } else {
            self.parse_expression_list()
        };
        self.expect(&TokenKind::RParen, ErrorCode::CloseParenExpected);

        let body = Box::new(self.parse_statement());
        StmtKind::For {
            init,
            condition,
            update,
            body,
        }
    }

    fn parse_expression_list(&mut self) -> Vec<Expr> {
        let mut exprs = vec![self.parse_expression()];
        while self.match_token(&TokenKind::Comma) {
            exprs.push(self.parse_expression());
        }
        exprs
    }

    /// `Type name` ahead, as opposed to an expression
    fn is_local_declaration(&self) -> bool {
        let first = self.kind_at(0);
        if first.is_predefined_type() {
            return !matches!(self.kind_at(1), TokenKind::Dot);
        }
        if !matches!(first, TokenKind::Identifier(_)) {
            return false;
        }
        let mut i = 1;
        while matches!(self.kind_at(i), TokenKind::Dot)
            && matches!(self.kind_at(i + 1), TokenKind::Identifier(_))
        {
            i += 2;
        }
        while matches!(self.kind_at(i), TokenKind::LBracket)
            && matches!(self.kind_at(i + 1), TokenKind::RBracket)
        {
            i += 2;
        }
        matches!(self.kind_at(i), TokenKind::Identifier(_))
    }

    fn parse_local_decl(&mut self) -> LocalDecl {
        let ty = self.parse_type();
        let name = self.parse_ident();
        let declarators = self.parse_declarators_after(name);
        LocalDecl { ty, declarators }
    }

    fn parse_declarators_after(&mut self, first: Ident) -> Vec<VarDeclarator> {
        let mut declarators = vec![self.parse_declarator_rest(first)];
        while self.match_token(&TokenKind::Comma) {
            let name = self.parse_ident();
            declarators.push(self.parse_declarator_rest(name));
        }
        declarators
    }

    fn parse_declarator_rest(&mut self, name: Ident) -> VarDeclarator {
        let init = if self.match_token(&TokenKind::Eq) {
            Some(self.parse_expression())
        } else {
            None
        };
        let span = init
            .as_ref()
            .map_or(name.span, |init| name.span.merge(init.span));
        VarDeclarator { name, init, span }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub(crate) fn parse_expression(&mut self) -> Expr {
        self.nested(Self::parse_assignment_expression, |_, span| Expr::missing(span))
    }

    fn parse_assignment_expression(&mut self) -> Expr {
        let target = self.parse_binary_expression(0);
        let kind = self.current().kind.clone();
        if !kind.is_assignment_op() {
            return target;
        }
        self.advance();
        let value = self.parse_expression();
        let span = target.span.merge(value.span);
        Expr::new(
            ExprKind::Assign {
                op: compound_op(&kind),
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        )
    }

    /// Operators looser than `min_level` are left to the caller
    fn parse_binary_expression(&mut self, min_level: usize) -> Expr {
        let mut left = self.parse_unary_expression();
        while let Some((level, op)) = binary_op(&self.current().kind) {
            if level < min_level {
                break;
            }
            self.advance();
            let right = self.parse_binary_expression(level + 1);
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        left
    }

    fn parse_unary_expression(&mut self) -> Expr {
        let start = self.current().span;
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let increment = self.advance().kind == TokenKind::PlusPlus;
                let operand = self.parse_unary_operand();
                let span = start.merge(operand.span);
                return Expr::new(
                    ExprKind::IncDec {
                        increment,
                        prefix: true,
                        operand: Box::new(operand),
                    },
                    span,
                );
            }
            _ => return self.parse_postfix_expression(),
        };
        self.advance();
        let operand = self.parse_unary_operand();
        let span = start.merge(operand.span);
        Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        )
    }

    fn parse_unary_operand(&mut self) -> Expr {
        self.nested(Self::parse_unary_expression, |_, span| Expr::missing(span))
    }

    fn parse_postfix_expression(&mut self) -> Expr {
        let mut expr = self.parse_primary_expression();
        loop {
            match self.current().kind {
                TokenKind::LParen => {
                    let args = self.parse_argument_list();
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.parse_ident();
                    let span = expr.span.merge(name.span);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression();
                    self.expect(&TokenKind::RBracket, ErrorCode::SyntaxErrorExpected);
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Index {
                            array: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let token = self.advance();
                    let span = expr.span.merge(token.span);
                    expr = Expr::new(
                        ExprKind::IncDec {
                            increment: token.kind == TokenKind::PlusPlus,
                            prefix: false,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                _ => return expr,
            }
        }
    }

    fn parse_argument_list(&mut self) -> Vec<Expr> {
        self.advance(); // (
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression());
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, ErrorCode::CloseParenExpected);
        args
    }

    fn parse_primary_expression(&mut self) -> Expr {
        let token = self.current().clone();
        let kind = match &token.kind {
            TokenKind::IntLiteral(text) => {
                self.advance();
                ExprKind::IntLiteral(self.parse_int_literal(text, 10, token.span))
            }
            TokenKind::HexLiteral(text) => {
                self.advance();
                ExprKind::IntLiteral(self.parse_int_literal(&text[2..], 16, token.span))
            }
            TokenKind::StringLiteral(raw) => {
                self.advance();
                ExprKind::StringLiteral(self.parse_string_literal(raw, token.span))
            }
            TokenKind::True => {
                self.advance();
                ExprKind::BoolLiteral(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::BoolLiteral(false)
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::Identifier(name) => {
                self.advance();
                ExprKind::Name(Ident::new(name.clone(), token.span))
            }
            kind if kind.is_predefined_type() && matches!(self.kind_at(1), TokenKind::Dot) => {
                let ty = match kind {
                    TokenKind::Int => PredefinedType::Int,
                    TokenKind::Bool => PredefinedType::Bool,
                    TokenKind::String => PredefinedType::String,
                    TokenKind::Object => PredefinedType::Object,
                    _ => PredefinedType::Void,
                };
                self.advance();
                ExprKind::PredefinedType(ty)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression();
                self.expect(&TokenKind::RParen, ErrorCode::CloseParenExpected);
                return Expr::new(inner.kind, token.span.merge(self.prev_span()));
            }
            TokenKind::New => return self.parse_new_expression(),
            other => {
                let text = other.text().to_string();
                self.error(ErrorCode::InvalidExprTerm, token.span, vec![text]);
                let sync = matches!(
                    other,
                    TokenKind::Semi
                        | TokenKind::RParen
                        | TokenKind::RBracket
                        | TokenKind::RBrace
                        | TokenKind::Comma
                        | TokenKind::Eof
                );
                if sync {
                    return Expr::missing(Span::at(token.span.start));
                }
                self.advance();
                ExprKind::Missing
            }
        };
        Expr::new(kind, token.span)
    }

    fn parse_new_expression(&mut self) -> Expr {
        let start = self.advance().span;
        let mut element = self.parse_non_array_type();
        if !self.match_token(&TokenKind::LBracket) {
            self.error_missing(ErrorCode::SyntaxErrorExpected, vec!["[".to_string()]);
            if self.check(&TokenKind::LParen) {
                self.parse_argument_list();
            }
            return Expr::missing(start.merge(self.prev_span()));
        }
        let length = self.parse_expression();
        self.expect(&TokenKind::RBracket, ErrorCode::SyntaxErrorExpected);
        // `new int[n][]` creates an array of `int[]`
        while self.check(&TokenKind::LBracket) && matches!(self.kind_at(1), TokenKind::RBracket) {
            self.advance();
            let close = self.advance().span;
            let span = element.span.merge(close);
            element = TypeSyntax::new(TypeSyntaxKind::Array(Box::new(element)), span);
        }
        Expr::new(
            ExprKind::NewArray {
                element,
                length: Box::new(length),
            },
            start.merge(self.prev_span()),
        )
    }

    fn parse_int_literal(&mut self, digits: &str, radix: u32, span: Span) -> u64 {
        match u64::from_str_radix(digits, radix) {
            Ok(value) => value,
            Err(_) => {
                self.error(ErrorCode::IntegralConstantTooLarge, span, Vec::new());
                0
            }
        }
    }

    fn parse_string_literal(&mut self, raw: &str, span: Span) -> String {
        let inner = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw);
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some((j, escape)) = chars.next() else {
                break;
            };
            let decoded = match escape {
                'n' => Some('\n'),
                't' => Some('\t'),
                'r' => Some('\r'),
                '0' => Some('\0'),
                'a' => Some('\x07'),
                'b' => Some('\x08'),
                'f' => Some('\x0C'),
                'v' => Some('\x0B'),
                '\\' => Some('\\'),
                '"' => Some('"'),
                '\'' => Some('\''),
                'u' => {
                    let mut code = 0u32;
                    let mut count = 0;
                    while count < 4 {
                        match chars.peek().and_then(|(_, h)| h.to_digit(16)) {
                            Some(digit) => {
                                code = code * 16 + digit;
                                chars.next();
                                count += 1;
                            }
                            None => break,
                        }
                    }
                    if count == 4 {
                        Some(char::from_u32(code).unwrap_or('\u{FFFD}'))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            match decoded {
                Some(ch) => out.push(ch),
                None => {
                    // +1 for the opening quote
                    let at = span.start + 1;
                    let end = at + j + escape.len_utf8();
                    self.error(ErrorCode::UnrecognizedEscape, Span::new(at + i, end), Vec::new());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> (CompilationUnit, Vec<SyntaxError>) {
        Parser::new(source).parse()
    }

    fn parse_ok(source: &str) -> CompilationUnit {
        let (unit, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        unit
    }

    fn first_class(unit: &CompilationUnit) -> &ClassDecl {
        match &unit.members[0] {
            NamespaceMember::Class(class) => class,
            NamespaceMember::Namespace(ns) => match &ns.members[0] {
                NamespaceMember::Class(class) => class,
                NamespaceMember::Namespace(_) => panic!("nested namespace"),
            },
        }
    }

    fn body_of(source: &str) -> Vec<Stmt> {
        let unit = parse_ok(source);
        match &first_class(&unit).members[0] {
            MemberDecl::Method(m) => m.body.stmts.clone(),
            MemberDecl::Field(_) => panic!("expected method"),
        }
    }

    #[test]
    fn test_parse_calculator() {
        let unit = parse_ok("public class Calculator { public static object Evaluate() { return 6 * 7; } }");
        let class = first_class(&unit);
        assert_eq!(class.name.name, "Calculator");
        assert!(class.modifiers.is_public());
        let MemberDecl::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        assert_eq!(method.name.name, "Evaluate");
        assert!(method.modifiers.is_static());
        let StmtKind::Return(Some(value)) = &method.body.stmts[0].kind else {
            panic!("expected return");
        };
        assert!(matches!(
            value.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_method_name_span() {
        let source = "class Program\n{\n    static int Main(string[] args)\n    {\n    }\n}";
        let unit = parse_ok(source);
        let MemberDecl::Method(main) = &first_class(&unit).members[0] else {
            panic!("expected method");
        };
        assert_eq!(&source[main.name.span.range()], "Main");
        assert!(matches!(main.params[0].ty.kind, TypeSyntaxKind::Array(_)));
    }

    #[test]
    fn test_namespaces_and_usings() {
        let unit = parse_ok("using System; namespace Demo.Math { class A { int x = 1, y; } }");
        assert_eq!(unit.usings.len(), 1);
        let NamespaceMember::Namespace(ns) = &unit.members[0] else {
            panic!("expected namespace");
        };
        assert_eq!(ns.dotted_name(), "Demo.Math");
        let MemberDecl::Field(field) = &first_class(&unit).members[0] else {
            panic!("expected field");
        };
        assert_eq!(field.declarators.len(), 2);
    }

    #[test]
    fn test_precedence() {
        let stmts = body_of("class A { void F() { x = 1 + 2 * 3 == 7 && !b; } }");
        let StmtKind::Expr(expr) = &stmts[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Assign { op: None, value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { op, left, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::LogicalAnd);
        assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_declaration_versus_expression() {
        let stmts = body_of(
            "class A { void F() { int[] a = new int[3]; Foo.Bar b; Foo.Bar(); int.Parse(s); a[0]++; } }",
        );
        assert!(matches!(stmts[0].kind, StmtKind::LocalDecl(_)));
        assert!(matches!(stmts[1].kind, StmtKind::LocalDecl(_)));
        assert!(matches!(stmts[2].kind, StmtKind::Expr(_)));
        assert!(matches!(stmts[3].kind, StmtKind::Expr(_)));
        assert!(matches!(stmts[4].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn test_control_flow() {
        let stmts = body_of(
            "class A { void F() { for (int i = 0; i < 3; i++) { if (i == 1) continue; else break; } while (true) ; } }",
        );
        assert!(matches!(stmts[0].kind, StmtKind::For { .. }));
        assert!(matches!(stmts[1].kind, StmtKind::While { .. }));
    }

    #[test]
    fn test_string_escapes() {
        let stmts = body_of(r#"class A { void F() { s = "a\tbA\\"; } }"#);
        let StmtKind::Expr(Expr {
            kind: ExprKind::Assign { value, .. },
            ..
        }) = &stmts[0].kind
        else {
            panic!("expected assignment");
        };
        assert_eq!(value.kind, ExprKind::StringLiteral("a\tbA\\".to_string()));
    }

    #[test]
    fn test_missing_semicolon_is_reported_after_previous_token() {
        let (_, errors) = parse("class A { void F() { int x = 1 } }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::SemicolonExpected);
        assert_eq!(errors[0].span, Span::at(30));
    }

    #[test]
    fn test_missing_close_brace_at_eof() {
        let (unit, errors) = parse("class A { void F() { }");
        assert_eq!(unit.members.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::CloseBraceExpected);
    }

    #[test]
    fn test_invalid_expression_term() {
        let (_, errors) = parse("class A { void F() { x = ; } }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::InvalidExprTerm);
        assert_eq!(errors[0].args, vec![";".to_string()]);
    }

    #[test]
    fn test_garbage_recovers_to_next_member() {
        let (unit, errors) = parse("class A { ) int x; }");
        assert_eq!(errors[0].code, ErrorCode::InvalidMemberDecl);
        assert_eq!(first_class(&unit).members.len(), 1);

        let (unit, errors) = parse("junk junk class B { }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::NamespaceMemberExpected);
        assert_eq!(unit.members.len(), 1);
    }

    fn codes(source: &str) -> Vec<ErrorCode> {
        parse(source).1.into_iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_deep_parentheses_are_too_complex() {
        let depth = 10_000;
        let source = format!(
            "class A {{ static int F() {{ return {}1{}; }} }}",
            "(".repeat(depth),
            ")".repeat(depth)
        );
        let (unit, errors) = parse(&source);
        assert_eq!(errors.iter().map(|e| e.code).collect::<Vec<_>>(), vec![ErrorCode::TooComplex]);
        assert_eq!(first_class(&unit).members.len(), 1);
    }

    #[test]
    fn test_deep_blocks_and_unary_chains_are_too_complex() {
        let blocks = format!("class A {{ void F() {{ {}{} }} }}", "{".repeat(5_000), "}".repeat(5_000));
        assert_eq!(codes(&blocks), vec![ErrorCode::TooComplex]);

        let negations = format!("class A {{ int F() {{ return {}1; }} }}", "- ".repeat(5_000));
        assert_eq!(codes(&negations), vec![ErrorCode::TooComplex]);

        let namespaces = format!("{}{}", "namespace N { ".repeat(1_000), "}".repeat(1_000));
        assert_eq!(codes(&namespaces), vec![ErrorCode::TooComplex]);
    }

    #[test]
    fn test_moderate_nesting_and_long_chains_parse() {
        let nested = format!("class A {{ int F() {{ return {}1{}; }} }}", "(".repeat(100), ")".repeat(100));
        parse_ok(&nested);

        let chain = format!("class A {{ int F() {{ return 1{}; }} }}", " + 1".repeat(2_000));
        let unit = parse_ok(&chain);
        assert_eq!(first_class(&unit).members.len(), 1);
    }

    #[test]
    fn test_every_input_parses() {
        for source in ["", "}", "class", "class A {", "class A { void F( }", "\"open", "namespace"] {
            let (unit, _) = parse(source);
            assert_eq!(unit.span, Span::new(0, source.len()));
        }
    }
}
