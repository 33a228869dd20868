//! Pratt (precedence-climbing) expression parser plus a recursive-descent
//! statement/program parser, built directly on [`crate::lexer::Lexer`].
//! The parser drives the lexer one token at a time rather than working
//! off a pre-lexed vector, so it can call back into [`Lexer::regex_at`]
//! when it expects a prefix expression and sees a bare `/`.

mod program;
mod statement;

use crate::ast::*;
use crate::error::{JqawkError, SourceLoc};
use crate::lexer::{Lexer, Token, TokenKind};

pub use program::{parse_program, parse_selector};

/// Binding power, low to high. Parsing picks the first production whose
/// left binding power is greater than the power threshold passed down
/// from the caller — exactly precedence-climbing.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    Lowest,
    Assignment,
    Logical,
    Comparison,
    Additive,
    Multiplicative,
    Unary,
    Postfix,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    errors: Vec<JqawkError>,
    in_function: bool,
    in_loop: bool,
}

type ParseResult<T> = Result<T, JqawkError>;

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token().map_err(|e| syntax_error(source, e.message, e.pos))?;
        Ok(Self {
            lexer,
            current,
            errors: vec![],
            in_function: false,
            in_loop: false,
        })
    }

    fn loc(&self, pos: usize) -> SourceLoc {
        Lexer::locate(self.lexer.source(), pos)
    }

    fn error(&self, message: impl Into<String>) -> JqawkError {
        JqawkError::syntax(message, self.loc(self.current.pos))
    }

    fn error_at(&self, message: impl Into<String>, pos: usize) -> JqawkError {
        JqawkError::syntax(message, self.loc(pos))
    }

    fn advance(&mut self) -> ParseResult<Token> {
        let next = self.lexer.next_token().map_err(|e| {
            JqawkError::syntax(e.message, self.loc(e.pos))
        })?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current.kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> ParseResult<bool> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.current.kind == kind {
            self.advance()
        } else {
            Err(self.error(format!("expected {kind}, found {}", self.current.kind)))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            other => Err(self.error(format!("expected an identifier, found {other}"))),
        }
    }

    /// Skips any run of newlines/semicolons, the token-level equivalent
    /// of blank lines between statements.
    fn skip_separators(&mut self) -> ParseResult<()> {
        while matches!(self.current.kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance()?;
        }
        Ok(())
    }

    // ---- Expression parsing (precedence climbing) ----

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_precedence(Precedence::Lowest)
    }

    fn parse_precedence(&mut self, min_prec: Precedence) -> ParseResult<Expression> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let Some(prec) = infix_precedence(&self.current.kind) else {
                break;
            };
            if prec <= min_prec {
                break;
            }
            lhs = self.parse_infix(lhs, prec)?;
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expression> {
        let pos = self.current.pos;
        match self.current.kind.clone() {
            TokenKind::Num(n) => {
                self.advance()?;
                Ok(Expression::Num(n, pos))
            }
            TokenKind::Str(s) => {
                self.advance()?;
                Ok(Expression::Str(s, pos))
            }
            TokenKind::Regex(pattern) => {
                self.advance()?;
                Ok(Expression::RegexLit(pattern, pos))
            }
            TokenKind::True => {
                self.advance()?;
                Ok(Expression::Bool(true, pos))
            }
            TokenKind::False => {
                self.advance()?;
                Ok(Expression::Bool(false, pos))
            }
            TokenKind::Null => {
                self.advance()?;
                Ok(Expression::Null(pos))
            }
            TokenKind::Dollar => {
                self.advance()?;
                self.parse_postfix(Expression::Var("$".into(), pos))
            }
            TokenKind::DollarIdent(name) => {
                self.advance()?;
                self.parse_postfix(Expression::Var(format!("${name}"), pos))
            }
            TokenKind::Ident(name) => {
                self.advance()?;
                self.parse_postfix(Expression::Var(name, pos))
            }
            TokenKind::Minus => {
                self.advance()?;
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expression::Unary { op: UnaryOp::Neg, operand: Box::new(operand), pos })
            }
            TokenKind::Plus => {
                self.advance()?;
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expression::Unary { op: UnaryOp::Plus, operand: Box::new(operand), pos })
            }
            TokenKind::Bang => {
                self.advance()?;
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expression::Unary { op: UnaryOp::Not, operand: Box::new(operand), pos })
            }
            TokenKind::Inc | TokenKind::Dec => self.parse_prefix_inc_dec(pos),
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                self.parse_postfix(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(pos),
            TokenKind::LBrace => self.parse_object_literal(pos),
            TokenKind::Function => self.parse_function_literal(pos),
            TokenKind::Match => self.parse_match_expression(pos),
            TokenKind::Slash => {
                let token = self.lexer.regex_at(pos).map_err(|e| syntax_error(self.lexer.source(), e.message, e.pos))?;
                self.current = token;
                self.parse_prefix()
            }
            other => Err(self.error(format!("expected an expression, found {other}"))),
        }
    }

    fn parse_prefix_inc_dec(&mut self, pos: usize) -> ParseResult<Expression> {
        let op = if self.check(&TokenKind::Inc) { IncDecOp::Inc } else { IncDecOp::Dec };
        self.advance()?;
        let operand = self.parse_precedence(Precedence::Unary)?;
        let target = expression_to_target(operand, self)?;
        Ok(Expression::IncDec { op, prefix: true, target, pos })
    }

    fn parse_array_literal(&mut self, pos: usize) -> ParseResult<Expression> {
        self.advance()?; // [
        let mut items = vec![];
        self.skip_separators()?;
        while !self.check(&TokenKind::RBracket) {
            items.push(self.parse_expression()?);
            self.skip_separators()?;
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
            self.skip_separators()?;
        }
        self.skip_separators()?;
        self.expect(TokenKind::RBracket)?;
        Ok(Expression::Array(items, pos))
    }

    fn parse_object_literal(&mut self, pos: usize) -> ParseResult<Expression> {
        self.advance()?; // {
        let mut entries = vec![];
        self.skip_separators()?;
        while !self.check(&TokenKind::RBrace) {
            let key = self.parse_object_key()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            self.skip_separators()?;
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
            self.skip_separators()?;
        }
        self.skip_separators()?;
        self.expect(TokenKind::RBrace)?;
        Ok(Expression::Object(entries, pos))
    }

    fn parse_object_key(&mut self) -> ParseResult<ObjectKey> {
        match self.current.kind.clone() {
            TokenKind::Ident(name) => {
                self.advance()?;
                Ok(ObjectKey::Ident(name))
            }
            TokenKind::Str(s) => {
                self.advance()?;
                Ok(ObjectKey::Str(s))
            }
            TokenKind::LBracket => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RBracket)?;
                Ok(ObjectKey::Computed(Box::new(expr)))
            }
            other => Err(self.error(format!("expected an object key, found {other}"))),
        }
    }

    fn parse_function_literal(&mut self, pos: usize) -> ParseResult<Expression> {
        self.advance()?; // function
        let name = if let TokenKind::Ident(_) = self.current.kind {
            Some(self.expect_ident()?)
        } else {
            None
        };
        let params = self.parse_params()?;
        let was_in_function = std::mem::replace(&mut self.in_function, true);
        let body = self.parse_block()?;
        self.in_function = was_in_function;
        Ok(Expression::FunctionLit { name, params, body, pos })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<String>> {
        self.expect(TokenKind::LParen)?;
        let mut params = vec![];
        while !self.check(&TokenKind::RParen) {
            params.push(self.expect_ident()?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_match_expression(&mut self, pos: usize) -> ParseResult<Expression> {
        self.advance()?; // match
        self.expect(TokenKind::LParen)?;
        let scrutinee = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        self.skip_separators()?;
        let mut arms = vec![];
        while !self.check(&TokenKind::RBrace) {
            let pattern = self.parse_pattern()?;
            self.expect(TokenKind::Arrow)?;
            let body = if self.check(&TokenKind::LBrace) {
                MatchBody::Block(self.parse_block()?)
            } else {
                MatchBody::Expr(Box::new(self.parse_expression()?))
            };
            arms.push(MatchArm { pattern, body });
            self.skip_separators()?;
            self.eat(&TokenKind::Comma)?;
            self.skip_separators()?;
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expression::Match { scrutinee: Box::new(scrutinee), arms, pos })
    }

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        match self.current.kind.clone() {
            TokenKind::LBracket => {
                self.advance()?;
                let mut patterns = vec![];
                while !self.check(&TokenKind::RBracket) {
                    patterns.push(self.parse_pattern()?);
                    if !self.eat(&TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Pattern::Array(patterns))
            }
            TokenKind::Ident(name) => {
                self.advance()?;
                Ok(Pattern::Ident(name))
            }
            _ => {
                let expr = self.parse_precedence(Precedence::Unary)?;
                Ok(Pattern::Literal(Box::new(expr)))
            }
        }
    }

    fn parse_postfix(&mut self, mut expr: Expression) -> ParseResult<Expression> {
        loop {
            let pos = self.current.pos;
            match &self.current.kind {
                TokenKind::Dot => {
                    self.advance()?;
                    let property = self.expect_ident()?;
                    expr = Expression::Member { object: Box::new(expr), property, pos };
                }
                TokenKind::LBracket => {
                    self.advance()?;
                    expr = self.parse_index_or_slice(expr, pos)?;
                }
                TokenKind::LParen => {
                    self.advance()?;
                    let args = self.parse_args()?;
                    expr = Expression::Call { callee: Box::new(expr), args, pos };
                }
                TokenKind::Inc | TokenKind::Dec => {
                    let op = if self.check(&TokenKind::Inc) { IncDecOp::Inc } else { IncDecOp::Dec };
                    self.advance()?;
                    let target = expression_to_target(expr, self)?;
                    expr = Expression::IncDec { op, prefix: false, target, pos };
                }
                TokenKind::Is => {
                    self.advance()?;
                    let type_name = self.expect_ident()?;
                    expr = Expression::Is { value: Box::new(expr), type_name, pos };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_index_or_slice(&mut self, object: Expression, pos: usize) -> ParseResult<Expression> {
        if self.check(&TokenKind::Colon) {
            self.advance()?;
            let end = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            self.expect(TokenKind::RBracket)?;
            return Ok(Expression::Slice { object: Box::new(object), start: None, end, pos });
        }
        let start = self.parse_expression()?;
        if self.eat(&TokenKind::Colon)? {
            let end = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            self.expect(TokenKind::RBracket)?;
            return Ok(Expression::Slice { object: Box::new(object), start: Some(Box::new(start)), end, pos });
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expression::Index { object: Box::new(object), index: Box::new(start), pos })
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expression>> {
        let mut args = vec![];
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_infix(&mut self, lhs: Expression, prec: Precedence) -> ParseResult<Expression> {
        let pos = self.current.pos;
        let kind = self.current.kind.clone();

        if prec == Precedence::Assignment {
            return self.parse_assignment(lhs, pos);
        }

        self.advance()?;
        if let Some(op) = logical_op(&kind) {
            let rhs = self.parse_precedence(prec)?;
            return Ok(Expression::Logical { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos });
        }
        let op = binary_op(&kind).expect("infix_precedence only returns Some for a binary/logical token");
        let rhs = self.parse_precedence(prec)?;
        Ok(Expression::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos })
    }

    fn parse_assignment(&mut self, lhs: Expression, pos: usize) -> ParseResult<Expression> {
        let compound = compound_assign_op(&self.current.kind);
        self.advance()?;
        let target = expression_to_target(lhs, self)?;
        // Right-associative: recurse at the bottom so a nested `=` keeps
        // consuming into the same rhs instead of being left for the
        // caller's loop (which would hand it a non-lvalue `Assign` node).
        let rhs = self.parse_precedence(Precedence::Lowest)?;
        let value = match compound {
            None => rhs,
            Some(op) => Expression::Binary {
                op,
                lhs: Box::new(target.to_read_expr()),
                rhs: Box::new(rhs),
                pos,
            },
        };
        Ok(Expression::Assign { target, value: Box::new(value), pos })
    }
}

fn infix_precedence(kind: &TokenKind) -> Option<Precedence> {
    use TokenKind::*;
    Some(match kind {
        Assign | PlusAssign | MinusAssign | StarAssign | SlashAssign | PercentAssign => {
            Precedence::Assignment
        }
        And | Or => Precedence::Logical,
        Eq | NotEq | Lt | LtEq | Gt | GtEq | Tilde | NotMatch => Precedence::Comparison,
        Plus | Minus => Precedence::Additive,
        Star | Slash | Percent => Precedence::Multiplicative,
        _ => return None,
    })
}

fn logical_op(kind: &TokenKind) -> Option<LogicalOp> {
    match kind {
        TokenKind::And => Some(LogicalOp::And),
        TokenKind::Or => Some(LogicalOp::Or),
        _ => None,
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    use TokenKind::*;
    Some(match kind {
        Plus => BinaryOp::Add,
        Minus => BinaryOp::Sub,
        Star => BinaryOp::Mul,
        Slash => BinaryOp::Div,
        Percent => BinaryOp::Mod,
        Eq => BinaryOp::Eq,
        NotEq => BinaryOp::NotEq,
        Lt => BinaryOp::Lt,
        LtEq => BinaryOp::LtEq,
        Gt => BinaryOp::Gt,
        GtEq => BinaryOp::GtEq,
        Tilde => BinaryOp::Match,
        NotMatch => BinaryOp::NotMatch,
        _ => return None,
    })
}

fn compound_assign_op(kind: &TokenKind) -> Option<BinaryOp> {
    use TokenKind::*;
    Some(match kind {
        PlusAssign => BinaryOp::Add,
        MinusAssign => BinaryOp::Sub,
        StarAssign => BinaryOp::Mul,
        SlashAssign => BinaryOp::Div,
        PercentAssign => BinaryOp::Mod,
        Assign => return None,
        _ => return None,
    })
}

/// Synthesises an [`AssignTarget`] from an arbitrary expression tree,
/// the way the parser turns `a.b[i]` on the left of `=` into a base
/// identifier plus a path. Any shape that isn't a chain of member/index
/// accesses rooted at a plain variable (a call, a literal, ...) is
/// rejected here as a syntax error rather than later at evaluation time.
fn expression_to_target(expr: Expression, parser: &Parser) -> ParseResult<AssignTarget> {
    fn walk(expr: Expression, path: &mut Vec<PathSegment>) -> Result<(String, usize), Expression> {
        match expr {
            Expression::Var(name, pos) => Ok((name, pos)),
            Expression::Member { object, property, .. } => {
                let (base, pos) = walk(*object, path)?;
                path.push(PathSegment::Field(property));
                Ok((base, pos))
            }
            Expression::Index { object, index, .. } => {
                let (base, pos) = walk(*object, path)?;
                path.push(PathSegment::Index(index));
                Ok((base, pos))
            }
            other => Err(other),
        }
    }
    let mut path = vec![];
    match walk(expr, &mut path) {
        Ok((base, pos)) => {
            path.reverse();
            Ok(AssignTarget { base, path, pos })
        }
        Err(bad) => Err(parser.error_at("invalid assignment target", bad.pos())),
    }
}

fn syntax_error(source: &str, message: impl Into<String>, pos: usize) -> JqawkError {
    JqawkError::syntax(message, Lexer::locate(source, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expression {
        Parser::new(src).unwrap().parse_expression().unwrap()
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        match parse("1 + 2 * 3") {
            Expression::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expression::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("expected a top-level addition, got {other:?}"),
        }
    }

    #[test]
    fn comparison_binds_looser_than_additive() {
        match parse("1 + 1 > 1") {
            Expression::Binary { op: BinaryOp::Gt, lhs, .. } => {
                assert!(matches!(*lhs, Expression::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("expected a top-level comparison, got {other:?}"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        match parse("a = b = 1") {
            Expression::Assign { target, value, .. } => {
                assert_eq!(target.base, "a");
                assert!(matches!(*value, Expression::Assign { .. }));
            }
            other => panic!("expected a top-level assignment, got {other:?}"),
        }
    }

    #[test]
    fn member_and_index_chain_synthesises_assign_target_path() {
        match parse("a.b[0] = 1") {
            Expression::Assign { target, .. } => {
                assert_eq!(target.base, "a");
                assert_eq!(target.path.len(), 2);
                assert!(matches!(target.path[0], PathSegment::Field(ref name) if name == "b"));
                assert!(matches!(target.path[1], PathSegment::Index(_)));
            }
            other => panic!("expected a top-level assignment, got {other:?}"),
        }
    }

    #[test]
    fn call_on_the_left_of_assignment_is_a_syntax_error() {
        let mut parser = Parser::new("f() = 1").unwrap();
        assert!(parser.parse_expression().is_err());
    }

    #[test]
    fn compound_assignment_desugars_into_binary_on_the_read_target() {
        match parse("a.b += 1") {
            Expression::Assign { value, .. } => {
                assert!(matches!(*value, Expression::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("expected a top-level assignment, got {other:?}"),
        }
    }
}
