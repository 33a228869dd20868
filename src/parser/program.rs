use log::debug;

use crate::ast::{Expression, FunctionDef, Program, Rule, RuleKind, Statement};
use crate::error::JqawkError;
use crate::lexer::TokenKind;

use super::Parser;

/// Parses a whole program: a sequence of rules (`BEGIN { ... }`,
/// `pattern { ... }`, bare `{ ... }`, ...) and top-level function
/// definitions, in any order. Parse errors are collected rather than
/// aborting on the first one; if any were found they're returned
/// together as a single [`JqawkError::Group`].
pub fn parse_program(source: &str) -> Result<Program, JqawkError> {
    let mut parser = Parser::new(source)?;
    let mut program = Program::default();

    parser.skip_separators().ok();
    while !parser.at_eof() {
        match parser.parse_top_level_item() {
            Ok(Item::Rule(rule)) => program.rules.push(rule),
            Ok(Item::Function(func)) => program.functions.push(func),
            Err(e) => {
                debug!("recovering from top-level parse error: {e}");
                parser.push_error(e);
                parser.synchronize_top_level();
            }
        }
        parser.skip_separators().ok();
    }

    parser.finish(program)
}

/// Parses a single standalone expression: the `-r` selector flag is a
/// whole expression given as its own command-line argument, not a rule.
pub fn parse_selector(source: &str) -> Result<Expression, JqawkError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression()?;
    if !parser.errors.is_empty() {
        return Err(JqawkError::Group(std::mem::take(&mut parser.errors)));
    }
    Ok(expr)
}

enum Item {
    Rule(Rule),
    Function(FunctionDef),
}

impl<'a> Parser<'a> {
    fn at_eof(&self) -> bool {
        self.check(&TokenKind::Eof)
    }

    fn parse_top_level_item(&mut self) -> Result<Item, JqawkError> {
        let kind = match self.current.kind {
            TokenKind::Begin => Some(RuleKind::Begin),
            TokenKind::End => Some(RuleKind::End),
            TokenKind::BeginFile => Some(RuleKind::BeginFile),
            TokenKind::EndFile => Some(RuleKind::EndFile),
            _ => None,
        };

        if let Some(kind) = kind {
            self.advance()?;
            let body = self.parse_block()?;
            return Ok(Item::Rule(Rule { kind, pattern: None, body }));
        }

        if self.check(&TokenKind::Function) {
            return self.parse_top_level_function().map(Item::Function);
        }

        if self.check(&TokenKind::LBrace) {
            let body = self.parse_block()?;
            return Ok(Item::Rule(Rule { kind: RuleKind::Main, pattern: None, body }));
        }

        let pattern = self.parse_expression()?;
        let body = if self.check(&TokenKind::LBrace) {
            self.parse_block()?
        } else {
            crate::ast::Block {
                statements: vec![Statement::Print(vec![], pattern.pos())],
            }
        };
        Ok(Item::Rule(Rule { kind: RuleKind::Main, pattern: Some(pattern), body }))
    }

    fn parse_top_level_function(&mut self) -> Result<FunctionDef, JqawkError> {
        self.advance()?; // function
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        let was_in_function = std::mem::replace(&mut self.in_function, true);
        let body = self.parse_block()?;
        self.in_function = was_in_function;
        Ok(FunctionDef { name, params, body })
    }

    fn push_error(&mut self, error: JqawkError) {
        self.errors.push(error);
    }

    /// Like [`Parser::synchronize`] but stops at tokens that plausibly
    /// start a new top-level item too, not just statement boundaries.
    fn synchronize_top_level(&mut self) {
        loop {
            if self.at_eof() {
                return;
            }
            if matches!(
                self.current.kind,
                TokenKind::Begin
                    | TokenKind::End
                    | TokenKind::BeginFile
                    | TokenKind::EndFile
                    | TokenKind::Function
                    | TokenKind::LBrace
            ) {
                return;
            }
            if self.current.is_statement_end() {
                if self.advance().is_err() {
                    return;
                }
                continue;
            }
            if self.advance().is_err() {
                return;
            }
        }
    }

    fn finish(self, program: Program) -> Result<Program, JqawkError> {
        if self.errors.is_empty() {
            Ok(program)
        } else {
            Err(JqawkError::Group(self.errors))
        }
    }
}
