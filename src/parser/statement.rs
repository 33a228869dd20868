use crate::ast::*;
use crate::lexer::TokenKind;

use super::{ParseResult, Parser};

impl<'a> Parser<'a> {
    pub fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect(TokenKind::LBrace)?;
        let mut statements = vec![];
        self.skip_separators()?;
        while !self.check(&TokenKind::RBrace) {
            statements.push(self.parse_statement()?);
            self.skip_separators()?;
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { statements })
    }

    /// Parses one statement and the separator(s) that follow it.
    pub fn parse_statement(&mut self) -> ParseResult<Statement> {
        let pos = self.current.pos;
        let statement = match &self.current.kind {
            TokenKind::Let => self.parse_let(pos)?,
            TokenKind::Print => self.parse_print(pos)?,
            TokenKind::Return => self.parse_return(pos)?,
            TokenKind::If => self.parse_if(pos)?,
            TokenKind::While => self.parse_while(pos)?,
            TokenKind::For => self.parse_for(pos)?,
            TokenKind::Break => {
                if !self.in_loop {
                    return Err(self.error("'break' outside of a loop"));
                }
                self.advance()?;
                Statement::Break(pos)
            }
            TokenKind::Continue => {
                if !self.in_loop {
                    return Err(self.error("'continue' outside of a loop"));
                }
                self.advance()?;
                Statement::Continue(pos)
            }
            TokenKind::Next => {
                self.advance()?;
                Statement::Next(pos)
            }
            TokenKind::Exit => {
                self.advance()?;
                Statement::Exit(pos)
            }
            TokenKind::LBrace => Statement::Block(self.parse_block()?),
            TokenKind::Function => self.parse_function_def(pos)?,
            _ => Statement::Expr(self.parse_expression()?),
        };
        self.finish_statement()?;
        Ok(statement)
    }

    /// A statement must be followed by a newline, `;`, the closing
    /// brace of its block, or end of input.
    fn finish_statement(&mut self) -> ParseResult<()> {
        match self.current.kind {
            TokenKind::Newline | TokenKind::Semicolon => {
                self.advance()?;
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            _ => Err(self.error(format!("expected end of statement, found {}", self.current.kind))),
        }
    }

    fn parse_let(&mut self, pos: usize) -> ParseResult<Statement> {
        self.advance()?; // let
        let name = self.expect_ident()?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression()?;
        Ok(Statement::Let { name, value, pos })
    }

    fn parse_print(&mut self, pos: usize) -> ParseResult<Statement> {
        self.advance()?; // print
        let mut args = vec![];
        if !self.current.is_statement_end() {
            args.push(self.parse_expression()?);
            while self.eat(&TokenKind::Comma)? {
                args.push(self.parse_expression()?);
            }
        }
        Ok(Statement::Print(args, pos))
    }

    fn parse_return(&mut self, pos: usize) -> ParseResult<Statement> {
        if !self.in_function {
            return Err(self.error("'return' outside of a function"));
        }
        self.advance()?; // return
        let value = if self.current.is_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        Ok(Statement::Return(value, pos))
    }

    fn parse_if(&mut self, pos: usize) -> ParseResult<Statement> {
        self.advance()?; // if
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let then_block = self.parse_block()?;

        // `else` may follow on the same line or after blank lines; peek
        // past newlines without consuming them if there's no `else`.
        let mut probe = self.lexer.clone();
        let mut lookahead = self.current.clone();
        while matches!(lookahead.kind, TokenKind::Newline) {
            lookahead = probe.next_token().map_err(|e| self.error_at(e.message, e.pos))?;
        }
        let else_block = if lookahead.kind == TokenKind::Else {
            self.skip_separators()?;
            self.advance()?; // else
            if self.check(&TokenKind::If) {
                let else_pos = self.current.pos;
                Some(Block { statements: vec![self.parse_if(else_pos)?] })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Statement::If { condition, then_block, else_block, pos })
    }

    fn parse_while(&mut self, pos: usize) -> ParseResult<Statement> {
        self.advance()?; // while
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let was_in_loop = std::mem::replace(&mut self.in_loop, true);
        let body = self.parse_block()?;
        self.in_loop = was_in_loop;
        Ok(Statement::While { condition, body, pos })
    }

    fn parse_for(&mut self, pos: usize) -> ParseResult<Statement> {
        self.advance()?; // for
        self.expect(TokenKind::LParen)?;

        // Disambiguate `for (a, b in expr)` / `for (a in expr)` from the
        // C-style `for (init; cond; step)` by looking for `in` before the
        // first `;`.
        if self.looks_like_for_in()? {
            return self.parse_for_in(pos);
        }

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_statement_no_terminator()?))
        };
        self.expect(TokenKind::Semicolon)?;
        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_statement_no_terminator()?))
        };
        self.expect(TokenKind::RParen)?;
        let was_in_loop = std::mem::replace(&mut self.in_loop, true);
        let body = self.parse_block()?;
        self.in_loop = was_in_loop;
        Ok(Statement::ForC { init, condition, step, body, pos })
    }

    /// `for (init; cond; step)` clauses are themselves statements but
    /// without a trailing separator (the `;`/`)` already delimits them).
    fn parse_statement_no_terminator(&mut self) -> ParseResult<Statement> {
        let pos = self.current.pos;
        match &self.current.kind {
            TokenKind::Let => {
                self.advance()?;
                let name = self.expect_ident()?;
                self.expect(TokenKind::Assign)?;
                let value = self.parse_expression()?;
                Ok(Statement::Let { name, value, pos })
            }
            _ => Ok(Statement::Expr(self.parse_expression()?)),
        }
    }

    /// Peeks far enough ahead (by cloning the lexer, which is cheap: a
    /// `&str` slice and a cursor) to tell `for (x in y)` apart from
    /// `for (x = 0; ...)` without backtracking the real parser state.
    fn looks_like_for_in(&self) -> ParseResult<bool> {
        let mut probe = self.lexer.clone();
        let mut depth = 0i32;
        loop {
            let token = probe.next_token().map_err(|e| self.error_at(e.message, e.pos))?;
            match token.kind {
                TokenKind::In if depth == 0 => return Ok(true),
                TokenKind::Semicolon if depth == 0 => return Ok(false),
                TokenKind::RParen if depth == 0 => return Ok(false),
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => depth -= 1,
                TokenKind::Eof => return Ok(false),
                _ => {}
            }
        }
    }

    fn parse_for_in(&mut self, pos: usize) -> ParseResult<Statement> {
        let first = self.expect_ident()?;
        let second = if self.eat(&TokenKind::Comma)? {
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect(TokenKind::In)?;
        let iterable = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let was_in_loop = std::mem::replace(&mut self.in_loop, true);
        let body = self.parse_block()?;
        self.in_loop = was_in_loop;
        Ok(Statement::ForIn { first, second, iterable, body, pos })
    }

    fn parse_function_def(&mut self, pos: usize) -> ParseResult<Statement> {
        self.advance()?; // function
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        let was_in_function = std::mem::replace(&mut self.in_function, true);
        let body = self.parse_block()?;
        self.in_function = was_in_function;
        Ok(Statement::FunctionDef { name, params, body, pos })
    }
}
