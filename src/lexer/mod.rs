mod token;

pub use token::*;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Display};

use log::debug;

use crate::error::SourceLoc;

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("BEGIN", Begin),
        ("END", End),
        ("BEGINFILE", BeginFile),
        ("ENDFILE", EndFile),
        ("print", Print),
        ("function", Function),
        ("return", Return),
        ("if", If),
        ("else", Else),
        ("for", For),
        ("while", While),
        ("in", In),
        ("match", Match),
        ("break", Break),
        ("continue", Continue),
        ("next", Next),
        ("exit", Exit),
        ("true", True),
        ("false", False),
        ("null", Null),
        ("let", Let),
        ("is", Is),
    ])
});

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub pos: usize,
}

impl Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

/// A context-sensitive, pull-based tokenizer.
///
/// The only mutable state is a byte cursor into the source. That is what
/// makes the regex-literal hook (`regex_at`) cheap: retokenizing a stretch
/// of source is just rewinding the cursor and scanning again.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Resolve a byte offset to `(line, col, source_line)` for diagnostics.
    /// O(n) in the offset; acceptable since this only runs when reporting
    /// an error.
    pub fn locate(source: &str, pos: usize) -> SourceLoc {
        let pos = pos.min(source.len());
        let mut line = 1usize;
        let mut last_newline = 0usize;
        for (idx, ch) in source.char_indices() {
            if idx >= pos {
                break;
            }
            if ch == '\n' {
                line += 1;
                last_newline = idx + 1;
            }
        }
        let col = source[last_newline..pos].chars().count() + 1;
        let line_end = source[pos..]
            .find('\n')
            .map(|offset| pos + offset)
            .unwrap_or(source.len());
        let source_line = source[last_newline..line_end].to_string();
        SourceLoc {
            line,
            col,
            source_line,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_if(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c == '\n' => break,
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Produce the next token, advancing the cursor past it.
    pub fn next_token(&mut self) -> LexResult<Token> {
        self.eat_whitespace_and_comments();
        let start = self.pos;

        let Some(c) = self.peek_char() else {
            return Ok(Token::eof(start));
        };

        let kind = match c {
            '\n' => {
                self.bump();
                TokenKind::Newline
            }
            '$' => self.lex_dollar()?,
            '"' | '\'' => self.lex_string(c, start)?,
            c if c.is_ascii_digit() => self.lex_number(),
            c if c.is_alphabetic() || c == '_' => self.lex_ident_or_keyword(),
            _ => self.lex_operator(start)?,
        };

        Ok(Token { kind, pos: start })
    }

    fn lex_dollar(&mut self) -> LexResult<TokenKind> {
        self.bump(); // '$'
        match self.peek_char() {
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek_char() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                Ok(TokenKind::DollarIdent(name))
            }
            _ => Ok(TokenKind::Dollar),
        }
    }

    fn lex_string(&mut self, quote: char, start: usize) -> LexResult<TokenKind> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    debug!("unterminated string literal at byte {start}");
                    return Err(LexError {
                        message: "unterminated string literal".into(),
                        pos: start,
                    });
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some(other) => {
                        debug!("invalid escape sequence '\\{other}' at byte {start}");
                        return Err(LexError {
                            message: format!("invalid escape sequence '\\{other}'"),
                            pos: start,
                        });
                    }
                    None => {
                        debug!("unterminated string literal at byte {start}");
                        return Err(LexError {
                            message: "unterminated string literal".into(),
                            pos: start,
                        });
                    }
                },
                Some(c) => value.push(c),
            }
        }
        Ok(TokenKind::Str(value))
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek_char() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            self.bump();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = &self.source[start..self.pos];
        TokenKind::Num(text.parse().expect("lexer only consumed digits and '.'"))
    }

    fn lex_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let text = &self.source[start..self.pos];
        KEYWORDS
            .get(text)
            .cloned()
            .unwrap_or_else(|| TokenKind::Ident(text.to_string()))
    }

    fn lex_operator(&mut self, start: usize) -> LexResult<TokenKind> {
        let c = self.bump().expect("caller checked a character is present");
        use TokenKind::*;
        let kind = match c {
            '=' => {
                if self.eat_if('=') {
                    Eq
                } else if self.eat_if('>') {
                    Arrow
                } else {
                    Assign
                }
            }
            '+' => {
                if self.eat_if('+') {
                    Inc
                } else if self.eat_if('=') {
                    PlusAssign
                } else {
                    Plus
                }
            }
            '-' => {
                if self.eat_if('-') {
                    Dec
                } else if self.eat_if('=') {
                    MinusAssign
                } else {
                    Minus
                }
            }
            '*' => {
                if self.eat_if('=') {
                    StarAssign
                } else {
                    Star
                }
            }
            '/' => {
                if self.eat_if('=') {
                    SlashAssign
                } else {
                    Slash
                }
            }
            '%' => {
                if self.eat_if('=') {
                    PercentAssign
                } else {
                    Percent
                }
            }
            '!' => {
                if self.eat_if('=') {
                    NotEq
                } else if self.eat_if('~') {
                    NotMatch
                } else {
                    Bang
                }
            }
            '~' => Tilde,
            '<' => {
                if self.eat_if('=') {
                    LtEq
                } else {
                    Lt
                }
            }
            '>' => {
                if self.eat_if('=') {
                    GtEq
                } else {
                    Gt
                }
            }
            '&' if self.eat_if('&') => And,
            '|' if self.eat_if('|') => Or,
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            ':' => Colon,
            ';' => Semicolon,
            '.' => Dot,
            other => {
                debug!("unexpected character '{other}' at byte {start}");
                return Err(LexError {
                    message: format!("unexpected character '{other}'"),
                    pos: start,
                });
            }
        };
        Ok(kind)
    }

    /// Called by the parser when it expected a prefix expression and saw a
    /// `Divide` token: retokenizes starting at the `/`'s position as a
    /// regex literal, consuming characters up to the next unescaped `/`.
    /// This is the lexer's only context-dependent retokenization.
    pub fn regex_at(&mut self, slash_pos: usize) -> LexResult<Token> {
        self.pos = slash_pos + 1;
        let mut pattern = String::new();
        loop {
            match self.bump() {
                None => {
                    debug!("unterminated regex literal at byte {slash_pos}");
                    return Err(LexError {
                        message: "unterminated regex literal".into(),
                        pos: slash_pos,
                    });
                }
                Some('/') => break,
                Some('\\') => match self.bump() {
                    Some('/') => pattern.push('/'),
                    Some(other) => {
                        pattern.push('\\');
                        pattern.push(other);
                    }
                    None => {
                        debug!("unterminated regex literal at byte {slash_pos}");
                        return Err(LexError {
                            message: "unterminated regex literal".into(),
                            pos: slash_pos,
                        });
                    }
                },
                Some(c) => pattern.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Regex(pattern),
            pos: slash_pos,
        })
    }

    /// Lex the whole source eagerly. Used by `-dbg-lex` and by tests; the
    /// parser itself drives the lexer token-by-token through `next_token`.
    pub fn lex_all(mut self) -> LexResult<Vec<Token>> {
        let mut tokens = vec![];
        loop {
            let token = self.next_token()?;
            let done = token.is_eof();
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .lex_all()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_let_and_assignment() {
        use TokenKind::*;
        assert_eq!(
            kinds("let x = 42"),
            vec![Let, Ident("x".into()), Assign, Num(42.0), Eof]
        );
    }

    #[test]
    fn lexes_dollar_and_dollar_ident() {
        use TokenKind::*;
        assert_eq!(
            kinds("$.a $index"),
            vec![Dollar, Dot, Ident("a".into()), DollarIdent("index".into()), Eof]
        );
    }

    #[test]
    fn disambiguates_multi_char_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("== != <= >= && || += -- !~"),
            vec![Eq, NotEq, LtEq, GtEq, And, Or, PlusAssign, Dec, NotMatch, Eof]
        );
    }

    #[test]
    fn strings_honour_escapes() {
        use TokenKind::*;
        assert_eq!(kinds(r#""a\nb\t\\c""#), vec![Str("a\nb\t\\c".into()), Eof]);
    }

    #[test]
    fn bad_escape_is_a_lex_error() {
        assert!(Lexer::new(r#""a\xb""#).lex_all().is_err());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(Lexer::new("\"abc").lex_all().is_err());
    }

    #[test]
    fn divide_is_always_lexed_eagerly_as_slash() {
        use TokenKind::*;
        assert_eq!(kinds("a / b"), vec![Ident("a".into()), Slash, Ident("b".into()), Eof]);
    }

    #[test]
    fn regex_at_retokenizes_from_the_slash() {
        let source = "x ~ /a[bc]+/";
        let slash_pos = source.find('/').unwrap();
        let mut lexer = Lexer::new(source);
        let token = lexer.regex_at(slash_pos).unwrap();
        assert_eq!(token.kind, TokenKind::Regex("a[bc]+".into()));
        // the cursor now sits right after the closing slash
        assert_eq!(lexer.next_token().unwrap(), Token::eof(source.len()));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        use TokenKind::*;
        assert_eq!(
            kinds("let x = 1 # a comment\nlet y = 2"),
            vec![
                Let,
                Ident("x".into()),
                Assign,
                Num(1.0),
                Newline,
                Let,
                Ident("y".into()),
                Assign,
                Num(2.0),
                Eof
            ]
        );
    }

    #[test]
    fn keywords_are_recognised() {
        use TokenKind::*;
        assert_eq!(
            kinds("BEGIN END BEGINFILE ENDFILE print function is let"),
            vec![Begin, End, BeginFile, EndFile, Print, Function, Is, Let, Eof]
        );
    }

    #[test]
    fn locate_resolves_line_and_column() {
        let source = "first\nsecond line\nthird";
        let pos = source.find("line").unwrap();
        let loc = Lexer::locate(source, pos);
        assert_eq!(loc.line, 2);
        assert_eq!(loc.source_line, "second line");
    }
}
