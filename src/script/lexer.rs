//! Tokenizer for the built-in script language

use crate::evaluator::EvalError;

/// Token kind
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwLet,
    KwVar,
    KwConst,
    KwTrue,
    KwFalse,
    KwNull,
    KwUndefined,

    Identifier(String),
    Number(f64),
    Str(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Question,
    Colon,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,

    Eof,
}

impl TokenKind {
    /// Source spelling used in error messages
    pub fn describe(&self) -> String {
        let text = match self {
            Self::KwLet => "let",
            Self::KwVar => "var",
            Self::KwConst => "const",
            Self::KwTrue => "true",
            Self::KwFalse => "false",
            Self::KwNull => "null",
            Self::KwUndefined => "undefined",
            Self::Identifier(name) => return name.clone(),
            Self::Number(n) => return crate::evaluator::value::format_number(*n),
            Self::Str(_) => "string",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Assign => "=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::StarAssign => "*=",
            Self::SlashAssign => "/=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::EqEqEq => "===",
            Self::NotEqEq => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
            Self::Question => "?",
            Self::Colon => ":",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Dot => ".",
            Self::Eof => "end of input",
        };
        text.to_string()
    }
}

/// Token with its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Tokenize source text. The returned vector always ends with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, offset: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.source[self.offset..].chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.peek_next() == Some('/') {
                // Line comment runs to the end of the input line
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, EvalError> {
        self.skip_whitespace_and_comments();
        let start = self.offset;
        let Some(c) = self.advance() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset: start,
            });
        };

        let kind = match c {
            '+' if self.eat('=') => TokenKind::PlusAssign,
            '+' => TokenKind::Plus,
            '-' if self.eat('=') => TokenKind::MinusAssign,
            '-' => TokenKind::Minus,
            '*' if self.eat('=') => TokenKind::StarAssign,
            '*' => TokenKind::Star,
            '/' if self.eat('=') => TokenKind::SlashAssign,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' if self.eat('=') => {
                if self.eat('=') {
                    TokenKind::EqEqEq
                } else {
                    TokenKind::EqEq
                }
            }
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => {
                if self.eat('=') {
                    TokenKind::NotEqEq
                } else {
                    TokenKind::NotEq
                }
            }
            '!' => TokenKind::Not,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::And,
            '|' if self.eat('|') => TokenKind::Or,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' if self.peek().is_some_and(|d| d.is_ascii_digit()) => self.number(start)?,
            '.' => TokenKind::Dot,
            '\'' | '"' => self.string(c)?,
            c if c.is_ascii_digit() => self.number(start)?,
            c if is_ident_start(c) => self.identifier(start),
            _ => return Err(EvalError::syntax("Invalid or unexpected token")),
        };

        Ok(Token {
            kind,
            offset: start,
        })
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, EvalError> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && !self.source[start..self.offset].contains('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_digit = match self.peek_next() {
                Some('+' | '-') => self.source[self.offset..]
                    .chars()
                    .nth(2)
                    .is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if !exponent_digit {
                return Err(EvalError::syntax("Invalid or unexpected token"));
            }
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        // An identifier directly after a number, as in `3in`
        if self.peek().is_some_and(is_ident_start) {
            return Err(EvalError::syntax("Invalid or unexpected token"));
        }

        let text = &self.source[start..self.offset];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| EvalError::syntax(format!("Invalid number literal: {}", text)))
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, EvalError> {
        let mut value = String::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(EvalError::syntax("Invalid or unexpected token"));
            };
            match c {
                c if c == quote => return Ok(TokenKind::Str(value)),
                '\n' => return Err(EvalError::syntax("Invalid or unexpected token")),
                '\\' => {
                    let Some(escaped) = self.advance() else {
                        return Err(EvalError::syntax("Invalid or unexpected token"));
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        'u' => value.push(self.unicode_escape()?),
                        other => value.push(other),
                    }
                }
                c => value.push(c),
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char, EvalError> {
        let end = self.offset + 4;
        let hex = self
            .source
            .get(self.offset..end)
            .ok_or_else(|| EvalError::syntax("Invalid Unicode escape sequence"))?;
        let code = u32::from_str_radix(hex, 16)
            .map_err(|_| EvalError::syntax("Invalid Unicode escape sequence"))?;
        self.offset = end;
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn identifier(&mut self, start: usize) -> TokenKind {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        match &self.source[start..self.offset] {
            "let" => TokenKind::KwLet,
            "var" => TokenKind::KwVar,
            "const" => TokenKind::KwConst,
            "true" => TokenKind::KwTrue,
            "false" => TokenKind::KwFalse,
            "null" => TokenKind::KwNull,
            "undefined" => TokenKind::KwUndefined,
            name => TokenKind::Identifier(name.to_string()),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
