//! Pratt parser for the built-in script language
//!
//! Binding powers, lowest to highest:
//!
//! | Level | Operators                     | Associativity |
//! |-------|-------------------------------|---------------|
//! | 1     | `=` `+=` `-=` `*=` `/=`       | right         |
//! | 2     | `? :`                         | right         |
//! | 3     | `\|\|`                        | left          |
//! | 4     | `&&`                          | left          |
//! | 5     | `==` `!=` `===` `!==`         | left          |
//! | 6     | `<` `<=` `>` `>=`             | left          |
//! | 7     | `+` `-`                       | left          |
//! | 8     | `*` `/` `%`                   | left          |
//! | 9     | prefix `-` `+` `!`            | -             |
//! | 10    | `a[i]` `a.name`               | left          |

use super::lexer::{Token, TokenKind};
use crate::evaluator::EvalError;

const BP_ASSIGN: u8 = 1;
const BP_TERNARY: u8 = 2;
const BP_OR: u8 = 3;
const BP_AND: u8 = 4;
const BP_EQ: u8 = 5;
const BP_CMP: u8 = 6;
const BP_ADD: u8 = 7;
const BP_MUL: u8 = 8;
const BP_PREFIX: u8 = 9;
const BP_POSTFIX: u8 = 10;

/// Limit on syntax tree depth, which bounds recursion while parsing and evaluating
const MAX_DEPTH: usize = 256;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Array(Vec<Expr>),
    Ident(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `name = value`, or `name op= value` when `op` is set
    Assign {
        name: String,
        op: Option<BinOp>,
        value: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let`/`var`/`const` declaration
    Declare { name: String, init: Option<Expr> },
    Expr(Expr),
}

/// Parse a token stream into a list of statements
pub fn parse(tokens: &[Token]) -> Result<Vec<Stmt>, EvalError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut stmts = Vec::new();

    loop {
        while parser.at(&TokenKind::Semicolon) {
            parser.bump();
        }
        if parser.at(&TokenKind::Eof) {
            break;
        }
        stmts.push(parser.statement()?);
        match parser.kind() {
            TokenKind::Semicolon | TokenKind::Eof => {}
            _ => return Err(parser.unexpected()),
        }
    }

    Ok(stmts)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn kind(&self) -> &TokenKind {
        // The token stream always ends in Eof, so clamp to it
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(idx)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.kind().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), EvalError> {
        if self.at(&kind) {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> EvalError {
        match self.kind() {
            TokenKind::Eof => EvalError::syntax("Unexpected end of input"),
            TokenKind::Str(_) => EvalError::syntax("Unexpected string"),
            TokenKind::Number(_) => EvalError::syntax("Unexpected number"),
            TokenKind::Identifier(name) => {
                EvalError::syntax(format!("Unexpected identifier '{}'", name))
            }
            other => EvalError::syntax(format!("Unexpected token '{}'", other.describe())),
        }
    }

    fn statement(&mut self) -> Result<Stmt, EvalError> {
        if matches!(
            self.kind(),
            TokenKind::KwLet | TokenKind::KwVar | TokenKind::KwConst
        ) {
            self.bump();
            let name = match self.bump() {
                TokenKind::Identifier(name) => name,
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                }
            };
            let init = if self.at(&TokenKind::Assign) {
                self.bump();
                Some(self.expression(BP_ASSIGN)?)
            } else {
                None
            };
            return Ok(Stmt::Declare { name, init });
        }
        Ok(Stmt::Expr(self.expression(0)?))
    }

    fn expression(&mut self, min_bp: u8) -> Result<Expr, EvalError> {
        let saved = self.depth;
        let result = self.expression_inner(min_bp);
        self.depth = saved;
        result
    }

    fn expression_inner(&mut self, min_bp: u8) -> Result<Expr, EvalError> {
        self.descend()?;
        let mut lhs = self.prefix()?;

        loop {
            let Some((left_bp, right_bp)) = infix_binding_power(self.kind()) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            // Each chained operator deepens the tree by one level
            self.descend()?;
            lhs = self.infix(lhs, right_bp)?;
        }

        Ok(lhs)
    }

    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::range("Maximum nesting depth exceeded"));
        }
        Ok(())
    }

    fn prefix(&mut self) -> Result<Expr, EvalError> {
        let expr = match self.bump() {
            TokenKind::Number(n) => Expr::Number(n),
            TokenKind::Str(s) => Expr::Str(s),
            TokenKind::KwTrue => Expr::Bool(true),
            TokenKind::KwFalse => Expr::Bool(false),
            TokenKind::KwNull => Expr::Null,
            TokenKind::KwUndefined => Expr::Undefined,
            TokenKind::Identifier(name) => Expr::Ident(name),
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen)?;
                inner
            }
            TokenKind::LBracket => Expr::Array(self.array_elements()?),
            TokenKind::Minus => self.unary(UnaryOp::Neg)?,
            TokenKind::Plus => self.unary(UnaryOp::Plus)?,
            TokenKind::Not => self.unary(UnaryOp::Not)?,
            _ => {
                self.pos -= 1;
                return Err(self.unexpected());
            }
        };
        Ok(expr)
    }

    fn unary(&mut self, op: UnaryOp) -> Result<Expr, EvalError> {
        let operand = self.expression(BP_PREFIX)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn array_elements(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut items = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            items.push(self.expression(BP_ASSIGN)?);
            if !self.at(&TokenKind::Comma) {
                break;
            }
            self.bump();
        }
        self.expect(TokenKind::RBracket)?;
        Ok(items)
    }

    fn infix(&mut self, lhs: Expr, right_bp: u8) -> Result<Expr, EvalError> {
        let op_token = self.bump();
        let expr = match op_token {
            TokenKind::Assign
            | TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::StarAssign
            | TokenKind::SlashAssign => {
                let Expr::Ident(name) = lhs else {
                    return Err(EvalError::syntax("Invalid left-hand side in assignment"));
                };
                let op = match op_token {
                    TokenKind::PlusAssign => Some(BinOp::Add),
                    TokenKind::MinusAssign => Some(BinOp::Sub),
                    TokenKind::StarAssign => Some(BinOp::Mul),
                    TokenKind::SlashAssign => Some(BinOp::Div),
                    _ => None,
                };
                let value = self.expression(right_bp)?;
                Expr::Assign {
                    name,
                    op,
                    value: Box::new(value),
                }
            }
            TokenKind::Question => {
                let then_branch = self.expression(BP_ASSIGN)?;
                self.expect(TokenKind::Colon)?;
                let else_branch = self.expression(right_bp)?;
                Expr::Conditional {
                    condition: Box::new(lhs),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                }
            }
            TokenKind::And | TokenKind::Or => {
                let op = if op_token == TokenKind::And {
                    LogicalOp::And
                } else {
                    LogicalOp::Or
                };
                let right = self.expression(right_bp)?;
                Expr::Logical {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(right),
                }
            }
            TokenKind::LBracket => {
                let index = self.expression(0)?;
                self.expect(TokenKind::RBracket)?;
                Expr::Index {
                    target: Box::new(lhs),
                    index: Box::new(index),
                }
            }
            TokenKind::Dot => match self.bump() {
                TokenKind::Identifier(name) => Expr::Member {
                    target: Box::new(lhs),
                    name,
                },
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                }
            },
            other => {
                let op = match other {
                    TokenKind::Plus => BinOp::Add,
                    TokenKind::Minus => BinOp::Sub,
                    TokenKind::Star => BinOp::Mul,
                    TokenKind::Slash => BinOp::Div,
                    TokenKind::Percent => BinOp::Mod,
                    TokenKind::EqEq => BinOp::Eq,
                    TokenKind::NotEq => BinOp::NotEq,
                    TokenKind::EqEqEq => BinOp::StrictEq,
                    TokenKind::NotEqEq => BinOp::StrictNotEq,
                    TokenKind::Lt => BinOp::Lt,
                    TokenKind::Le => BinOp::Le,
                    TokenKind::Gt => BinOp::Gt,
                    TokenKind::Ge => BinOp::Ge,
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected());
                    }
                };
                let right = self.expression(right_bp)?;
                Expr::Binary {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(right),
                }
            }
        };
        Ok(expr)
    }
}

/// Left and right binding power of an infix or postfix operator
fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8)> {
    let bp = match kind {
        TokenKind::Assign
        | TokenKind::PlusAssign
        | TokenKind::MinusAssign
        | TokenKind::StarAssign
        | TokenKind::SlashAssign => (BP_ASSIGN, BP_ASSIGN),
        TokenKind::Question => (BP_TERNARY, BP_TERNARY),
        TokenKind::Or => (BP_OR, BP_OR + 1),
        TokenKind::And => (BP_AND, BP_AND + 1),
        TokenKind::EqEq | TokenKind::NotEq | TokenKind::EqEqEq | TokenKind::NotEqEq => {
            (BP_EQ, BP_EQ + 1)
        }
        TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => (BP_CMP, BP_CMP + 1),
        TokenKind::Plus | TokenKind::Minus => (BP_ADD, BP_ADD + 1),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (BP_MUL, BP_MUL + 1),
        TokenKind::LBracket | TokenKind::Dot => (BP_POSTFIX, BP_POSTFIX + 1),
        _ => return None,
    };
    Some(bp)
}
