//! Surface syntax reader for macro invocations.
//!
//! Lets tests and tools write invocations as text instead of building
//! [`Expr`] trees by hand.
//!
//! # Example
//!
//! ```rust
//! use dfmacros::parser::parse_invocation;
//!
//! let inv = parse_invocation("@transform(df, :y = :x + 1; renamecols = false)").unwrap();
//! assert_eq!(inv.args.len(), 1);
//! assert_eq!(inv.kwargs.len(), 1);
//! ```
//!
//! Supported: `:name`, `$"str"`, `$1`, `$name`, `$(expr)`, `@flags expr`,
//! literals, `true`/`false`/`missing`, calls with keyword arguments, indexing,
//! field access, tuples and named tuples, vectors, `begin ... end` blocks,
//! infix operators with their dotted broadcast forms, `=>`, `->`, unary `-`
//! and `!`, and `#` comments.

use crate::construct::{Construct, Invocation};
use crate::expr::{binary_precedence, Expr, Value};
use std::iter::Peekable;
use std::rc::Rc;
use std::str::Chars;
use thiserror::Error;

/// Parser error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected character: {0}")]
    UnexpectedChar(char),
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unknown construct: {0}")]
    UnknownConstruct(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// `:name`
    QuoteSym(String),
    Dollar,
    /// `@name`, flags or a construct
    At(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    Op(String),
    Eof,
}

/// A token plus the whitespace in front of it.
#[derive(Debug, Clone)]
struct Lexed {
    token: Token,
    space_before: bool,
    newline_before: bool,
}

struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.input.clone();
        ahead.next();
        ahead.next()
    }

    fn advance(&mut self) -> Option<char> {
        self.input.next()
    }

    /// Skip whitespace and comments; report whether any (and any newline) was seen.
    fn skip_whitespace(&mut self) -> (bool, bool) {
        let mut space = false;
        let mut newline = false;
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                space = true;
                newline |= c == '\n';
                self.advance();
            } else if c == '#' {
                while let Some(c) = self.advance() {
                    if c == '\n' {
                        break;
                    }
                }
                space = true;
                newline = true;
            } else {
                break;
            }
        }
        (space, newline)
    }

    fn read_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> String {
        let mut result = String::new();
        while let Some(c) = self.peek() {
            if predicate(c) {
                result.push(c);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_name(&mut self) -> String {
        let mut name = self.read_while(|c| c.is_alphanumeric() || c == '_');
        if self.peek() == Some('!') && self.peek_second() != Some('=') {
            self.advance();
            name.push('!');
        }
        name
    }

    fn read_string(&mut self) -> ParseResult<String> {
        self.advance();
        let mut result = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(result),
                Some('\\') => match self.advance() {
                    Some('n') => result.push('\n'),
                    Some('t') => result.push('\t'),
                    Some(c) => result.push(c),
                    None => return Err(ParseError::UnterminatedString),
                },
                Some(c) => result.push(c),
                None => return Err(ParseError::UnterminatedString),
            }
        }
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let mut s = self.read_while(|c| c.is_ascii_digit());
        let mut float = false;

        if self.peek() == Some('.') && self.peek_second().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
            s.push('.');
            s.push_str(&self.read_while(|c| c.is_ascii_digit()));
            float = true;
        }

        if matches!(self.peek(), Some('e') | Some('E'))
            && self
                .peek_second()
                .map_or(false, |c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            s.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                s.push(sign);
                self.advance();
            }
            s.push_str(&self.read_while(|c| c.is_ascii_digit()));
            float = true;
        }

        if float {
            s.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ParseError::InvalidNumber(s))
        } else {
            s.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ParseError::InvalidNumber(s))
        }
    }

    fn read_operator(&mut self) -> ParseResult<String> {
        let first = self.advance().ok_or(ParseError::UnexpectedEof)?;
        let next = self.peek();
        let (op, consume) = match (first, next) {
            ('=', Some('=')) => ("==", true),
            ('=', Some('>')) => ("=>", true),
            ('=', _) => ("=", false),
            ('!', Some('=')) => ("!=", true),
            ('!', _) => ("!", false),
            ('<', Some('=')) => ("<=", true),
            ('<', _) => ("<", false),
            ('>', Some('=')) => (">=", true),
            ('>', _) => (">", false),
            ('&', Some('&')) => ("&&", true),
            ('|', Some('|')) => ("||", true),
            ('-', Some('>')) => ("->", true),
            ('-', _) => ("-", false),
            ('+', _) => ("+", false),
            ('*', _) => ("*", false),
            ('/', _) => ("/", false),
            ('^', _) => ("^", false),
            ('%', _) => ("%", false),
            (c, _) => return Err(ParseError::UnexpectedChar(c)),
        };
        if consume {
            self.advance();
        }
        Ok(op.to_string())
    }

    fn next_token(&mut self) -> ParseResult<Lexed> {
        let (space_before, newline_before) = self.skip_whitespace();
        let token = match self.peek() {
            None => Token::Eof,
            Some(c) => match c {
                '(' => { self.advance(); Token::LParen }
                ')' => { self.advance(); Token::RParen }
                '[' => { self.advance(); Token::LBracket }
                ']' => { self.advance(); Token::RBracket }
                ',' => { self.advance(); Token::Comma }
                ';' => { self.advance(); Token::Semicolon }
                '$' => { self.advance(); Token::Dollar }
                '.' => {
                    self.advance();
                    match self.peek() {
                        Some(c) if is_operator_char(c) => {
                            let op = self.read_operator()?;
                            if matches!(op.as_str(), "=" | "=>" | "->") {
                                return Err(ParseError::UnexpectedChar('.'));
                            }
                            Token::Op(format!(".{}", op))
                        }
                        _ => Token::Dot,
                    }
                }
                ':' => {
                    self.advance();
                    match self.peek() {
                        Some(c) if c.is_alphabetic() || c == '_' => Token::QuoteSym(self.read_name()),
                        _ => return Err(ParseError::UnexpectedChar(':')),
                    }
                }
                '@' => {
                    self.advance();
                    let name = self.read_name();
                    if name.is_empty() {
                        return Err(ParseError::UnexpectedChar('@'));
                    }
                    Token::At(name)
                }
                '"' => Token::Str(self.read_string()?),
                c if c.is_ascii_digit() => self.read_number()?,
                c if c.is_alphabetic() || c == '_' => Token::Ident(self.read_name()),
                c if is_operator_char(c) => Token::Op(self.read_operator()?),
                c => return Err(ParseError::UnexpectedChar(c)),
            },
        };
        Ok(Lexed {
            token,
            space_before,
            newline_before,
        })
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/' | '^' | '%' | '=' | '<' | '>' | '!' | '&' | '|')
}

/// Binding strength used while parsing; `=>` and `->` sit below every
/// arithmetic and logical operator.
fn infix_precedence(op: &str) -> Option<(u8, bool)> {
    match op {
        "->" => Some((1, true)),
        "=>" => Some((5, true)),
        _ => binary_precedence(op),
    }
}

const UNARY_OPERAND: u8 = 70;

/// Parser for the macro surface syntax.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Lexed,
    /// Bracket nesting; at depth 0 a newline ends an expression.
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given input.
    pub fn new(input: &'a str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            depth: 0,
        })
    }

    fn advance(&mut self) -> ParseResult<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next).token)
    }

    fn at(&self, token: &Token) -> bool {
        &self.current.token == token
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current.token == expected {
            self.advance()?;
            Ok(())
        } else {
            Err(self.unexpected(&format!("{:?}", expected)))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.current.token {
            Token::Eof => ParseError::UnexpectedEof,
            ref found => ParseError::Expected {
                expected: expected.to_string(),
                found: format!("{:?}", found),
            },
        }
    }

    fn open(&mut self) -> ParseResult<()> {
        self.advance()?;
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self, closing: Token) -> ParseResult<()> {
        self.expect(closing)?;
        self.depth -= 1;
        Ok(())
    }

    /// One macro argument: optional flags, then an expression, then an
    /// optional `= value`.
    pub fn parse_argument(&mut self) -> ParseResult<Expr> {
        if let Token::At(flags) = &self.current.token {
            let flags = flags.clone();
            self.advance()?;
            let inner = self.parse_argument()?;
            return Ok(Expr::flagged(flags, inner));
        }
        let lhs = self.parse_expression()?;
        if matches!(&self.current.token, Token::Op(op) if op == "=") {
            self.advance()?;
            let value = self.parse_argument()?;
            return Ok(Expr::assign(lhs, value));
        }
        Ok(lhs)
    }

    /// An expression without top-level assignment.
    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.depth == 0 && self.current.newline_before {
                break;
            }
            let op = match &self.current.token {
                Token::Op(op) => op.clone(),
                _ => break,
            };
            let (prec, right) = match infix_precedence(&op) {
                Some(p) => p,
                None => break,
            };
            if prec < min {
                break;
            }
            self.advance()?;
            let rhs = self.parse_binary(if right { prec } else { prec + 1 })?;
            lhs = match op.as_str() {
                "=>" => Expr::pair(lhs, rhs),
                "->" => Expr::lambda(lambda_params(&lhs)?, rhs),
                _ => Expr::call(op, vec![lhs, rhs]),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match &self.current.token {
            Token::Op(op) if matches!(op.as_str(), "-" | "+" | "!") => op.clone(),
            _ => return self.parse_postfix(),
        };
        self.advance()?;
        let operand = self.parse_binary(UNARY_OPERAND)?;
        Ok(match (op.as_str(), operand) {
            ("-", Expr::Literal(Value::Int(n))) => Expr::int(-n),
            ("-", Expr::Literal(Value::Float(x))) => Expr::float(-x.into_inner()),
            ("+", operand) => operand,
            (_, operand) => Expr::call(op, vec![operand]),
        })
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.current.space_before {
                break;
            }
            match self.current.token {
                Token::LParen => {
                    self.open()?;
                    let args = self.parse_call_args()?;
                    self.close(Token::RParen)?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                Token::LBracket => {
                    self.open()?;
                    let indices = self.parse_list(&Token::RBracket)?;
                    self.close(Token::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        indices,
                    };
                }
                Token::Dot => {
                    self.advance()?;
                    let field = match self.advance()? {
                        Token::Ident(name) => name,
                        other => {
                            return Err(ParseError::Expected {
                                expected: "field name".to_string(),
                                found: format!("{:?}", other),
                            })
                        }
                    };
                    expr = Expr::Dot {
                        target: Box::new(expr),
                        field: field.into(),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.current.token.clone() {
            Token::Int(n) => {
                self.advance()?;
                Ok(Expr::int(n))
            }
            Token::Float(x) => {
                self.advance()?;
                Ok(Expr::float(x))
            }
            Token::Str(s) => {
                self.advance()?;
                Ok(Expr::string(s))
            }
            Token::QuoteSym(name) => {
                self.advance()?;
                Ok(Expr::quote(name))
            }
            Token::Ident(name) => {
                self.advance()?;
                match name.as_str() {
                    "true" => Ok(Expr::lit(Value::Bool(true))),
                    "false" => Ok(Expr::lit(Value::Bool(false))),
                    "missing" => Ok(Expr::lit(Value::Missing)),
                    "begin" => self.parse_block(),
                    _ => Ok(Expr::ident(name)),
                }
            }
            Token::Dollar => {
                self.advance()?;
                if self.at(&Token::LParen) {
                    self.open()?;
                    let inner = self.parse_expression()?;
                    self.close(Token::RParen)?;
                    Ok(Expr::interp(inner))
                } else {
                    Ok(Expr::interp(self.parse_primary()?))
                }
            }
            Token::At(_) => self.parse_argument(),
            Token::LParen => {
                self.open()?;
                if self.at(&Token::Semicolon) {
                    self.advance()?;
                    self.close(Token::RParen)?;
                    return Ok(Expr::NamedTuple(Vec::new()));
                }
                let mut items = Vec::new();
                let mut trailing_comma = false;
                while !self.at(&Token::RParen) {
                    items.push(self.parse_argument()?);
                    trailing_comma = self.at(&Token::Comma);
                    if !trailing_comma {
                        break;
                    }
                    self.advance()?;
                }
                self.close(Token::RParen)?;
                if items.len() == 1 && !trailing_comma {
                    return Ok(items.remove(0));
                }
                Ok(tuple_or_named(items))
            }
            Token::LBracket => {
                self.open()?;
                let items = self.parse_list(&Token::RBracket)?;
                self.close(Token::RBracket)?;
                Ok(Expr::Vector(items))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `begin` has been consumed; read lines up to `end`.
    fn parse_block(&mut self) -> ParseResult<Expr> {
        let outer = std::mem::replace(&mut self.depth, 0);
        let mut items = Vec::new();
        loop {
            match &self.current.token {
                Token::Semicolon => {
                    self.advance()?;
                }
                Token::Ident(word) if word == "end" => {
                    self.advance()?;
                    break;
                }
                Token::Eof => return Err(ParseError::UnexpectedEof),
                _ => {
                    items.push(self.parse_argument()?);
                    let separated = self.current.newline_before
                        || matches!(&self.current.token, Token::Semicolon)
                        || matches!(&self.current.token, Token::Ident(w) if w == "end");
                    if !separated {
                        return Err(self.unexpected("newline, `;` or `end`"));
                    }
                }
            }
        }
        self.depth = outer;
        Ok(Expr::Block(items))
    }

    /// Comma-separated arguments up to (not including) `closing`.
    fn parse_list(&mut self, closing: &Token) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.at(closing) {
            items.push(self.parse_argument()?);
            if !self.at(&Token::Comma) {
                break;
            }
            self.advance()?;
        }
        Ok(items)
    }

    /// Call arguments; `name = value` and everything after `;` are keywords.
    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        let (positional, keywords) = self.parse_args_until(&Token::RParen, true)?;
        let mut args = positional;
        args.extend(keywords.into_iter().map(|(name, value)| Expr::Kw {
            name,
            value: Box::new(value),
        }));
        Ok(args)
    }

    /// Arguments up to `closing`. Everything after `;` is a keyword; before
    /// it, `name = value` is a keyword only when `named_are_keywords` is set.
    fn parse_args_until(
        &mut self,
        closing: &Token,
        named_are_keywords: bool,
    ) -> ParseResult<(Vec<Expr>, Vec<(Rc<str>, Expr)>)> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        let mut in_keywords = false;
        loop {
            if self.at(closing) {
                break;
            }
            if self.at(&Token::Semicolon) {
                self.advance()?;
                in_keywords = true;
                continue;
            }
            let named = in_keywords || named_are_keywords;
            match self.parse_argument()? {
                Expr::Assign { sink, value } if named && matches!(*sink, Expr::Ident(_)) => {
                    if let Expr::Ident(name) = *sink {
                        keywords.push((name, *value));
                    }
                }
                Expr::Ident(name) if in_keywords => keywords.push((name.clone(), Expr::Ident(name))),
                other if in_keywords => {
                    return Err(ParseError::Expected {
                        expected: "keyword argument".to_string(),
                        found: other.to_string(),
                    })
                }
                other => positional.push(other),
            }
            if self.at(&Token::Comma) {
                self.advance()?;
            } else if !self.at(&Token::Semicolon) {
                break;
            }
        }
        Ok((positional, keywords))
    }

    fn finish(&mut self) -> ParseResult<()> {
        if self.at(&Token::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }
}

fn lambda_params(lhs: &Expr) -> ParseResult<Vec<Rc<str>>> {
    let not_params = || ParseError::Expected {
        expected: "lambda parameters".to_string(),
        found: lhs.to_string(),
    };
    match lhs {
        Expr::Ident(name) => Ok(vec![name.clone()]),
        Expr::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Expr::Ident(name) => Ok(name.clone()),
                _ => Err(not_params()),
            })
            .collect(),
        _ => Err(not_params()),
    }
}

fn tuple_or_named(items: Vec<Expr>) -> Expr {
    let all_named = !items.is_empty()
        && items
            .iter()
            .all(|item| matches!(item, Expr::Assign { sink, .. } if matches!(**sink, Expr::Ident(_))));
    if !all_named {
        return Expr::Tuple(items);
    }
    Expr::NamedTuple(
        items
            .into_iter()
            .filter_map(|item| match item {
                Expr::Assign { sink, value } => match *sink {
                    Expr::Ident(name) => Some((name, *value)),
                    _ => None,
                },
                _ => None,
            })
            .collect(),
    )
}

/// Parse a single macro argument.
pub fn parse_expr(input: &str) -> ParseResult<Expr> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_argument()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse a comma-separated argument list with optional `; kwargs`.
pub fn parse_args(input: &str) -> ParseResult<(Vec<Expr>, Vec<(Rc<str>, Expr)>)> {
    let mut parser = Parser::new(input)?;
    parser.depth = 1;
    let args = parser.parse_args_until(&Token::Eof, false)?;
    parser.finish()?;
    Ok(args)
}

/// Parse `@construct(table, args...; kwargs...)` or `@construct table args...`.
pub fn parse_invocation(input: &str) -> ParseResult<Invocation> {
    let mut parser = Parser::new(input)?;
    let construct: Construct = match parser.advance()? {
        Token::At(name) => name.parse()?,
        other => {
            return Err(ParseError::Expected {
                expected: "@construct".to_string(),
                found: format!("{:?}", other),
            })
        }
    };

    let invocation = if parser.at(&Token::LParen) && !parser.current.space_before {
        parser.open()?;
        let table = parser.parse_expression()?;
        if parser.at(&Token::Comma) {
            parser.advance()?;
        }
        let (args, kwargs) = parser.parse_args_until(&Token::RParen, false)?;
        parser.close(Token::RParen)?;
        Invocation {
            construct,
            table,
            args,
            kwargs,
        }
    } else {
        let table = parser.parse_expression()?;
        let mut args = Vec::new();
        while !parser.at(&Token::Eof) {
            args.push(parser.parse_argument()?);
        }
        Invocation::new(construct, table, args)
    };
    parser.finish()?;
    Ok(invocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnRef;
    use pretty_assertions::assert_eq;

    fn roundtrip(src: &str) -> String {
        parse_expr(src).unwrap().to_string()
    }

    #[test]
    fn test_operators_and_precedence() {
        assert_eq!(roundtrip(":x + :x * 2"), ":x + :x * 2");
        assert_eq!(roundtrip("(a + b) * c"), "(a + b) * c");
        assert_eq!(roundtrip("a ^ b ^ c"), "a ^ b ^ c");
        assert_eq!(roundtrip(":x .- mean(:x)"), ":x .- mean(:x)");
        assert_eq!(roundtrip("a > 1 && !b || c"), "a > 1 && !b || c");
        assert_eq!(roundtrip("-x ^ 2"), "-x ^ 2");
        assert_eq!(roundtrip("-(a + b)"), "-(a + b)");
    }

    #[test]
    fn test_negative_literals_fold() {
        assert_eq!(parse_expr("-3").unwrap(), Expr::int(-3));
        assert_eq!(parse_expr("-2.5").unwrap(), Expr::float(-2.5));
        assert_eq!(parse_expr("1.5e3").unwrap(), Expr::float(1500.0));
    }

    #[test]
    fn test_markers() {
        assert_eq!(parse_expr(":x").unwrap(), Expr::quote("x"));
        assert_eq!(parse_expr("$\"a b\"").unwrap(), Expr::interp(Expr::string("a b")));
        assert_eq!(parse_expr("$1").unwrap(), Expr::interp(Expr::int(1)));
        assert_eq!(parse_expr("$col").unwrap(), Expr::interp(Expr::ident("col")));
        assert_eq!(roundtrip("$(cols[1])"), "$(cols[1])");
        assert_eq!(
            parse_expr("$3.5").unwrap(),
            Expr::interp(Expr::float(3.5))
        );
        assert_eq!(
            parse_expr("$(Column(:x))").unwrap(),
            Expr::interp(Expr::call("Column", vec![Expr::quote("x")]))
        );
        assert_ne!(
            parse_expr(":x").unwrap(),
            Expr::column(ColumnRef::symbol("x"))
        );
    }

    #[test]
    fn test_flags_cover_assignment() {
        let e = parse_expr("@c :y = :x .- mean(:x)").unwrap();
        match e {
            Expr::Flagged { flags, inner } => {
                assert_eq!(&*flags, "c");
                assert!(matches!(*inner, Expr::Assign { .. }));
            }
            other => panic!("expected flags, got {:?}", other),
        }
        let e = parse_expr(":y = @m f(:x)").unwrap();
        assert_eq!(e.to_string(), ":y = @m f(:x)");
    }

    #[test]
    fn test_calls_and_keywords() {
        let e = parse_expr("round(:x; digits = 2)").unwrap();
        assert_eq!(e.to_string(), "round(:x, digits = 2)");
        let e = parse_expr("f(:a, k = 1)").unwrap();
        match e {
            Expr::Call { args, .. } => assert!(matches!(args[1], Expr::Kw { .. })),
            other => panic!("expected call, got {:?}", other),
        }
        let e = parse_expr("f(:y = :x)").unwrap();
        match e {
            Expr::Call { args, .. } => assert!(matches!(args[0], Expr::Assign { .. })),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_tuples_named_tuples_vectors() {
        assert!(matches!(parse_expr("(:a = 1, :b = 2)").unwrap(), Expr::Tuple(_)));
        assert!(matches!(parse_expr("(a = 1, b = 2)").unwrap(), Expr::NamedTuple(_)));
        assert_eq!(roundtrip("(a = 1,)"), "(a = 1,)");
        assert_eq!(roundtrip("(1,)"), "(1,)");
        assert_eq!(roundtrip("[1, 2, 3]"), "[1, 2, 3]");
        assert_eq!(roundtrip("x.field[2]"), "x.field[2]");
    }

    #[test]
    fn test_lambdas_and_pairs() {
        assert_eq!(roundtrip("x -> x + 1"), "x -> x + 1");
        assert_eq!(roundtrip("(a, b) -> a * b"), "(a, b) -> a * b");
        assert_eq!(roundtrip(":x => f => :y"), ":x => f => :y");
    }

    #[test]
    fn test_blocks() {
        let e = parse_expr("begin\n  :a = :x + 1 # comment\n\n  :b = :y\nend").unwrap();
        match e {
            Expr::Block(items) => assert_eq!(items.len(), 2),
            other => panic!("expected block, got {:?}", other),
        }
        let e = parse_expr("begin z = :x; z + 1 end").unwrap();
        assert_eq!(e.to_string(), "begin z = :x; z + 1 end");
        assert!(matches!(
            parse_expr("begin :a :b end").unwrap_err(),
            ParseError::Expected { .. }
        ));
    }

    #[test]
    fn test_invocation_forms() {
        let inv = parse_invocation("@transform!(df, :y = :x + 1, @c :z = :x; renamecols = false)").unwrap();
        assert_eq!(inv.construct, Construct::TransformInPlace);
        assert_eq!(inv.table, Expr::ident("df"));
        assert_eq!(inv.args.len(), 2);
        assert_eq!(inv.kwargs, vec![(Rc::from("renamecols"), Expr::lit(Value::Bool(false)))]);

        let inv = parse_invocation("@subset df :x > 1 :y < 2").unwrap();
        assert_eq!(inv.construct, Construct::Subset);
        assert_eq!(inv.args.len(), 2);

        let inv = parse_invocation("@combine df begin\n  :m = mean(:x)\n  :s = sum(:x)\nend").unwrap();
        assert_eq!(inv.args.len(), 1);
        assert!(matches!(inv.args[0], Expr::Block(_)));
    }

    #[test]
    fn test_parse_args() {
        let (args, kwargs) = parse_args(":a, :y = :x; view = true").unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(kwargs.len(), 1);
    }

    #[test]
    fn test_named_arguments_before_semicolon_stay_positional() {
        let inv = parse_invocation("@transform(df, AsTable = f(:x), y = :x; view = true)").unwrap();
        assert_eq!(inv.args.len(), 2);
        assert!(matches!(&inv.args[0], Expr::Assign { sink, .. } if **sink == Expr::ident("AsTable")));
        assert_eq!(inv.kwargs, vec![(Rc::from("view"), Expr::lit(Value::Bool(true)))]);

        match parse_expr("f(:x, k = 1)").unwrap() {
            Expr::Call { args, .. } => assert!(matches!(args[1], Expr::Kw { .. })),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_expr("\"abc").unwrap_err(), ParseError::UnterminatedString);
        assert_eq!(parse_expr("f(").unwrap_err(), ParseError::UnexpectedEof);
        assert_eq!(parse_expr("a ? b").unwrap_err(), ParseError::UnexpectedChar('?'));
        assert_eq!(
            parse_invocation("@mutate(df, :x)").unwrap_err(),
            ParseError::UnknownConstruct("mutate".to_string())
        );
        assert!(matches!(
            parse_expr("99999999999999999999").unwrap_err(),
            ParseError::InvalidNumber(_)
        ));
    }
}
