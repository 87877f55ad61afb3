//! S-expression reader for AMI parameter strings.
//!
//! The AMI boundary hands the model its parameters as Lisp-like text:
//! `(root (name value) (branch (name value)))`. This module only turns the
//! text into an [`SExpr`] tree; giving the nodes meaning is the job of
//! [`crate::tree`].

use crate::error::{ParamResult, ParseError};
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};

/// S-expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum SExpr {
    /// Bare identifier.
    Atom(String),
    /// Quoted string.
    Str(String),
    /// Integer literal.
    Integer(i64),
    /// Floating-point literal.
    Number(f64),
    /// List of expressions.
    List(Vec<SExpr>),
}

impl SExpr {
    /// Try to get as a bare identifier.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a number (integers widen).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SExpr::Number(n) => Some(*n),
            SExpr::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as a list.
    pub fn as_list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::List(l) => Some(l),
            _ => None,
        }
    }

    /// Name of a list node, i.e. its leading atom.
    pub fn head(&self) -> Option<&str> {
        self.as_list().and_then(|l| l.first()).and_then(|e| match e {
            SExpr::Atom(s) | SExpr::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

/// Parse a complete parameter string into a single root expression.
///
/// Comments (`|` to end of line) are stripped first.
pub fn parse(content: &str) -> ParamResult<SExpr> {
    let cleaned = strip_comments(content);
    let (remaining, expr) = parse_list(cleaned.trim_start())?;

    let rest = remaining.trim();
    if !rest.is_empty() {
        return Err(ParseError::Trailing(rest.chars().take(20).collect()));
    }
    Ok(expr)
}

/// Strip comments (text after `|` on each line).
fn strip_comments(content: &str) -> String {
    content
        .lines()
        .map(|line| match line.find('|') {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_sexpr(input: &str) -> IResult<&str, SExpr> {
    let (input, _) = multispace0(input)?;
    alt((parse_list, parse_string, parse_atom)).parse(input)
}

fn parse_list(input: &str) -> IResult<&str, SExpr> {
    let (input, _) = char('(')(input)?;
    let (input, items) = many0(preceded(multispace0, parse_sexpr)).parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;
    Ok((input, SExpr::List(items)))
}

fn parse_string(input: &str) -> IResult<&str, SExpr> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_while(|c| c != '"')(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, SExpr::Str(content.to_string())))
}

fn parse_atom(input: &str) -> IResult<&str, SExpr> {
    let (input, token) =
        take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')' && c != '"')(input)?;
    Ok((input, classify_token(token)))
}

/// Decide whether a bare token is an integer, a float or an identifier.
fn classify_token(token: &str) -> SExpr {
    let numeric_start = token
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');

    if numeric_start {
        if let Ok(i) = token.parse::<i64>() {
            return SExpr::Integer(i);
        }
        if let Ok(f) = token.parse::<f64>() {
            if f.is_finite() {
                return SExpr::Number(f);
            }
        }
    }
    SExpr::Atom(token.to_string())
}
