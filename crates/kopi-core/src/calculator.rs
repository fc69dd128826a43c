//! Restricted arithmetic evaluator.
//!
//! The grammar is a closed whitelist: numeric literals, `+ - * /`, `**`
//! (right-associative), unary minus, and parentheses. Names, calls, and
//! attribute access fail the parse and are rejected as
//! [`EvalError::InvalidExpression`]. The whitelist is a security boundary:
//! user-supplied expressions must never reach anything resembling `eval`.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::fold_many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EvalError {
    /// Input falls outside the whitelisted grammar.
    #[error("unsupported expression: {0}")]
    InvalidExpression(String),
    #[error("division by zero")]
    DivisionByZero,
    /// Overflow or an operation like `0 ** -1` produced a non-finite value.
    #[error("expression result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

/// Closed expression AST. Evaluation matches exhaustively over these three
/// variants; there is no escape hatch for anything else.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

// -----------------------------------------------------------------------------
// Grammar (precedence low to high): expr -> term -> factor -> power -> atom
// -----------------------------------------------------------------------------

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    preceded(multispace0, inner)
}

/// Unsigned numeric literal with optional fraction and exponent. Signs are
/// handled by the unary-minus rule so `-3` and `2--3` parse uniformly.
fn number(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(tuple((
            digit1,
            opt(preceded(char('.'), digit1)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>().map(Expr::Number),
    )(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        delimited(char('('), expression, ws(char(')'))),
    )))(input)
}

/// `**` binds tighter than unary minus on its left and is right-associative,
/// so `-2 ** 2` is `-(2 ** 2)` and `2 ** 3 ** 2` is `2 ** (3 ** 2)`.
fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(ws(tag("**")), factor))(input)?;
    Ok((input, match exponent {
        Some(exp) => Expr::binary(BinaryOp::Pow, base, exp),
        None => base,
    }))
}

fn factor(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), factor), |operand| Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }),
        power,
    ))(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, init) = factor(input)?;
    fold_many0(
        pair(ws(one_of("*/")), factor),
        move || init.clone(),
        |lhs, (op, rhs)| {
            let op = if op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
            Expr::binary(op, lhs, rhs)
        },
    )(input)
}

fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, init) = term(input)?;
    fold_many0(
        pair(ws(one_of("+-")), term),
        move || init.clone(),
        |lhs, (op, rhs)| {
            let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            Expr::binary(op, lhs, rhs)
        },
    )(input)
}

/// Parse an expression string into the closed AST.
pub fn parse_expression(input: &str) -> Result<Expr, EvalError> {
    all_consuming(terminated(expression, multispace0))(input)
        .map(|(_, expr)| expr)
        .map_err(|_| EvalError::InvalidExpression(input.to_string()))
}

fn eval(expr: &Expr) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => Ok(-eval(operand)?),
        Expr::Binary { op, lhs, rhs } => {
            let left = eval(lhs)?;
            let right = eval(rhs)?;
            match op {
                BinaryOp::Add => Ok(left + right),
                BinaryOp::Sub => Ok(left - right),
                BinaryOp::Mul => Ok(left * right),
                BinaryOp::Div => {
                    if right == 0.0 {
                        Err(EvalError::DivisionByZero)
                    } else {
                        Ok(left / right)
                    }
                }
                BinaryOp::Pow => Ok(left.powf(right)),
            }
        }
    }
}

/// Parse and evaluate a user-supplied expression string.
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    let expr = parse_expression(expression)?;
    let value = eval(&expr)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NotFinite)
    }
}

/// Render a result the way a person would write it: `84`, not `84.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
