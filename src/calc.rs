//! Restricted arithmetic evaluator backing the `calculate` tool.
//!
//! Input is tokenized and parsed by a small recursive-descent parser into a
//! closed [`Expr`] tree. Anything outside the grammar below is rejected while
//! parsing, so evaluation only ever sees numbers, two constants, arithmetic
//! operators and a fixed set of math functions.
//!
//! ```text
//! expression := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := ("+" | "-") unary | power
//! power      := primary ("**" unary)?
//! primary    := NUMBER | "pi" | "e" | "(" expression ")" | FUNCTION "(" args ")"
//! ```
//!
//! `**` is right-associative and binds tighter than a unary minus on its left,
//! so `-2**2` is `-4` and `2**-1` is `0.5`.
//!
//! # Example
//!
//! ```
//! use local_agent::calc::evaluate;
//!
//! assert_eq!(evaluate("sqrt(16) + 5 * 2").unwrap(), 14.0);
//! assert!(evaluate("__import__('os')").is_err());
//! ```

use thiserror::Error;

/// Evaluation failure. The display text is what the model sees.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(&'static str),

    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("Unsupported expression type: {0}")]
    UnsupportedExpression(&'static str),

    #[error("{function}() takes {expected} ({given} given)")]
    Arity {
        function: &'static str,
        expected: &'static str,
        given: usize,
    },

    #[error("{0}() argument must be an integer")]
    NotAnInteger(&'static str),

    #[error("math domain error")]
    MathDomain,

    #[error("Numeric result out of range")]
    OutOfRange,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Constant(Constant),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
}

/// Callable math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sqrt,
    Log,
    Log10,
    Exp,
    Pow,
    Abs,
    Floor,
    Ceil,
    Round,
}

impl Function {
    pub const ALL: [Function; 15] = [
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Asin,
        Function::Acos,
        Function::Atan,
        Function::Sqrt,
        Function::Log,
        Function::Log10,
        Function::Exp,
        Function::Pow,
        Function::Abs,
        Function::Floor,
        Function::Ceil,
        Function::Round,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Asin => "asin",
            Function::Acos => "acos",
            Function::Atan => "atan",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Exp => "exp",
            Function::Pow => "pow",
            Function::Abs => "abs",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Round => "round",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn check_arity(&self, given: usize) -> Result<(), CalcError> {
        let (min, max, expected) = match self {
            Function::Log | Function::Round => (1, 2, "1 or 2 arguments"),
            Function::Pow => (2, 2, "exactly 2 arguments"),
            _ => (1, 1, "exactly one argument"),
        };
        if given < min || given > max {
            return Err(CalcError::Arity {
                function: self.name(),
                expected,
                given,
            });
        }
        Ok(())
    }
}

/// Parses and evaluates `input` in one step.
pub fn evaluate(input: &str) -> Result<f64, CalcError> {
    parse(input)?.eval()
}

/// Longest accepted input, in tokens. Bounds the depth of operator chains.
pub const MAX_TOKENS: usize = 1_000;

/// Deepest accepted nesting of parentheses, unary signs and exponents.
pub const MAX_DEPTH: usize = 100;

/// Parses `input` into an expression tree without evaluating it.
pub fn parse(input: &str) -> Result<Expr, CalcError> {
    let tokens = tokenize(input)?;
    if tokens.len() > MAX_TOKENS {
        return Err(CalcError::InvalidSyntax(format!(
            "expression too long ({} tokens, max {})",
            tokens.len(),
            MAX_TOKENS
        )));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.next() {
        None => Ok(expr),
        Some(token) => Err(parser.unexpected(token)),
    }
}

impl Expr {
    pub fn eval(&self) -> Result<f64, CalcError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Constant(Constant::Pi) => Ok(std::f64::consts::PI),
            Expr::Constant(Constant::E) => Ok(std::f64::consts::E),
            Expr::Unary(UnaryOp::Plus, operand) => operand.eval(),
            Expr::Unary(UnaryOp::Neg, operand) => Ok(-operand.eval()?),
            Expr::Binary(op, lhs, rhs) => apply_binary(*op, lhs.eval()?, rhs.eval()?),
            Expr::Call(function, args) => {
                let values = args.iter().map(Expr::eval).collect::<Result<Vec<_>, _>>()?;
                apply_function(*function, &values)
            }
        }
    }
}

fn apply_binary(op: BinOp, a: f64, b: f64) -> Result<f64, CalcError> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            floored_mod(a, b)
        }
        BinOp::Pow => power(a, b)?,
    };
    finite(result)
}

fn power(base: f64, exponent: f64) -> Result<f64, CalcError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(CalcError::MathDomain);
    }
    Ok(base.powf(exponent))
}

/// Remainder taking the sign of the divisor.
fn floored_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn finite(value: f64) -> Result<f64, CalcError> {
    if value.is_nan() {
        Err(CalcError::MathDomain)
    } else if value.is_infinite() {
        Err(CalcError::OutOfRange)
    } else {
        Ok(value)
    }
}

fn apply_function(function: Function, args: &[f64]) -> Result<f64, CalcError> {
    let x = args.first().copied().unwrap_or_default();
    let second = args.get(1).copied();

    let result = match function {
        Function::Sin | Function::Cos | Function::Tan if x.is_infinite() => {
            return Err(CalcError::MathDomain);
        }
        Function::Sin => x.sin(),
        Function::Cos => x.cos(),
        Function::Tan => x.tan(),
        Function::Asin | Function::Acos if !(-1.0..=1.0).contains(&x) => {
            return Err(CalcError::MathDomain);
        }
        Function::Asin => x.asin(),
        Function::Acos => x.acos(),
        Function::Atan => x.atan(),
        Function::Sqrt if x < 0.0 => return Err(CalcError::MathDomain),
        Function::Sqrt => x.sqrt(),
        Function::Log | Function::Log10 if x <= 0.0 => return Err(CalcError::MathDomain),
        Function::Log => match second {
            None => x.ln(),
            Some(base) if base <= 0.0 => return Err(CalcError::MathDomain),
            Some(base) if base == 1.0 => return Err(CalcError::DivisionByZero),
            Some(base) => x.ln() / base.ln(),
        },
        Function::Log10 => x.log10(),
        Function::Exp => x.exp(),
        Function::Pow => power(x, second.unwrap_or_default())?,
        Function::Abs => x.abs(),
        Function::Floor => x.floor(),
        Function::Ceil => x.ceil(),
        Function::Round => match second {
            None => x.round_ties_even(),
            Some(digits) => round_to(x, digits)?,
        },
    };

    finite(result)
}

fn round_to(x: f64, digits: f64) -> Result<f64, CalcError> {
    if digits.fract() != 0.0 || !digits.is_finite() {
        return Err(CalcError::NotAnInteger("round"));
    }
    let digits = digits.clamp(-308.0, 308.0) as i32;
    let factor = 10f64.powi(digits.abs());
    if digits >= 0 {
        let scaled = x * factor;
        if !scaled.is_finite() {
            return Ok(x);
        }
        Ok(scaled.round_ties_even() / factor)
    } else {
        Ok((x / factor).round_ties_even() * factor)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Str,
    Sym(&'static str),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Ident(name) => format!("'{name}'"),
            Token::Str => "string".to_string(),
            Token::Sym(s) => format!("'{s}'"),
        }
    }
}

// Longer symbols first so "**" wins over "*"
const SYMBOLS: &[&str] = &[
    "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "@", "&", "|", "^",
    "~", "<", ">", "=", "(", ")", ",", ".", "[", "]",
];

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                let digits_start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i == digits_start {
                    return Err(CalcError::InvalidSyntax(format!(
                        "malformed number at position {start}"
                    )));
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f64>().map_err(|_| {
                CalcError::InvalidSyntax(format!("malformed number '{text}' at position {start}"))
            })?;
            tokens.push((Token::Number(value), start));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((Token::Ident(chars[start..i].iter().collect()), start));
            continue;
        }

        if c == '\'' || c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            if i >= chars.len() {
                return Err(CalcError::InvalidSyntax(format!(
                    "unterminated string starting at position {start}"
                )));
            }
            i += 1;
            tokens.push((Token::Str, start));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match SYMBOLS.iter().find(|sym| rest.starts_with(**sym)) {
            Some(sym) => {
                i += sym.len();
                tokens.push((Token::Sym(*sym), start));
            }
            None => {
                return Err(CalcError::InvalidSyntax(format!(
                    "unexpected character '{c}' at position {start}"
                )));
            }
        }
    }

    Ok(tokens)
}

/// Operators the tokenizer recognises but the evaluator refuses, by display name.
fn disallowed_operator(sym: &str) -> Option<&'static str> {
    let name = match sym {
        "//" => "FloorDiv",
        "@" => "MatMult",
        "&" => "BitAnd",
        "|" => "BitOr",
        "^" => "BitXor",
        "<<" => "LShift",
        ">>" => "RShift",
        "~" => "Invert",
        "<" => "Lt",
        ">" => "Gt",
        "<=" => "LtE",
        ">=" => "GtE",
        "==" => "Eq",
        "!=" => "NotEq",
        _ => return None,
    };
    Some(name)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, sym: &str) -> Result<(), CalcError> {
        if self.eat(sym) {
            return Ok(());
        }
        match self.next() {
            Some(token) => Err(self.unexpected(token)),
            None => Err(CalcError::InvalidSyntax(format!("expected '{sym}' before end of input"))),
        }
    }

    /// Error for a token the grammar has no place for. `self.pos` is just
    /// past it.
    fn unexpected(&self, token: Token) -> CalcError {
        if let Token::Sym(sym) = &token {
            if let Some(name) = disallowed_operator(sym) {
                return CalcError::UnsupportedOperator(name);
            }
        }
        let position = self
            .pos
            .checked_sub(1)
            .and_then(|p| self.tokens.get(p))
            .map(|(_, at)| *at)
            .unwrap_or_default();
        CalcError::InvalidSyntax(format!("unexpected {} at position {}", token.describe(), position))
    }

    fn expression(&mut self) -> Result<Expr, CalcError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("+")) => BinOp::Add,
                Some(Token::Sym("-")) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, CalcError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("*")) => BinOp::Mul,
                Some(Token::Sym("/")) => BinOp::Div,
                Some(Token::Sym("%")) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// Every recursive path in the grammar passes through here, so this is
    /// where nesting is counted.
    fn unary(&mut self) -> Result<Expr, CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::InvalidSyntax("expression nested too deeply".to_string()));
        }
        let expr = self.signed();
        self.depth -= 1;
        expr
    }

    fn signed(&mut self) -> Result<Expr, CalcError> {
        if self.eat("+") {
            return Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.unary()?)));
        }
        if self.eat("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        if self.eat("~") {
            return Err(CalcError::UnsupportedOperator("Invert"));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, CalcError> {
        let base = self.primary()?;
        if self.eat("**") {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, CalcError> {
        let atom = match self.next() {
            Some(Token::Number(n)) => Expr::Number(n),
            Some(Token::Ident(name)) => {
                if self.eat("(") {
                    self.call(name)?
                } else {
                    self.reject_trailer()?;
                    match name.as_str() {
                        "pi" => Expr::Constant(Constant::Pi),
                        "e" => Expr::Constant(Constant::E),
                        _ => return Err(CalcError::UnknownVariable(name)),
                    }
                }
            }
            Some(Token::Sym("(")) => {
                let inner = self.expression()?;
                if self.eat(",") {
                    return Err(CalcError::UnsupportedExpression("tuple"));
                }
                self.expect(")")?;
                inner
            }
            Some(Token::Sym("[")) => return Err(CalcError::UnsupportedExpression("list")),
            Some(Token::Str) => return Err(CalcError::UnsupportedExpression("string literal")),
            Some(token) => return Err(self.unexpected(token)),
            None => return Err(CalcError::InvalidSyntax("unexpected end of input".to_string())),
        };

        self.reject_trailer()?;
        Ok(atom)
    }

    fn reject_trailer(&self) -> Result<(), CalcError> {
        match self.peek() {
            Some(Token::Sym(".")) => Err(CalcError::UnsupportedExpression("attribute access")),
            Some(Token::Sym("[")) => Err(CalcError::UnsupportedExpression("subscript")),
            Some(Token::Sym("(")) => Err(CalcError::UnsupportedExpression("call of a non-function")),
            _ => Ok(()),
        }
    }

    /// Parses call arguments after the opening parenthesis, then resolves
    /// the function name.
    fn call(&mut self, name: String) -> Result<Expr, CalcError> {
        let mut args = Vec::new();
        while !self.eat(")") {
            if matches!(self.peek(), Some(Token::Ident(_)))
                && matches!(self.peek_at(1), Some(Token::Sym("=")))
            {
                return Err(CalcError::UnsupportedExpression("keyword argument"));
            }
            args.push(self.expression()?);
            if !self.eat(",") {
                self.expect(")")?;
                break;
            }
        }

        let function = Function::from_name(&name).ok_or(CalcError::UnsupportedFunction(name))?;
        function.check_arity(args.len())?;
        Ok(Expr::Call(function, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(evaluate("sqrt(16) + 5 * 2").unwrap(), 14.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("1.5e3 + .5").unwrap(), 1500.5);
    }

    #[test]
    fn test_power_precedence() {
        assert_eq!(evaluate("-2**2").unwrap(), -4.0);
        assert_eq!(evaluate("2**-1").unwrap(), 0.5);
        assert_eq!(evaluate("2**3**2").unwrap(), 512.0);
        assert_eq!(evaluate("(-2)**2").unwrap(), 4.0);
    }

    #[test]
    fn test_constants_and_functions() {
        assert!(approx(evaluate("pi").unwrap(), std::f64::consts::PI));
        assert!(approx(evaluate("log(e)").unwrap(), 1.0));
        assert!(approx(evaluate("log(8, 2)").unwrap(), 3.0));
        assert!(approx(evaluate("log10(1000)").unwrap(), 3.0));
        assert!(approx(evaluate("sin(pi / 2)").unwrap(), 1.0));
        assert_eq!(evaluate("pow(2, 10)").unwrap(), 1024.0);
        assert_eq!(evaluate("abs(-3) + floor(2.7) + ceil(2.1)").unwrap(), 8.0);
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(evaluate("round(2.5)").unwrap(), 2.0);
        assert_eq!(evaluate("round(3.5)").unwrap(), 4.0);
        assert_eq!(evaluate("round(-0.5)").unwrap(), -0.0);
        assert!(approx(evaluate("round(3.14159, 2)").unwrap(), 3.14));
        assert_eq!(evaluate("round(1234, -2)").unwrap(), 1200.0);
        assert_eq!(
            evaluate("round(1.5, 0.5)").unwrap_err(),
            CalcError::NotAnInteger("round")
        );
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        assert_eq!(evaluate("7 % 3").unwrap(), 1.0);
        assert_eq!(evaluate("-7 % 3").unwrap(), 2.0);
        assert_eq!(evaluate("7 % -3").unwrap(), -2.0);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(evaluate("1/0").unwrap_err(), CalcError::DivisionByZero);
        assert_eq!(evaluate("5 % 0").unwrap_err(), CalcError::DivisionByZero);
        assert_eq!(evaluate("0 ** -1").unwrap_err(), CalcError::DivisionByZero);
        assert_eq!(evaluate("1/0").unwrap_err().to_string(), "Division by zero");
    }

    #[test]
    fn test_rejects_code() {
        let err = evaluate("__import__('os')").unwrap_err();
        assert_eq!(err, CalcError::UnsupportedExpression("string literal"));
        assert_eq!(err.to_string(), "Unsupported expression type: string literal");

        assert_eq!(
            evaluate("math.sqrt(4)").unwrap_err(),
            CalcError::UnsupportedExpression("attribute access")
        );
        assert_eq!(
            evaluate("pi[0]").unwrap_err(),
            CalcError::UnsupportedExpression("subscript")
        );
        assert_eq!(
            evaluate("round(2.5, ndigits=1)").unwrap_err(),
            CalcError::UnsupportedExpression("keyword argument")
        );
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(evaluate("x + 1").unwrap_err().to_string(), "Unknown variable: x");
        assert_eq!(
            evaluate("eval(1)").unwrap_err().to_string(),
            "Unsupported function: eval"
        );
    }

    #[test]
    fn test_unsupported_operators() {
        assert_eq!(evaluate("7 // 2").unwrap_err().to_string(), "Unsupported operator: FloorDiv");
        assert_eq!(evaluate("1 ^ 2").unwrap_err(), CalcError::UnsupportedOperator("BitXor"));
        assert_eq!(evaluate("~1").unwrap_err(), CalcError::UnsupportedOperator("Invert"));
        assert_eq!(evaluate("(1 < 2)").unwrap_err(), CalcError::UnsupportedOperator("Lt"));
    }

    #[test]
    fn test_invalid_syntax() {
        for input in ["", "2 +", "(1 + 2", "1 2", "3 $ 4", "1e+"] {
            match evaluate(input) {
                Err(CalcError::InvalidSyntax(_)) => {}
                other => panic!("{input:?}: expected syntax error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_domain_and_range() {
        assert_eq!(evaluate("sqrt(-1)").unwrap_err(), CalcError::MathDomain);
        assert_eq!(evaluate("log(0)").unwrap_err(), CalcError::MathDomain);
        assert_eq!(evaluate("asin(2)").unwrap_err(), CalcError::MathDomain);
        assert_eq!(evaluate("(-8) ** 0.5").unwrap_err(), CalcError::MathDomain);
        assert_eq!(evaluate("10 ** 400").unwrap_err(), CalcError::OutOfRange);
        assert_eq!(evaluate("exp(1000)").unwrap_err(), CalcError::OutOfRange);
    }

    #[test]
    fn test_arity() {
        assert_eq!(
            evaluate("sqrt(1, 2)").unwrap_err().to_string(),
            "sqrt() takes exactly one argument (2 given)"
        );
        assert!(matches!(evaluate("pow(2)"), Err(CalcError::Arity { given: 1, .. })));
        assert!(matches!(evaluate("abs()"), Err(CalcError::Arity { given: 0, .. })));
    }

    fn is_syntax_error(result: Result<f64, CalcError>, detail: &str) -> bool {
        matches!(result, Err(CalcError::InvalidSyntax(message)) if message.contains(detail))
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let parens = format!("{}1{}", "(".repeat(150), ")".repeat(150));
        assert!(is_syntax_error(evaluate(&parens), "nested too deeply"));

        let signs = format!("{}1", "-".repeat(150));
        assert!(is_syntax_error(evaluate(&signs), "nested too deeply"));

        let powers = format!("{}2", "2 ** ".repeat(150));
        assert!(is_syntax_error(evaluate(&powers), "nested too deeply"));

        let calls = format!("{}1{}", "sqrt(".repeat(150), ")".repeat(150));
        assert!(is_syntax_error(evaluate(&calls), "nested too deeply"));
    }

    #[test]
    fn test_huge_input_is_an_error() {
        let parens = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(is_syntax_error(evaluate(&parens), "too long"));
        assert!(is_syntax_error(evaluate(&"(".repeat(10_000)), "too long"));
        assert!(is_syntax_error(evaluate(&format!("{}1", "-".repeat(200_000))), "too long"));
        assert!(is_syntax_error(evaluate(&format!("{}1", "1+".repeat(100_000))), "too long"));
    }

    #[test]
    fn test_nesting_within_limits() {
        let parens = format!("{}7{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(evaluate(&parens).unwrap(), 7.0);
        assert_eq!(evaluate(&format!("{}1", "-".repeat(50))).unwrap(), 1.0);
        assert_eq!(evaluate(&format!("{}1", "1+".repeat(400))).unwrap(), 401.0);
    }

    #[test]
    fn test_parse_tree() {
        let expr = parse("-sqrt(4)").unwrap();
        assert_eq!(
            expr,
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Call(Function::Sqrt, vec![Expr::Number(4.0)]))
            )
        );
    }
}
