//! Restricted expression evaluator.
//!
//! Resolved rule text is parsed with a small recursive-descent grammar and
//! evaluated over JSON-like scalars. Nothing outside this closed operator set
//! can be expressed, so a hostile slot or session value can only ever be a
//! string literal.
//!
//! ```text
//! expr    := or
//! or      := and ( '||' and )*
//! and     := cmp ( '&&' cmp )*
//! cmp     := unary ( ( '==' | '!=' | '>' | '<' | '>=' | '<=' ) unary )?
//! unary   := '!' unary | primary
//! primary := 'true' | 'false' | 'null' | number | string | '(' expr ')'
//! ```
//!
//! `&&` and `||` short-circuit; the skipped side is parsed but never evaluated,
//! so it cannot raise a type error. A bare value used as a condition follows
//! JSON truthiness: `false`, `null`, `""` and `0` are false.

use crate::error::EvalError;
use std::cmp::Ordering;
use std::fmt;

/// A value produced while evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Number(n) => *n != 0.0 && !n.is_nan(),
            Scalar::String(s) => !s.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "boolean",
            Scalar::Number(_) => "number",
            Scalar::String(_) => "string",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Lit(Scalar),
    Not(Box<Expr>),
    /// Operands of one `&&` chain, kept flat so long chains never nest.
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

/// Evaluate resolved rule text to a boolean with the default nesting limit.
pub fn evaluate(text: &str) -> Result<bool, EvalError> {
    evaluate_with_depth(text, crate::Options::default().max_depth)
}

#[tracing::instrument(level = "trace", ret, err)]
pub(crate) fn evaluate_with_depth(text: &str, max_depth: usize) -> Result<bool, EvalError> {
    let expr = Expr::parse(text, max_depth)?;
    Ok(expr.eval()?.is_truthy())
}

impl Expr {
    pub(crate) fn parse(text: &str, max_depth: usize) -> Result<Expr, EvalError> {
        let tokens = lex(text)?;
        let mut parser = Parser { tokens, pos: 0, depth: 0, max_depth };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(t) => Err(EvalError::TrailingInput { found: t.kind.describe(), offset: t.offset }),
        }
    }

    pub(crate) fn eval(&self) -> Result<Scalar, EvalError> {
        match self {
            Expr::Lit(v) => Ok(v.clone()),
            Expr::Not(inner) => Ok(Scalar::Bool(!inner.eval()?.is_truthy())),
            Expr::And(operands) => {
                for operand in operands {
                    if !operand.eval()?.is_truthy() {
                        return Ok(Scalar::Bool(false));
                    }
                }
                Ok(Scalar::Bool(true))
            }
            Expr::Or(operands) => {
                for operand in operands {
                    if operand.eval()?.is_truthy() {
                        return Ok(Scalar::Bool(true));
                    }
                }
                Ok(Scalar::Bool(false))
            }
            Expr::Cmp(op, l, r) => compare(*op, &l.eval()?, &r.eval()?).map(Scalar::Bool),
        }
    }
}

fn compare(op: CmpOp, left: &Scalar, right: &Scalar) -> Result<bool, EvalError> {
    if matches!(op, CmpOp::Eq | CmpOp::Ne) {
        let equal = match (left, right) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Number(a), Scalar::Number(b)) => a == b,
            (Scalar::String(a), Scalar::String(b)) => a == b,
            _ => false,
        };
        return Ok(if op == CmpOp::Eq { equal } else { !equal });
    }

    let ordering = match (left, right) {
        (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
        (Scalar::String(a), Scalar::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(EvalError::TypeMismatch { op: op.symbol(), left: left.type_name(), right: right.type_name() });
    };

    Ok(match op {
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
    })
}

// --- Lexer ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum LexKind {
    And,
    Or,
    Not,
    Cmp(CmpOp),
    LParen,
    RParen,
    Value(Scalar),
}

impl LexKind {
    fn describe(&self) -> String {
        match self {
            LexKind::And => "'&&'".to_string(),
            LexKind::Or => "'||'".to_string(),
            LexKind::Not => "'!'".to_string(),
            LexKind::Cmp(op) => format!("'{}'", op.symbol()),
            LexKind::LParen => "'('".to_string(),
            LexKind::RParen => "')'".to_string(),
            LexKind::Value(v) => format!("value {v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Lexeme {
    kind: LexKind,
    offset: usize,
}

fn lex(text: &str) -> Result<Vec<Lexeme>, EvalError> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let two = text[offset..].get(..2).unwrap_or("");
        let (kind, width) = match (c, two) {
            (_, "&&") => (LexKind::And, 2),
            (_, "||") => (LexKind::Or, 2),
            (_, "==") => (LexKind::Cmp(CmpOp::Eq), 2),
            (_, "!=") => (LexKind::Cmp(CmpOp::Ne), 2),
            (_, ">=") => (LexKind::Cmp(CmpOp::Ge), 2),
            (_, "<=") => (LexKind::Cmp(CmpOp::Le), 2),
            ('>', _) => (LexKind::Cmp(CmpOp::Gt), 1),
            ('<', _) => (LexKind::Cmp(CmpOp::Lt), 1),
            ('!', _) => (LexKind::Not, 1),
            ('(', _) => (LexKind::LParen, 1),
            (')', _) => (LexKind::RParen, 1),
            ('\'' | '"', _) => {
                let (s, width) = lex_string(&text[offset..], offset)?;
                (LexKind::Value(Scalar::String(s)), width)
            }
            ('-' | '0'..='9', _) => {
                let width = number_width(&text[offset..]);
                if width == 0 {
                    return Err(EvalError::UnexpectedChar { ch: c, offset });
                }
                let raw = &text[offset..offset + width];
                let n: f64 = raw.parse().map_err(|_| EvalError::InvalidNumber(raw.to_string()))?;
                (LexKind::Value(Scalar::Number(n)), width)
            }
            _ if c.is_alphabetic() || c == '_' => {
                let width =
                    text[offset..].find(|ch: char| !(ch.is_alphanumeric() || ch == '_')).unwrap_or(text.len() - offset);
                let word = &text[offset..offset + width];
                let value = match word {
                    "true" => Scalar::Bool(true),
                    "false" => Scalar::Bool(false),
                    "null" => Scalar::Null,
                    _ => return Err(EvalError::UnexpectedToken { found: format!("identifier '{word}'"), offset }),
                };
                (LexKind::Value(value), width)
            }
            _ => return Err(EvalError::UnexpectedChar { ch: c, offset }),
        };

        out.push(Lexeme { kind, offset });
        while chars.peek().is_some_and(|&(i, _)| i < offset + width) {
            chars.next();
        }
    }

    Ok(out)
}

/// Byte width of a JSON number at the start of `s`, or 0 if there is none.
fn number_width(s: &str) -> usize {
    let re = regex!(r"^-?[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?");
    re.find(s).map_or(0, |m| m.end())
}

/// Read a quoted string at the start of `s`; returns the unescaped text and
/// the byte width including both quotes.
fn lex_string(s: &str, base: usize) -> Result<(String, usize), EvalError> {
    let mut chars = s.char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(EvalError::UnexpectedEnd);
    };
    let mut out = String::new();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((out, i + c.len_utf8())),
            '\\' => {
                let Some((_, esc)) = chars.next() else { break };
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    '/' | '\\' | '\'' | '"' => out.push(esc),
                    'u' => out.push(unicode_escape(&mut chars)?),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            c => out.push(c),
        }
    }

    Err(EvalError::UnexpectedToken { found: "unterminated string".to_string(), offset: base })
}

fn hex4(chars: &mut std::str::CharIndices<'_>) -> Result<u32, EvalError> {
    let digits: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
    if digits.len() != 4 {
        return Err(EvalError::InvalidEscape(format!("u{digits}")));
    }
    u32::from_str_radix(&digits, 16).map_err(|_| EvalError::InvalidEscape(format!("u{digits}")))
}

fn unicode_escape(chars: &mut std::str::CharIndices<'_>) -> Result<char, EvalError> {
    let high = hex4(chars)?;
    if (0xD800..0xDC00).contains(&high) {
        let rest = chars.as_str();
        if rest.starts_with("\\u") {
            chars.next();
            chars.next();
            let low = hex4(chars)?;
            if (0xDC00..0xE000).contains(&low) {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return char::from_u32(code).ok_or_else(|| EvalError::InvalidEscape(format!("u{high:04x}")));
            }
        }
        return Err(EvalError::InvalidEscape(format!("u{high:04x}")));
    }
    char::from_u32(high).ok_or_else(|| EvalError::InvalidEscape(format!("u{high:04x}")))
}

// --- Parser -----------------------------------------------------------------

struct Parser {
    tokens: Vec<Lexeme>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Lexeme, EvalError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(EvalError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, kind: &LexKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EvalError::TooDeep(self.max_depth));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, EvalError> {
        let first = self.and()?;
        if !self.eat(&LexKind::Or) {
            return Ok(first);
        }
        let mut operands = vec![first, self.and()?];
        while self.eat(&LexKind::Or) {
            operands.push(self.and()?);
        }
        Ok(Expr::Or(operands))
    }

    fn and(&mut self) -> Result<Expr, EvalError> {
        let first = self.cmp()?;
        if !self.eat(&LexKind::And) {
            return Ok(first);
        }
        let mut operands = vec![first, self.cmp()?];
        while self.eat(&LexKind::And) {
            operands.push(self.cmp()?);
        }
        Ok(Expr::And(operands))
    }

    fn cmp(&mut self) -> Result<Expr, EvalError> {
        let left = self.unary()?;
        let op = match self.peek() {
            Some(Lexeme { kind: LexKind::Cmp(op), .. }) => *op,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.unary()?;
        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        if self.eat(&LexKind::Not) {
            self.enter()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let tok = self.next()?;
        match tok.kind {
            LexKind::Value(v) => Ok(Expr::Lit(v)),
            LexKind::LParen => {
                self.enter()?;
                let inner = self.or()?;
                self.depth -= 1;
                match self.next() {
                    Ok(Lexeme { kind: LexKind::RParen, .. }) => Ok(inner),
                    Ok(other) => Err(EvalError::UnexpectedToken { found: other.kind.describe(), offset: other.offset }),
                    Err(err) => Err(err),
                }
            }
            other => Err(EvalError::UnexpectedToken { found: other.describe(), offset: tok.offset }),
        }
    }
}
