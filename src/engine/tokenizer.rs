//! Rule tokenizer.
//!
//! Splits a rule into alternating code and literal segments so that placeholder
//! substitution never touches the inside of a quoted string:
//!
//! ```text
//! #Weather && slot.city=='Bei\'jing'
//! └──────── Code ──────────┘└ Literal ┘
//! ```
//!
//! Every step emits one code token (possibly empty) holding the longest run
//! without `'` or `"`, then, if a quote follows, one literal token that runs up
//! to the next unescaped copy of the *same* quote. A backslash protects the
//! character after it. Quotes stay in the literal's text, so concatenating all
//! tokens gives back the rule byte for byte.

use crate::Token;
use crate::error::TokenizeError;

fn is_quote(b: u8) -> bool {
    b == b'\'' || b == b'"'
}

/// Split `rule` into [`Token`]s. An empty rule yields no tokens.
#[tracing::instrument(level = "trace", ret, err)]
pub fn tokenize(rule: &str) -> Result<Vec<Token>, TokenizeError> {
    let bytes = rule.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let code_end = bytes[pos..].iter().position(|&b| is_quote(b)).map_or(bytes.len(), |i| pos + i);
        tokens.push(Token::code(&rule[pos..code_end]));
        pos = code_end;

        if pos < bytes.len() {
            let end = literal_end(bytes, pos)?;
            tokens.push(Token::literal(&rule[pos..end]));
            pos = end;
        }
    }

    Ok(tokens)
}

/// Return the byte index just past the literal opening at `start`.
///
/// Scanning starts right after the opening quote, so `'x'` is a valid
/// one-character literal.
fn literal_end(bytes: &[u8], start: usize) -> Result<usize, TokenizeError> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(TokenizeError::Unterminated { quote: quote as char, offset: start })
}
