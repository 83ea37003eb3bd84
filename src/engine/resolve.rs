//! Placeholder resolution.
//!
//! Code segments may reference the turn through four placeholder families.
//! Each family is substituted in a fixed order, and every match is replaced by
//! a JSON literal built from the [`ContextProvider`]:
//!
//! ```text
//! #Name            -> true | false            (intent name equals Name)
//! session.a.b      -> JSON of session value   (Options::session_default if absent)
//! slot.name        -> JSON string | null
//! LaunchRequest    -> true | false            (whole segment only)
//! SessionEndedRequest
//! ```
//!
//! Text inserted by one family is never rescanned by a later family: a session
//! value of `"slot.city"` stays a string literal. Literal tokens pass through
//! untouched.

use crate::context::{ContextProvider, SessionPath};
use crate::{Options, PlaceholderKind, Token, TokenKind};
use regex::{Captures, Regex};
use serde_json::Value;

/// A run of code text that is either still raw or already substituted.
#[derive(Debug)]
enum Piece {
    Raw(String),
    Resolved(String),
}

fn pattern(kind: PlaceholderKind) -> &'static Regex {
    match kind {
        PlaceholderKind::IntentRef => regex!(r"#([\w.]+)"),
        PlaceholderKind::SessionRef => regex!(r"session\.([\w.]+)"),
        PlaceholderKind::SlotRef => regex!(r"slot\.(\w+)"),
        PlaceholderKind::RequestTypeLiteral => regex!(r"^(LaunchRequest|SessionEndedRequest)$"),
    }
}

/// Resolve a whole token list into expression text.
pub fn resolve(tokens: &[Token], ctx: &dyn ContextProvider, options: &Options) -> String {
    tokens
        .iter()
        .map(|t| match t.kind {
            TokenKind::Literal => t.text.clone(),
            TokenKind::Code => resolve_code(&t.text, ctx, options),
        })
        .collect()
}

/// Substitute every placeholder in one code segment.
pub(crate) fn resolve_code(text: &str, ctx: &dyn ContextProvider, options: &Options) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut pieces = vec![Piece::Raw(text.to_string())];
    for kind in PlaceholderKind::ORDER {
        pieces = substitute(pieces, kind, ctx, options);
    }

    pieces
        .into_iter()
        .map(|p| match p {
            Piece::Raw(s) | Piece::Resolved(s) => s,
        })
        .collect()
}

fn substitute(pieces: Vec<Piece>, kind: PlaceholderKind, ctx: &dyn ContextProvider, options: &Options) -> Vec<Piece> {
    // The request-type literal only applies when the segment is untouched.
    if kind == PlaceholderKind::RequestTypeLiteral && pieces.len() != 1 {
        return pieces;
    }

    let re = pattern(kind);
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let raw = match piece {
            Piece::Raw(raw) => raw,
            resolved => {
                out.push(resolved);
                continue;
            }
        };

        let mut last = 0;
        for caps in re.captures_iter(&raw) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                out.push(Piece::Raw(raw[last..whole.start()].to_string()));
            }
            out.push(Piece::Resolved(replacement(kind, &caps, ctx, options)));
            last = whole.end();
        }
        if last < raw.len() {
            out.push(Piece::Raw(raw[last..].to_string()));
        }
    }
    out
}

fn replacement(kind: PlaceholderKind, caps: &Captures<'_>, ctx: &dyn ContextProvider, options: &Options) -> String {
    let name = caps.get(1).map_or("", |m| m.as_str());
    let value = match kind {
        PlaceholderKind::IntentRef => Value::Bool(ctx.current_intent_name() == Some(name)),
        PlaceholderKind::SessionRef => match SessionPath::parse(name) {
            Ok(_) => ctx.session_value(name, &options.session_default),
            Err(err) => {
                tracing::debug!(%err, "session placeholder treated as absent");
                options.session_default.clone()
            }
        },
        PlaceholderKind::SlotRef => ctx.slot_value(name).map_or(Value::Null, |v| Value::String(v.to_string())),
        PlaceholderKind::RequestTypeLiteral => Value::Bool(ctx.request_type() == name),
    };

    tracing::trace!(?kind, placeholder = %caps.get(0).map_or("", |m| m.as_str()), %value, "resolved placeholder");
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tokenize;
    use crate::engine::tests::FakeTurn;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn resolved(rule: &str, ctx: &FakeTurn) -> String {
        resolve(&tokenize(rule).unwrap(), ctx, &Options::default())
    }

    #[test]
    fn intent_refs_become_booleans() {
        let ctx = FakeTurn::intent("OpenIntent");
        assert_eq!(resolved("#OpenIntent", &ctx), "true");
        assert_eq!(resolved("#CloseIntent || !#OpenIntent", &ctx), "false || !true");
        assert_eq!(resolved("#weather.today", &FakeTurn::intent("weather.today")), "true");
    }

    #[test]
    fn slot_refs_become_json_strings_or_null() {
        let ctx = FakeTurn::intent("Weather").with_slot("city", "Beijing");
        assert_eq!(resolved("slot.city=='Beijing'", &ctx), "\"Beijing\"=='Beijing'");
        assert_eq!(resolved("slot.date", &ctx), "null");
    }

    #[test]
    fn slot_values_are_json_escaped() {
        let ctx = FakeTurn::intent("Echo").with_slot("text", "say \"hi\" && true");
        assert_eq!(resolved("slot.text", &ctx), r#""say \"hi\" && true""#);
    }

    #[test]
    fn session_refs_use_provider_and_default() {
        let ctx = FakeTurn::intent("Count").with_session(json!({ "count": 5, "user": { "name": "li" } }));
        assert_eq!(resolved("session.count > 3", &ctx), "5 > 3");
        assert_eq!(resolved("session.user.name", &ctx), "\"li\"");
        assert_eq!(resolved("session.missing", &ctx), "null");

        let options = Options { session_default: json!(0), ..Options::default() };
        let empty = FakeTurn::intent("Count");
        assert_eq!(resolve(&tokenize("session.count > 3").unwrap(), &empty, &options), "0 > 3");
    }

    #[test]
    fn malformed_session_paths_read_as_default() {
        let ctx = FakeTurn::intent("Count").with_session(json!({ "a": { "b": 1 } }));
        assert_eq!(resolved("session.a..b", &ctx), "null");
    }

    #[test]
    fn request_type_literal_matches_whole_segment_only() {
        let ctx = FakeTurn::launch();
        assert_eq!(resolved("LaunchRequest", &ctx), "true");
        assert_eq!(resolved("SessionEndedRequest", &ctx), "false");
        assert_eq!(resolved("LaunchRequest && true", &ctx), "LaunchRequest && true");
    }

    #[test]
    fn literals_are_never_substituted() {
        let ctx = FakeTurn::intent("A").with_slot("x", "1");
        assert_eq!(resolved("'#A slot.x'==slot.x", &ctx), "'#A slot.x'==\"1\"");
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let ctx = FakeTurn::intent("A").with_session(json!({ "ref": "slot.city #A" })).with_slot("city", "Beijing");
        assert_eq!(resolved("session.ref", &ctx), "\"slot.city #A\"");
    }

    proptest! {
        #[test]
        fn intent_ref_reflects_intent_name(name in "[A-Za-z_][A-Za-z0-9_]{0,12}", other in "[A-Za-z_][A-Za-z0-9_]{0,12}") {
            let rule = format!("#{name} && x");
            let same = FakeTurn::intent(&name);
            prop_assert_eq!(resolved(&rule, &same), "true && x");

            let differs = FakeTurn::intent(&format!("{other}Other"));
            prop_assume!(format!("{other}Other") != name);
            prop_assert_eq!(resolved(&rule, &differs), "false && x");
        }
    }
}
