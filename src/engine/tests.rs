use crate::context::ContextProvider;
use crate::{Options, check_rule};
use serde_json::{Value, json};
use std::collections::HashMap;

/// In-memory context used across the engine tests.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeTurn {
    intent: Option<String>,
    request_type: String,
    session: crate::Session,
    slots: HashMap<String, String>,
}

impl FakeTurn {
    pub(crate) fn intent(name: &str) -> Self {
        FakeTurn { intent: Some(name.to_string()), request_type: "IntentRequest".to_string(), ..Default::default() }
    }

    pub(crate) fn launch() -> Self {
        FakeTurn { request_type: "LaunchRequest".to_string(), ..Default::default() }
    }

    pub(crate) fn with_slot(mut self, name: &str, value: &str) -> Self {
        self.slots.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn with_session(mut self, attributes: Value) -> Self {
        self.session = crate::Session::from_value(&attributes);
        self
    }
}

impl ContextProvider for FakeTurn {
    fn current_intent_name(&self) -> Option<&str> {
        self.intent.as_deref()
    }

    fn session_value(&self, path: &str, default: &Value) -> Value {
        self.session.get_path(path, default)
    }

    fn slot_value(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }

    fn request_type(&self) -> &str {
        &self.request_type
    }
}

#[test]
fn rule_examples_matching() {
    let weather = FakeTurn::intent("Weather")
        .with_slot("city", "Beijing")
        .with_slot("quote", "it's \"fine\"")
        .with_session(json!({ "count": 5, "user": { "name": "li", "vip": true }, "empty": "" }));

    // (expected, rule)
    let cases: Vec<(bool, &str)> = vec![
        (true, "#Weather"),
        (false, "#OpenIntent"),
        (true, "!#OpenIntent"),
        (true, "slot.city=='Beijing'"),
        (true, "slot.city==\"Beijing\""),
        (false, "slot.city=='Shanghai'"),
        (true, "slot.city"),
        (false, "slot.date"),
        (true, "slot.date == null"),
        (true, "#Weather && slot.city=='Beijing'"),
        (true, "#Other || slot.city != 'Shanghai'"),
        (true, "session.count > 3"),
        (true, "session.count >= 5 && session.count <= 5"),
        (false, "session.count < 3"),
        (true, "session.user.name == 'li'"),
        (true, "session.user.vip"),
        (true, "session.user.vip == true"),
        (false, "session.empty"),
        (false, "session.missing"),
        (true, "(#Weather || #News) && !(session.count == 0)"),
        (true, "slot.quote == 'it\\'s \"fine\"'"),
        (true, "'#Weather' == \"#Weather\""),
        (false, "LaunchRequest"),
        (false, ""),
        (false, "\"unterminated"),
        (false, "slot.city > 3"),
        (false, "#Weather &&"),
    ];

    for (expected, rule) in cases {
        let got = check_rule(rule, &weather, &Options::default()).unwrap_or(false);
        assert_eq!(got, expected, "rule {rule:?}");
    }
}

#[test]
fn request_type_rules() {
    let launch = FakeTurn::launch();
    assert!(check_rule("LaunchRequest", &launch, &Options::default()).unwrap());
    assert!(!check_rule("SessionEndedRequest", &launch, &Options::default()).unwrap());
    assert!(!check_rule("#Weather", &launch, &Options::default()).unwrap());
}

#[test]
fn session_default_feeds_absent_values() {
    let turn = FakeTurn::intent("Count");
    let zero = Options { session_default: json!(0), ..Options::default() };
    assert!(!check_rule("session.count > 3", &turn, &zero).unwrap());

    let five = Options { session_default: json!(5), ..Options::default() };
    assert!(check_rule("session.count > 3", &turn, &five).unwrap());

    // null default: ordering against a number is a type error
    assert!(check_rule("session.count > 3", &turn, &Options::default()).is_err());
}

#[test]
fn rule_checks_are_pure() {
    let turn = FakeTurn::intent("Weather").with_slot("city", "Beijing");
    let rule = "#Weather && slot.city == 'Beijing'";
    let first = check_rule(rule, &turn, &Options::default());
    for _ in 0..3 {
        assert_eq!(check_rule(rule, &turn, &Options::default()), first);
    }
}
