//! Request-handling orchestration.
//!
//! A [`BotConfig`] is assembled once with [`BotConfigBuilder`] and never
//! changes afterwards. [`Bot::decide`] walks one turn through it:
//!
//! ```text
//! DomainCheck ──(intent request, no NLU, no event)──────────────▶ Default
//!      │
//!      ▼
//! before-intercepts ──(first non-empty result)──┐
//!      │                                        │
//!      ▼                                        │
//! event listener for event_data.type            │
//!   or ordered rule dispatch                    │
//!      │◀───────────────────────────────────────┘
//!      ▼
//! after-intercepts (each transforms the result) ──▶ Routed(result)
//! ```
//!
//! Every callback along the way receives the same [`TurnState`], where it can
//! write session attributes and decide whether the conversation ends.
//! [`Bot::run`] hands the decision and that state to a [`ResponseBuilder`].

use crate::context::{ContextProvider, TurnSource, TurnState};
use crate::engine::{self, DispatchOutcome, HandlerEntry, is_empty_result};
use crate::error::CallbackError;
use crate::Options;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const INTENT_REQUEST: &str = "IntentRequest";

/// What every handler, listener and interceptor returns.
pub type CallbackResult = Result<Option<Value>, CallbackError>;

/// A free-standing callback.
pub type Callable<A> =
    Arc<dyn Fn(&A, &dyn TurnSource, &mut TurnState, Option<&Value>) -> CallbackResult + Send + Sync>;

/// The application behind a bot. Named-method callbacks resolve here.
pub trait Application {
    /// Invoke the method registered under `name`.
    fn call_method(
        &self,
        name: &str,
        turn: &dyn TurnSource,
        state: &mut TurnState,
        arg: Option<&Value>,
    ) -> CallbackResult {
        let _ = (turn, state, arg);
        Err(CallbackError::UnknownMethod(name.to_string()))
    }
}

/// A callback: either a method name on the [`Application`] or a closure.
pub enum Invocable<A> {
    NamedMethod(String),
    DirectCallable(Callable<A>),
}

impl<A> Invocable<A> {
    pub fn method(name: impl Into<String>) -> Self {
        Invocable::NamedMethod(name.into())
    }

    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(&A, &dyn TurnSource, &mut TurnState, Option<&Value>) -> CallbackResult + Send + Sync + 'static,
    {
        Invocable::DirectCallable(Arc::new(f))
    }
}

impl<A: Application> Invocable<A> {
    /// The single place where both callback shapes are invoked.
    pub fn invoke(&self, app: &A, turn: &dyn TurnSource, state: &mut TurnState, arg: Option<&Value>) -> CallbackResult {
        match self {
            Invocable::NamedMethod(name) => {
                tracing::trace!(method = %name, "invoking named method");
                app.call_method(name, turn, state, arg)
            }
            Invocable::DirectCallable(f) => f(app, turn, state, arg),
        }
    }
}

impl<A> Clone for Invocable<A> {
    fn clone(&self) -> Self {
        match self {
            Invocable::NamedMethod(name) => Invocable::NamedMethod(name.clone()),
            Invocable::DirectCallable(f) => Invocable::DirectCallable(Arc::clone(f)),
        }
    }
}

impl<A> fmt::Debug for Invocable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocable::NamedMethod(name) => f.debug_tuple("NamedMethod").field(name).finish(),
            Invocable::DirectCallable(_) => f.write_str("DirectCallable(<function>)"),
        }
    }
}

/// Hooks that wrap the whole routing decision.
pub trait Intercept<A>: Send + Sync {
    /// Runs before routing; a non-empty result skips routing entirely.
    fn preprocess(&self, app: &A, turn: &dyn TurnSource, state: &mut TurnState) -> CallbackResult {
        let _ = (app, turn, state);
        Ok(None)
    }

    /// Runs after routing and may replace the result.
    fn postprocess(
        &self,
        app: &A,
        turn: &dyn TurnSource,
        state: &mut TurnState,
        result: Option<Value>,
    ) -> CallbackResult {
        let _ = (app, turn, state);
        Ok(result)
    }
}

// --- Configuration ----------------------------------------------------------

/// Immutable handler, event and interceptor registrations for a bot.
pub struct BotConfig<A> {
    handlers: Vec<HandlerEntry<Invocable<A>>>,
    events: HashMap<String, Invocable<A>>,
    intercepts: Vec<Box<dyn Intercept<A>>>,
    options: Options,
}

impl<A> fmt::Debug for BotConfig<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("handlers", &self.handlers)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("intercepts", &self.intercepts.len())
            .field("options", &self.options)
            .finish()
    }
}

impl<A> BotConfig<A> {
    pub fn builder() -> BotConfigBuilder<A> {
        BotConfigBuilder {
            handlers: Vec::new(),
            events: HashMap::new(),
            intercepts: Vec::new(),
            options: Options::default(),
        }
    }

    /// Handler entries in registration order.
    pub fn handler_entries(&self) -> &[HandlerEntry<Invocable<A>>] {
        &self.handlers
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Listener bound to the turn's event key, if both exist.
    pub fn event_listener(&self, turn: &dyn TurnSource) -> Option<&Invocable<A>> {
        self.events.get(turn.event_key()?)
    }
}

impl<A: Application> BotConfig<A> {
    /// Ordered rule dispatch over the registered handlers.
    pub fn dispatch<T: TurnSource>(&self, app: &A, turn: &T, state: &mut TurnState) -> CallbackResult {
        Ok(self.dispatch_with_metrics(app, turn, state)?.result)
    }

    /// [`BotConfig::dispatch`] plus counters and timing.
    ///
    /// Rules read `turn`; callbacks write to `state`.
    pub fn dispatch_with_metrics<T: TurnSource>(
        &self,
        app: &A,
        turn: &T,
        state: &mut TurnState,
    ) -> Result<DispatchOutcome, CallbackError> {
        let ctx: &dyn ContextProvider = turn;
        engine::dispatch_with_metrics(&self.handlers, ctx, &self.options, |callback| {
            callback.invoke(app, turn, state, None)
        })
    }
}

/// Collects registrations; [`BotConfigBuilder::build`] freezes them.
pub struct BotConfigBuilder<A> {
    handlers: Vec<HandlerEntry<Invocable<A>>>,
    events: HashMap<String, Invocable<A>>,
    intercepts: Vec<Box<dyn Intercept<A>>>,
    options: Options,
}

impl<A> BotConfigBuilder<A> {
    /// Append a handler. Earlier handlers are tried first.
    pub fn handler(mut self, rule: impl Into<String>, callback: Invocable<A>) -> Self {
        self.handlers.push(HandlerEntry::new(rule, callback));
        self
    }

    /// Append several handlers, keeping their order.
    pub fn handlers<I, R>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (R, Invocable<A>)>,
        R: Into<String>,
    {
        self.handlers.extend(entries.into_iter().map(|(rule, callback)| HandlerEntry::new(rule, callback)));
        self
    }

    /// Append a handler backed by a closure.
    pub fn on<F>(self, rule: impl Into<String>, f: F) -> Self
    where
        F: Fn(&A, &dyn TurnSource, &mut TurnState, Option<&Value>) -> CallbackResult + Send + Sync + 'static,
    {
        self.handler(rule, Invocable::direct(f))
    }

    /// Bind a listener to an event key. A later binding replaces an earlier one.
    pub fn event(mut self, key: impl Into<String>, callback: Invocable<A>) -> Self {
        let key = key.into();
        if key.is_empty() {
            tracing::debug!("ignoring event listener with an empty key");
            return self;
        }
        self.events.insert(key, callback);
        self
    }

    /// Append an interceptor. Hooks run in registration order.
    pub fn intercept(mut self, intercept: impl Intercept<A> + 'static) -> Self {
        self.intercepts.push(Box::new(intercept));
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> BotConfig<A> {
        BotConfig { handlers: self.handlers, events: self.events, intercepts: self.intercepts, options: self.options }
    }
}

// --- Orchestration ----------------------------------------------------------

/// Raw outcome of one turn, before response building.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Domain check failed; the platform default answer applies.
    Default,
    /// The routed result after all interceptors ran.
    Routed(Option<Value>),
}

/// Turns a [`Decision`] into the platform response.
pub trait ResponseBuilder {
    /// Build the response for a routed turn from its result and final state.
    fn build(&self, turn: &dyn TurnSource, state: &TurnState, result: Option<Value>) -> Value;
    fn default_result(&self, turn: &dyn TurnSource) -> Value;
}

/// Minimal JSON envelope around the routed result.
///
/// The session attributes from [`TurnState`] are sent back so the platform
/// returns them on the next turn. `should_end_session` applies unless a
/// callback set the flag itself.
#[derive(Debug, Clone, Default)]
pub struct JsonEnvelope {
    pub should_end_session: bool,
}

impl ResponseBuilder for JsonEnvelope {
    fn build(&self, _turn: &dyn TurnSource, state: &TurnState, result: Option<Value>) -> Value {
        json!({
            "version": "2.0",
            "session": { "attributes": state.session().attributes() },
            "response": {
                "shouldEndSession": state.should_end_session().unwrap_or(self.should_end_session),
                "result": result.unwrap_or(Value::Null),
            }
        })
    }

    fn default_result(&self, _turn: &dyn TurnSource) -> Value {
        json!({
            "version": "2.0",
            "response": { "shouldEndSession": true, "result": Value::Null }
        })
    }
}

/// A configured bot. Cheap to clone; the configuration is shared.
pub struct Bot<A> {
    config: Arc<BotConfig<A>>,
}

impl<A> Clone for Bot<A> {
    fn clone(&self) -> Self {
        Bot { config: Arc::clone(&self.config) }
    }
}

impl<A: Application> Bot<A> {
    pub fn new(config: BotConfig<A>) -> Self {
        Bot { config: Arc::new(config) }
    }

    pub fn from_shared(config: Arc<BotConfig<A>>) -> Self {
        Bot { config }
    }

    pub fn config(&self) -> &BotConfig<A> {
        &self.config
    }

    /// Route one turn and return the raw result. Callback writes land in `state`.
    #[tracing::instrument(level = "debug", skip_all, fields(request_type = %turn.request_type()))]
    pub fn decide<T: TurnSource>(&self, app: &A, turn: &T, state: &mut TurnState) -> Result<Decision, CallbackError> {
        let listener = self.config.event_listener(turn);

        if turn.request_type() == INTENT_REQUEST && !turn.has_nlu() && listener.is_none() {
            tracing::debug!("intent request without NLU result, using default answer");
            return Ok(Decision::Default);
        }

        let mut result = None;
        for (idx, intercept) in self.config.intercepts.iter().enumerate() {
            result = intercept.preprocess(app, turn, state)?;
            if !is_empty_result(&result) {
                tracing::debug!(intercept = idx, "preprocess answered, skipping routing");
                break;
            }
        }

        if is_empty_result(&result) {
            result = match listener {
                Some(callback) => {
                    tracing::debug!(event = turn.event_key().unwrap_or_default(), "routing to event listener");
                    callback.invoke(app, turn, state, turn.event_data())?
                }
                None => self.config.dispatch(app, turn, state)?,
            };
        }

        for intercept in &self.config.intercepts {
            result = intercept.postprocess(app, turn, state, result)?;
        }

        Ok(Decision::Routed(result))
    }

    /// Route one turn and build the response with `builder`.
    ///
    /// The turn state starts from the session the request carried.
    pub fn run<T: TurnSource, R: ResponseBuilder + ?Sized>(
        &self,
        app: &A,
        turn: &T,
        builder: &R,
    ) -> Result<Value, CallbackError> {
        let mut state = TurnState::for_turn(turn);
        Ok(match self.decide(app, turn, &mut state)? {
            Decision::Default => builder.default_result(turn),
            Decision::Routed(result) => builder.build(turn, &state, result),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Weather {
        log: Mutex<Vec<String>>,
    }

    impl Weather {
        fn record(&self, entry: &str) {
            self.log.lock().unwrap().push(entry.to_string());
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Application for Weather {
        fn call_method(
            &self,
            name: &str,
            turn: &dyn TurnSource,
            state: &mut TurnState,
            arg: Option<&Value>,
        ) -> CallbackResult {
            self.record(name);
            match name {
                "welcome" => Ok(Some(json!("welcome"))),
                "count_visit" => {
                    let count = state.session_attribute("count", &json!(0)).as_i64().unwrap_or(0);
                    state.set_session_attribute("count", json!(count + 1))?;
                    state.wait_answer();
                    Ok(Some(json!(format!("visit {}", count + 1))))
                }
                "forecast" => Ok(turn.slot_value("city").map(|c| json!(format!("sunny in {c}")))),
                "nothing" => Ok(None),
                "playback" => Ok(arg.cloned()),
                _ => Err(CallbackError::UnknownMethod(name.to_string())),
            }
        }
    }

    fn intent_turn(intent: &str, city: Option<&str>) -> Request {
        let slots = city.map(|c| json!({ "city": { "name": "city", "value": c } })).unwrap_or(json!({}));
        Request::new(json!({
            "request": { "type": "IntentRequest", "intents": [{ "name": intent, "slots": slots }] }
        }))
    }

    fn weather_bot() -> Bot<Weather> {
        Bot::new(
            BotConfig::builder()
                .handler("LaunchRequest", Invocable::method("welcome"))
                .handler("#Forecast", Invocable::method("nothing"))
                .handler("#Forecast && slot.city", Invocable::method("forecast"))
                .on("#Forecast", |_, _, _, _| Ok(Some(json!("no city"))))
                .event("AudioPlayer.PlaybackStarted", Invocable::method("playback"))
                .build(),
        )
    }

    #[test]
    fn named_and_direct_callbacks_route_in_order() {
        let bot = weather_bot();
        let app = Weather::default();

        let mut state = TurnState::default();

        let with_city = bot.decide(&app, &intent_turn("Forecast", Some("Beijing")), &mut state).unwrap();
        assert_eq!(with_city, Decision::Routed(Some(json!("sunny in Beijing"))));
        assert_eq!(app.log(), vec!["nothing", "forecast"]);

        let without_city = bot.decide(&app, &intent_turn("Forecast", None), &mut state).unwrap();
        assert_eq!(without_city, Decision::Routed(Some(json!("no city"))));

        let launch = Request::new(json!({ "request": { "type": "LaunchRequest" } }));
        assert_eq!(bot.decide(&app, &launch, &mut state).unwrap(), Decision::Routed(Some(json!("welcome"))));
        assert_eq!(state, TurnState::default());
    }

    #[test]
    fn events_bypass_rule_dispatch() {
        let bot = weather_bot();
        let app = Weather::default();
        let turn = Request::new(json!({
            "request": { "type": "AudioPlayer.PlaybackStarted", "token": "t-1" }
        }));

        let decision = bot.decide(&app, &turn, &mut TurnState::for_turn(&turn)).unwrap();
        assert_eq!(
            decision,
            Decision::Routed(Some(json!({ "type": "AudioPlayer.PlaybackStarted", "token": "t-1" })))
        );
        assert_eq!(app.log(), vec!["playback"]);
    }

    #[test]
    fn unregistered_events_fall_back_to_rules() {
        let bot = weather_bot();
        let app = Weather::default();
        let turn = Request::new(json!({ "request": { "type": "Display.ElementSelected" } }));

        assert_eq!(bot.decide(&app, &turn, &mut TurnState::for_turn(&turn)).unwrap(), Decision::Routed(None));
        assert!(app.log().is_empty());
    }

    #[test]
    fn intent_request_without_nlu_gets_default() {
        let bot = weather_bot();
        let app = Weather::default();
        let turn = Request::new(json!({ "request": { "type": "IntentRequest", "intents": [] } }));

        assert_eq!(bot.decide(&app, &turn, &mut TurnState::for_turn(&turn)).unwrap(), Decision::Default);
        let built = bot.run(&app, &turn, &JsonEnvelope::default()).unwrap();
        assert_eq!(built, json!({ "version": "2.0", "response": { "shouldEndSession": true, "result": null } }));
    }

    struct Gate;

    impl Intercept<Weather> for Gate {
        fn preprocess(&self, app: &Weather, turn: &dyn TurnSource, _state: &mut TurnState) -> CallbackResult {
            app.record("gate");
            Ok(turn.slot_value("city").filter(|c| *c == "Atlantis").map(|_| json!("no such city")))
        }
    }

    struct Wrap(&'static str);

    impl Intercept<Weather> for Wrap {
        fn postprocess(
            &self,
            _app: &Weather,
            _turn: &dyn TurnSource,
            _state: &mut TurnState,
            result: Option<Value>,
        ) -> CallbackResult {
            let mut wrapped = serde_json::Map::new();
            wrapped.insert(self.0.to_string(), result.unwrap_or(Value::Null));
            Ok(Some(Value::Object(wrapped)))
        }
    }

    #[test]
    fn interceptors_short_circuit_and_chain() {
        let bot = Bot::new(
            BotConfig::builder()
                .handler("#Forecast && slot.city", Invocable::method("forecast"))
                .intercept(Gate)
                .intercept(Wrap("inner"))
                .intercept(Wrap("outer"))
                .build(),
        );
        let app = Weather::default();

        let mut state = TurnState::default();

        let blocked = bot.decide(&app, &intent_turn("Forecast", Some("Atlantis")), &mut state).unwrap();
        assert_eq!(blocked, Decision::Routed(Some(json!({ "outer": { "inner": "no such city" } }))));
        assert_eq!(app.log(), vec!["gate"]);

        let routed = bot.decide(&app, &intent_turn("Forecast", Some("Paris")), &mut state).unwrap();
        assert_eq!(routed, Decision::Routed(Some(json!({ "outer": { "inner": "sunny in Paris" } }))));
    }

    #[test]
    fn callback_errors_reach_the_caller() {
        let bot = Bot::new(BotConfig::builder().handler("#Forecast", Invocable::method("missing")).build());
        let app = Weather::default();

        let err = bot.decide(&app, &intent_turn("Forecast", None), &mut TurnState::default()).unwrap_err();
        assert!(matches!(err, CallbackError::UnknownMethod(ref m) if m == "missing"));
    }

    #[test]
    fn run_builds_envelope() {
        let bot = weather_bot();
        let app = Weather::default();
        let out = bot.run(&app, &intent_turn("Forecast", Some("Beijing")), &JsonEnvelope::default()).unwrap();
        assert_eq!(
            out,
            json!({
                "version": "2.0",
                "session": { "attributes": {} },
                "response": { "shouldEndSession": false, "result": "sunny in Beijing" }
            })
        );
    }

    #[test]
    fn handler_session_writes_reach_the_response() {
        let bot = Bot::new(BotConfig::builder().handler("LaunchRequest", Invocable::method("count_visit")).build());
        let app = Weather::default();
        let turn = Request::new(json!({
            "session": { "attributes": { "count": 2, "user": "u-1" } },
            "request": { "type": "LaunchRequest" }
        }));

        let out = bot.run(&app, &turn, &JsonEnvelope { should_end_session: true }).unwrap();
        assert_eq!(
            out,
            json!({
                "version": "2.0",
                "session": { "attributes": { "count": 3, "user": "u-1" } },
                "response": { "shouldEndSession": false, "result": "visit 3" }
            })
        );
        assert_eq!(turn.session_value("count", &Value::Null), json!(2));
    }

    struct Farewell;

    impl Intercept<Weather> for Farewell {
        fn postprocess(
            &self,
            _app: &Weather,
            _turn: &dyn TurnSource,
            state: &mut TurnState,
            result: Option<Value>,
        ) -> CallbackResult {
            state.clear_session();
            state.end_dialog();
            Ok(result)
        }
    }

    #[test]
    fn interceptors_share_the_turn_state() {
        let bot = Bot::new(
            BotConfig::builder()
                .on("#Forecast", |_, _, state, _| {
                    state.set_session_attribute("last.intent", json!("Forecast"))?;
                    Ok(Some(json!(state.session_attribute("last.intent", &Value::Null))))
                })
                .intercept(Farewell)
                .build(),
        );
        let app = Weather::default();
        let turn = intent_turn("Forecast", None);
        let mut state = TurnState::for_turn(&turn);

        assert_eq!(bot.decide(&app, &turn, &mut state).unwrap(), Decision::Routed(Some(json!("Forecast"))));
        assert!(state.session().attributes().is_empty());
        assert_eq!(state.should_end_session(), Some(true));
    }

    #[test]
    fn handlers_macro_registers_named_methods() {
        let config =
            BotConfig::<Weather>::builder().handlers(handlers!["LaunchRequest" => "welcome", "#A" => "a"]).build();
        let rules: Vec<&str> = config.handler_entries().iter().map(|e| e.rule.as_str()).collect();
        assert_eq!(rules, vec!["LaunchRequest", "#A"]);
        assert!(matches!(&config.handler_entries()[1].callback, Invocable::NamedMethod(m) if m == "a"));
    }
}
