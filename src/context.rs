//! Turn context: what the rule engine is allowed to read about a turn.
//!
//! The engine only ever sees a [`ContextProvider`]. [`Request`] is the bundled
//! implementation backed by a decoded platform request, with its short-term
//! memory held in a [`Session`]. Callbacks write through a [`TurnState`],
//! which starts as a copy of the inbound session and ends up in the response.

use crate::error::ResolveError;
use serde_json::{Map, Value};

/// Read-only lookups consumed by placeholder resolution.
pub trait ContextProvider {
    /// Name of the intent classified for this turn, if any.
    fn current_intent_name(&self) -> Option<&str>;
    /// Session value at a dotted `path`, or `default` when absent.
    fn session_value(&self, path: &str, default: &Value) -> Value;
    /// Value of the slot called `name`, if the NLU extracted one.
    fn slot_value(&self, name: &str) -> Option<&str>;
    /// The request type tag, e.g. `IntentRequest`.
    fn request_type(&self) -> &str;
}

/// What the orchestrator needs on top of the rule lookups.
pub trait TurnSource: ContextProvider {
    /// Whether the turn carries an NLU result.
    fn has_nlu(&self) -> bool;
    /// Client event payload; its `type` field selects an event listener.
    fn event_data(&self) -> Option<&Value>;

    /// Session attributes carried in by the request, if the source has any.
    fn session(&self) -> Option<&Session> {
        None
    }

    /// The event listener key for this turn, if any.
    fn event_key(&self) -> Option<&str> {
        self.event_data()?.get("type")?.as_str().filter(|k| !k.is_empty())
    }
}

// --- Session ----------------------------------------------------------------

/// A dotted session path split into its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPath {
    segments: Vec<String>,
}

impl SessionPath {
    /// Split `path` on `.`; empty segments make the path invalid.
    pub fn parse(path: &str) -> Result<Self, ResolveError> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ResolveError::InvalidPath(path.to_string()));
        }
        Ok(SessionPath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// Per-conversation key/value memory, addressed by dotted paths.
///
/// `a.b.c` addresses `attributes["a"]["b"]["c"]`. Keys are kept ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    attributes: Map<String, Value>,
}

impl Session {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Session { attributes }
    }

    /// Build a session from a JSON value; anything but an object is empty.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Session { attributes: map.clone() },
            _ => Session::default(),
        }
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Read the value at `path`; returns `default` when any step is missing.
    pub fn get(&self, path: &SessionPath, default: &Value) -> Value {
        let Some((first, rest)) = path.segments.split_first() else {
            return default.clone();
        };
        let mut current = match self.attributes.get(first) {
            Some(v) => v,
            None => return default.clone(),
        };
        for key in rest {
            current = match current.get(key.as_str()) {
                Some(v) => v,
                None => return default.clone(),
            };
        }
        current.clone()
    }

    /// Write `value` at `path`, creating intermediate objects.
    ///
    /// A non-object value found on the way is replaced by an object.
    pub fn set(&mut self, path: &SessionPath, value: Value) {
        let Some((last, parents)) = path.segments.split_last() else {
            return;
        };
        let mut map = &mut self.attributes;
        for key in parents {
            let slot = map.entry(key.clone()).or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(inner) = slot else {
                return;
            };
            map = inner;
        }
        map.insert(last.clone(), value);
    }

    /// Remove and return the value at `path`.
    pub fn remove(&mut self, path: &SessionPath) -> Option<Value> {
        let (last, parents) = path.segments.split_last()?;
        let mut map = &mut self.attributes;
        for key in parents {
            map = map.get_mut(key)?.as_object_mut()?;
        }
        map.remove(last)
    }

    pub fn clear(&mut self) {
        self.attributes.clear();
    }

    /// Convenience wrapper over [`Session::get`] taking a raw dotted path.
    pub fn get_path(&self, path: &str, default: &Value) -> Value {
        match SessionPath::parse(path) {
            Ok(p) => self.get(&p, default),
            Err(_) => default.clone(),
        }
    }

    /// Convenience wrapper over [`Session::set`] taking a raw dotted path.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), ResolveError> {
        let p = SessionPath::parse(path)?;
        self.set(&p, value);
        Ok(())
    }
}

// --- Turn state -------------------------------------------------------------

/// Mutable reply state for one turn.
///
/// Handlers, listeners and interceptors share it. Rules keep reading the
/// inbound snapshot, so a write here never changes which rule matches during
/// the same turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnState {
    session: Session,
    should_end_session: Option<bool>,
}

impl TurnState {
    pub fn new(session: Session) -> Self {
        TurnState { session, should_end_session: None }
    }

    /// Start from the session the turn arrived with.
    pub fn for_turn(turn: &dyn TurnSource) -> Self {
        TurnState::new(turn.session().cloned().unwrap_or_default())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn session_attribute(&self, path: &str, default: &Value) -> Value {
        self.session.get_path(path, default)
    }

    pub fn set_session_attribute(&mut self, path: &str, value: Value) -> Result<(), ResolveError> {
        self.session.set_path(path, value)
    }

    pub fn clear_session(&mut self) {
        self.session.clear();
    }

    /// Keep the conversation open for the user's answer.
    pub fn wait_answer(&mut self) {
        self.should_end_session = Some(false);
    }

    /// Close the conversation after this response.
    pub fn end_dialog(&mut self) {
        self.should_end_session = Some(true);
    }

    /// `None` until a callback called [`wait_answer`](Self::wait_answer) or
    /// [`end_dialog`](Self::end_dialog).
    pub fn should_end_session(&self) -> Option<bool> {
        self.should_end_session
    }
}

// --- Request ----------------------------------------------------------------

const INTENT_REQUEST: &str = "IntentRequest";
const LAUNCH_REQUEST: &str = "LaunchRequest";
const SESSION_ENDED_REQUEST: &str = "SessionEndedRequest";

/// One intent from the NLU result.
#[derive(Debug, Clone, PartialEq)]
struct Nlu {
    intent: String,
    slots: Map<String, Value>,
}

/// Decoded snapshot of an inbound turn request.
#[derive(Debug, Clone)]
pub struct Request {
    data: Value,
    request_type: String,
    session: Session,
    nlu: Option<Nlu>,
}

impl Request {
    /// Wrap an already-decoded request body.
    pub fn new(data: Value) -> Self {
        let request_type = data.pointer("/request/type").and_then(Value::as_str).unwrap_or_default().to_string();
        let session = data.pointer("/session/attributes").map(Session::from_value).unwrap_or_default();
        let nlu = if request_type == INTENT_REQUEST {
            data.pointer("/request/intents/0").and_then(|intent| {
                let name = intent.get("name")?.as_str()?.to_string();
                let slots = intent.get("slots").and_then(Value::as_object).cloned().unwrap_or_default();
                Some(Nlu { intent: name, slots })
            })
        } else {
            None
        };

        tracing::debug!(request_type = %request_type, has_nlu = nlu.is_some(), "decoded request");
        Request { data, request_type, session, nlu }
    }

    /// Decode a request body from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Request::new(serde_json::from_str(text)?))
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Set a slot value on the current intent. Ignored when there is no NLU result.
    pub fn set_slot(&mut self, name: &str, value: &str) {
        if let Some(nlu) = self.nlu.as_mut() {
            let slot = nlu.slots.entry(name.to_string()).or_insert_with(|| Value::Object(Map::new()));
            match slot {
                Value::Object(fields) => {
                    fields.insert("name".to_string(), Value::String(name.to_string()));
                    fields.insert("value".to_string(), Value::String(value.to_string()));
                }
                other => *other = serde_json::json!({ "name": name, "value": value }),
            }
        }
    }

    /// The user's original utterance; empty for non-intent requests.
    pub fn query(&self) -> &str {
        if self.request_type != INTENT_REQUEST {
            return "";
        }
        self.str_at("/request/query/original")
    }

    pub fn user_id(&self) -> &str {
        self.str_at("/context/system/user/userId")
    }

    pub fn bot_id(&self) -> &str {
        self.str_at("/context/system/bot/botId")
    }

    pub fn log_id(&self) -> &str {
        self.str_at("/log_id")
    }

    pub fn cuid(&self) -> &str {
        self.str_at("/cuid")
    }

    pub fn is_launch_request(&self) -> bool {
        self.request_type == LAUNCH_REQUEST
    }

    pub fn is_session_ended_request(&self) -> bool {
        self.request_type == SESSION_ENDED_REQUEST
    }

    fn str_at(&self, pointer: &str) -> &str {
        self.data.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
    }
}

impl ContextProvider for Request {
    fn current_intent_name(&self) -> Option<&str> {
        self.nlu.as_ref().map(|n| n.intent.as_str())
    }

    fn session_value(&self, path: &str, default: &Value) -> Value {
        self.session.get_path(path, default)
    }

    fn slot_value(&self, name: &str) -> Option<&str> {
        self.nlu.as_ref()?.slots.get(name)?.get("value")?.as_str()
    }

    fn request_type(&self) -> &str {
        &self.request_type
    }
}

impl TurnSource for Request {
    fn has_nlu(&self) -> bool {
        self.nlu.is_some()
    }

    fn event_data(&self) -> Option<&Value> {
        match self.request_type.as_str() {
            "" | INTENT_REQUEST | LAUNCH_REQUEST | SESSION_ENDED_REQUEST => None,
            _ => self.data.get("request"),
        }
    }

    fn session(&self) -> Option<&Session> {
        Some(&self.session)
    }
}
