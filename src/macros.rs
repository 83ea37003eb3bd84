/// Compile a regex literal once and hand out a `&'static Regex`.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build `(rule, Invocable::NamedMethod)` pairs for [`BotConfigBuilder::handlers`].
///
/// ```
/// use botsdk::{Application, BotConfig, handlers};
///
/// struct Weather;
/// impl Application for Weather {}
///
/// let config = BotConfig::<Weather>::builder()
///     .handlers(handlers![
///         "LaunchRequest" => "welcome",
///         "#Forecast && slot.city" => "forecast",
///     ])
///     .build();
/// assert_eq!(config.handler_entries().len(), 2);
/// ```
///
/// [`BotConfigBuilder::handlers`]: crate::BotConfigBuilder::handlers
#[macro_export]
macro_rules! handlers {
    ( $( $rule:expr => $method:expr ),* $(,)? ) => {
        vec![ $( ($rule.to_string(), $crate::Invocable::NamedMethod($method.to_string())) ),* ]
    };
}
