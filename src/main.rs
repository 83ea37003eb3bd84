mod debug_report;

use botsdk::{Options, Request, explain_rule};
use serde_json::{Value, json};
use std::io::{self, IsTerminal, Read};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "BOTSDK_LOG";

fn main() {
    init_logging();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let request = match load_request(&config) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let options = Options { session_default: config.session_default.clone(), ..Options::default() };
    let reports: Vec<_> = config.rules.iter().map(|rule| explain_rule(rule, &request, &options)).collect();

    if config.json {
        match serde_json::to_string_pretty(&reports) {
            Ok(out) => println!("{out}"),
            Err(err) => {
                eprintln!("error: failed to encode report: {err}");
                std::process::exit(1);
            }
        }
    } else {
        debug_report::print_reports(&request, &reports, config.color);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

struct CliConfig {
    rules: Vec<String>,
    request_path: Option<String>,
    intent: Option<String>,
    slots: Vec<(String, String)>,
    session: Option<Value>,
    session_default: Value,
    json: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut config = CliConfig {
        rules: Vec::new(),
        request_path: None,
        intent: None,
        slots: Vec::new(),
        session: None,
        session_default: Value::Null,
        json: false,
        color: io::stdout().is_terminal(),
    };
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("botsdk {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => config.color = true,
            "--no-color" => config.color = false,
            "--json" => config.json = true,
            "--rule" | "-r" => config.rules.push(expect_value(&mut args, "--rule")?),
            "--request" => config.request_path = Some(expect_value(&mut args, "--request")?),
            "--intent" => config.intent = Some(expect_value(&mut args, "--intent")?),
            "--slot" => config.slots.push(parse_slot(&expect_value(&mut args, "--slot")?)?),
            "--session" => config.session = Some(parse_json("--session", &expect_value(&mut args, "--session")?)?),
            "--session-default" => {
                config.session_default =
                    parse_json("--session-default", &expect_value(&mut args, "--session-default")?)?;
            }
            "--" => {
                let rest = args.by_ref().collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    config.rules.push(rest);
                }
                break;
            }
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args.by_ref()).collect::<Vec<_>>().join(" ");
                config.rules.push(rest);
                break;
            }
        }
    }

    if config.rules.is_empty() {
        return Err(format!("error: no rule provided\n\n{}", help_text()));
    }
    if config.request_path.is_some() && (config.intent.is_some() || !config.slots.is_empty()) {
        return Err("error: --request cannot be combined with --intent/--slot".to_string());
    }

    Ok(config)
}

fn expect_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("error: {flag} expects a value"))
}

fn parse_slot(value: &str) -> Result<(String, String), String> {
    let (name, slot_value) =
        value.split_once('=').ok_or_else(|| format!("error: invalid --slot '{value}' (expected name=value)"))?;
    if name.is_empty() {
        return Err(format!("error: invalid --slot '{value}' (empty name)"));
    }
    Ok((name.to_string(), slot_value.to_string()))
}

fn parse_json(flag: &str, value: &str) -> Result<Value, String> {
    serde_json::from_str(value).map_err(|err| format!("error: invalid JSON for {flag}: {err}"))
}

/// Load the request from `--request`, build one from `--intent/--slot`, or read stdin.
fn load_request(config: &CliConfig) -> Result<Request, String> {
    let mut request = if let Some(path) = &config.request_path {
        let text = if path == "-" {
            read_stdin()?
        } else {
            std::fs::read_to_string(path).map_err(|err| format!("error: failed to read '{path}': {err}"))?
        };
        Request::from_json(&text).map_err(|err| format!("error: invalid request JSON: {err}"))?
    } else if config.intent.is_some() || io::stdin().is_terminal() {
        Request::new(synthetic_request(config))
    } else {
        Request::from_json(&read_stdin()?).map_err(|err| format!("error: invalid request JSON: {err}"))?
    };

    if let Some(Value::Object(attributes)) = &config.session {
        for (key, value) in attributes {
            request
                .session_mut()
                .set_path(key, value.clone())
                .map_err(|err| format!("error: invalid --session key: {err}"))?;
        }
    }
    Ok(request)
}

fn synthetic_request(config: &CliConfig) -> Value {
    match &config.intent {
        Some(intent) => {
            let slots: serde_json::Map<String, Value> = config
                .slots
                .iter()
                .map(|(name, value)| (name.clone(), json!({ "name": name, "value": value })))
                .collect();
            json!({ "request": { "type": "IntentRequest", "intents": [{ "name": intent, "slots": slots }] } })
        }
        None => json!({ "request": { "type": "LaunchRequest" } }),
    }
}

fn read_stdin() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "botsdk {version}

Evaluate bot handler rules against a turn request.

Usage:
  botsdk [OPTIONS] [--] <rule...>
  botsdk [OPTIONS] --rule <rule> [--rule <rule>...]

Options:
  -r, --rule <text>            Rule to evaluate. Repeatable.
  --request <file>             Request JSON file ('-' for stdin). Without it the
                               request is read from stdin, or synthesized from
                               --intent/--slot when stdin is a terminal.
  --intent <name>              Intent name for a synthesized IntentRequest.
  --slot <name=value>          Slot for the synthesized intent. Repeatable.
  --session <json>             Session attributes merged into the request,
                               keyed by dotted path.
  --session-default <json>     Value used for absent session paths. Default: null
  --json                       Print reports as JSON.
  --color                      Force ANSI color output.
  --no-color                   Disable ANSI color output.
  -h, --help                   Show this help message.
  -V, --version                Print version information.

Environment:
  {log_env}=<filter>          tracing filter, e.g. botsdk=trace. Default: warn

Exit codes:
  0  Success.
  1  Internal error.
  2  Invalid arguments or unreadable request.
",
        version = env!("CARGO_PKG_VERSION"),
        log_env = LOG_ENV,
    )
}
