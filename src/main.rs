//! lumo-token - issue, verify and inspect context-bound security tokens.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lumo_token::audit::{AuditQueue, AuditSink, JsonLinesAuditLog, NullAuditSink, TracingAuditLog};
use lumo_token::claims::{Context, Fields};
use lumo_token::config::{load_secret, Settings};
use lumo_token::pipeline::TokenPipeline;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

/// How long queued audit records may take to flush on exit.
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq)]
enum Command {
    Generate {
        user_id: String,
        ttl: Option<Duration>,
        fields: Fields,
        context: Option<Context>,
    },
    Verify {
        token: String,
        user_id: Option<String>,
        context: Option<Context>,
    },
    Inspect {
        token: String,
    },
}

fn main() -> ExitCode {
    // Parse command line arguments (simple std::env approach)
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let (config_path, command) = match parse_args(&args[1..]) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {}\n\nRun '{} --help' for usage.", e, NAME);
            return ExitCode::FAILURE;
        }
    };

    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    debug!("Configuration loaded from: {}", config_path);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(settings, command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Async main function.
async fn async_main(settings: Settings, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let secret = load_secret(&settings.security.secret_path)?;

    let queue = start_audit_queue(&settings);
    let sink: Arc<dyn AuditSink> = match &queue {
        Some(queue) => queue.clone(),
        None => Arc::new(NullAuditSink),
    };

    let pipeline = TokenPipeline::new(secret, settings.token.clone())?.with_audit_sink(sink);
    let result = run_command(&pipeline, command);

    if let Some(queue) = queue {
        queue.shutdown(AUDIT_DRAIN_TIMEOUT).await;
    }

    result
}

/// Start the audit queue, falling back to tracing output when the log file
/// cannot be opened.
fn start_audit_queue(settings: &Settings) -> Option<Arc<AuditQueue>> {
    if !settings.audit.enabled {
        return None;
    }

    let capacity = settings.audit.queue_capacity;
    let queue = match JsonLinesAuditLog::open(&settings.audit.log_path) {
        Ok(log) => {
            info!(path = %settings.audit.log_path.display(), "Audit log opened");
            AuditQueue::spawn(log, capacity)
        }
        Err(e) => {
            warn!(
                path = %settings.audit.log_path.display(),
                error = %e,
                "Failed to open audit log, auditing to the tracing output instead"
            );
            AuditQueue::spawn(TracingAuditLog, capacity)
        }
    };
    Some(Arc::new(queue))
}

fn run_command(
    pipeline: &TokenPipeline,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Generate {
            user_id,
            ttl,
            fields,
            context,
        } => {
            let token = pipeline.generate(&user_id, fields, context.as_ref(), ttl, None)?;
            println!("{}", token);
        }
        Command::Verify {
            token,
            user_id,
            context,
        } => {
            let verified = pipeline.verify(&token, user_id.as_deref(), context.as_ref(), None)?;
            let output = json!({
                "token_id": verified.token_id,
                "recipe_version": verified.recipe_version,
                "claims": verified.claims,
                "context": verified.context,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Inspect { token } => {
            let info = pipeline.inspect(&token)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }
    Ok(())
}

/// Parse everything after the program name into a config path and a command.
fn parse_args(args: &[String]) -> Result<(String, Command), String> {
    let mut config_path = "/etc/lumo/token.toml".to_string();
    let mut positional = Vec::new();
    let mut ttl = None;
    let mut user = None;
    let mut fields = Fields::new();
    let mut context = Context::default();
    let mut has_context = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            config_path = path.to_string();
            continue;
        }

        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} requires a value", name))
        };

        match arg.as_str() {
            "--config" | "-c" => config_path = value(arg.as_str())?,
            "--ttl" => {
                let secs: u64 = value(arg.as_str())?
                    .parse()
                    .map_err(|_| "--ttl expects a number of seconds".to_string())?;
                ttl = Some(Duration::from_secs(secs));
            }
            "--user" => user = Some(value(arg.as_str())?),
            "--claim" => {
                let (key, raw) = parse_claim(&value(arg.as_str())?)?;
                fields.insert(key, raw);
            }
            "--device" => {
                context.device_fingerprint = value(arg.as_str())?;
                has_context = true;
            }
            "--location" => {
                context.location = value(arg.as_str())?;
                has_context = true;
            }
            "--client" => {
                context.client_type = value(arg.as_str())?;
                has_context = true;
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option '{}'", flag)),
            _ => positional.push(arg.clone()),
        }
    }

    let context = has_context.then_some(context);
    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("generate") => Command::Generate {
            user_id: positional.next().ok_or("generate requires a USER")?,
            ttl,
            fields,
            context,
        },
        Some("verify") => Command::Verify {
            token: positional.next().ok_or("verify requires a TOKEN")?,
            user_id: user,
            context,
        },
        Some("inspect") => Command::Inspect {
            token: positional.next().ok_or("inspect requires a TOKEN")?,
        },
        Some(other) => return Err(format!("unknown command '{}'", other)),
        None => return Err("no command given".to_string()),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument '{}'", extra));
    }

    Ok((config_path, command))
}

/// Parse `key=value`. Values that are valid JSON keep their type.
fn parse_claim(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("claim '{}' is not of the form key=value", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Issue, verify and inspect context-bound security tokens.

USAGE:
    {} [OPTIONS] <COMMAND>

COMMANDS:
    generate <USER>        Issue a token and print it
    verify <TOKEN>         Verify a token and print its claims as JSON
    inspect <TOKEN>        Print the recipe version and body length of a token

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: /etc/lumo/token.toml]
        --ttl <SECONDS>    Token lifetime (generate)
        --claim <K=V>      Add a claim field, may repeat (generate)
        --user <USER>      Expected user id (verify)
        --device <ID>      Device fingerprint to bind or check
        --location <TAG>   Location tag to bind or check
        --client <TYPE>    Client type to bind or check
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME
    );
}

/// Initialize logging based on settings.
///
/// Logs go to stderr; stdout carries command output only.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_generate() {
        let (config, command) = parse_args(&args(&[
            "--config=/tmp/t.toml",
            "generate",
            "u1",
            "--ttl",
            "600",
            "--claim",
            "role=admin",
            "--claim",
            "level=3",
            "--device",
            "dev-1",
        ]))
        .unwrap();

        assert_eq!(config, "/tmp/t.toml");
        let Command::Generate {
            user_id,
            ttl,
            fields,
            context,
        } = command
        else {
            panic!("expected generate");
        };
        assert_eq!(user_id, "u1");
        assert_eq!(ttl, Some(Duration::from_secs(600)));
        assert_eq!(fields["role"], json!("admin"));
        assert_eq!(fields["level"], json!(3));
        assert_eq!(context.unwrap().device_fingerprint, "dev-1");
    }

    #[test]
    fn test_parse_verify_and_inspect() {
        let (config, command) =
            parse_args(&args(&["verify", "abc.12345678", "--user", "u1"])).unwrap();
        assert_eq!(config, "/etc/lumo/token.toml");
        assert_eq!(
            command,
            Command::Verify {
                token: "abc.12345678".to_string(),
                user_id: Some("u1".to_string()),
                context: None,
            }
        );

        let (_, command) = parse_args(&args(&["-c", "x.toml", "inspect", "t"])).unwrap();
        assert_eq!(
            command,
            Command::Inspect {
                token: "t".to_string()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["generate"])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["generate", "u1", "--ttl", "soon"])).is_err());
        assert!(parse_args(&args(&["generate", "u1", "--claim", "=x"])).is_err());
        assert!(parse_args(&args(&["generate", "u1", "--bogus"])).is_err());
        assert!(parse_args(&args(&["verify", "t", "extra"])).is_err());
    }
}
