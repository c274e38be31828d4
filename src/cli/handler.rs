//! Command handlers
//!
//! One unit of work per command kind. The dispatcher runs these under a command
//! instance, so a handler only has to report what went wrong; retries and reply
//! shaping happen elsewhere.

use crate::engine::CommandError;
use crate::llm::{extract_code, extract_doc};
use crate::models::{Capability, CommandKind, CommandSpec, SessionKey};
use crate::session::Prompt;
use crate::state::AppState;
use serde_json::{json, Map, Value};

/// Prefix of options forwarded to the backend as generation options.
const BACKEND_OPTION_PREFIX: &str = "opt.";

/// Check options and body before any work is scheduled.
///
/// The error message becomes an `INVALID_OPTIONS` reply.
pub fn validate(spec: &CommandSpec, body: &str) -> Result<(), String> {
    match spec.kind {
        CommandKind::Model => {
            if matches!(spec.option("set"), Some(id) if id.trim().is_empty()) {
                return Err("-set needs a model id".to_string());
            }
        }
        CommandKind::Forget | CommandKind::Debug => {
            if spec.option("context").map_or(true, |id| id.trim().is_empty()) {
                return Err(format!("{} requires -context=<id>", spec.kind));
            }
        }
        _ => {}
    }

    if spec.kind.takes_body() && body.trim().is_empty() {
        return Err(format!("{} needs a request body", spec.kind));
    }
    Ok(())
}

/// Capability set a body-taking command's session is keyed on
pub fn session_key(spec: &CommandSpec) -> Result<SessionKey, CommandError> {
    let capabilities: &[Capability] = match spec.kind {
        CommandKind::Generate => &[Capability::Chat],
        CommandKind::Code | CommandKind::Ask => {
            &[Capability::Chat, Capability::Project, Capability::Structure]
        }
        CommandKind::Doc => &[Capability::Chat, Capability::Structure],
        CommandKind::Debug => &[Capability::Chat, Capability::Debug],
        _ => {
            return Err(CommandError::Other(format!(
                "{} does not use a session",
                spec.kind
            )))
        }
    };

    let context = match spec.kind {
        CommandKind::Debug => spec.option("context").map(str::to_string),
        _ => None,
    };
    Ok(SessionKey::new(capabilities.iter().copied(), context)?)
}

/// `-opt.<name>=<value>` options as backend generation options.
///
/// Numbers and booleans are passed typed, anything else as a string.
pub fn generation_options(spec: &CommandSpec) -> Map<String, Value> {
    spec.options
        .iter()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(BACKEND_OPTION_PREFIX)?;
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), option_value(value)))
        })
        .collect()
}

fn option_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

pub fn code_prompt(language: &str, request: &str) -> String {
    format!(
        "Write {lang} code for the request below. Put the code in a fenced block tagged \
         `{lang}`. If you offer alternatives, separate them inside the block with a line \
         `// Version <n>`.\n\n{request}",
        lang = language,
        request = request
    )
}

pub fn doc_prompt(code: &str) -> String {
    format!(
        "Write a documentation comment (/** ... */) for the code below. Reply with the \
         comment only.\n\n{}",
        code
    )
}

/// Language `CODE` extracts: `-lang`, else the configured default
pub fn code_language<'a>(spec: &'a CommandSpec, state: &'a AppState) -> &'a str {
    match spec.option("lang") {
        Some(lang) if !lang.trim().is_empty() => lang.trim(),
        _ => &state.config.default_language,
    }
}

/// Run one attempt of the command's work.
pub async fn execute(
    state: &AppState,
    spec: &CommandSpec,
    body: &str,
) -> Result<Value, CommandError> {
    match &spec.kind {
        CommandKind::Models => handle_models(state).await,
        CommandKind::Model => Ok(handle_model(state, spec)),
        CommandKind::Sessions => Ok(handle_sessions(state).await),
        CommandKind::Forget => Ok(handle_forget(state, spec)),
        CommandKind::Generate => handle_generate(state, spec, body).await,
        CommandKind::Code => handle_code(state, spec, body).await,
        CommandKind::Doc => handle_doc(state, spec, body).await,
        CommandKind::Ask | CommandKind::Debug => handle_ask(state, spec, body).await,
        CommandKind::Ping | CommandKind::Unknown(_) => Err(CommandError::Other(format!(
            "{} is answered by the dispatcher",
            spec.kind
        ))),
    }
}

/// MODELS: backend model list plus the active model
async fn handle_models(state: &AppState) -> Result<Value, CommandError> {
    let models = state.backend().list_models().await?;
    Ok(json!({
        "models": models,
        "count": models.len(),
        "current": state.model()
    }))
}

/// MODEL: report or switch the active model
fn handle_model(state: &AppState, spec: &CommandSpec) -> Value {
    match spec.option("set") {
        Some(id) => {
            let invalidated = state.set_model(id.trim());
            json!({ "model": state.model(), "invalidated": invalidated })
        }
        None => json!({ "model": state.model() }),
    }
}

async fn handle_sessions(state: &AppState) -> Value {
    let mut sessions = Vec::new();
    for session in state.sessions.sessions() {
        sessions.push(session.info().await);
    }
    sessions.sort_by(|a, b| a.key.cmp(&b.key));

    json!({ "sessions": sessions, "count": sessions.len() })
}

fn handle_forget(state: &AppState, spec: &CommandSpec) -> Value {
    let context = spec.option("context").unwrap_or_default().trim();
    let invalidated = state.sessions.invalidate_by_context(context);
    json!({ "context": context, "invalidated": invalidated })
}

async fn ask_session(
    state: &AppState,
    spec: &CommandSpec,
    text: String,
    raw: bool,
) -> Result<String, CommandError> {
    let key = session_key(spec)?;
    let session = state.session_for(&key);

    let prompt = Prompt {
        text,
        raw,
        system: None,
        options: generation_options(spec),
    };
    Ok(session.ask(&prompt, None).await?)
}

async fn handle_generate(
    state: &AppState,
    spec: &CommandSpec,
    body: &str,
) -> Result<Value, CommandError> {
    let text = ask_session(state, spec, body.to_string(), spec.has_flag("raw")).await?;
    Ok(json!({ "text": text }))
}

async fn handle_code(
    state: &AppState,
    spec: &CommandSpec,
    body: &str,
) -> Result<Value, CommandError> {
    let language = code_language(spec, state);
    let answer = ask_session(state, spec, code_prompt(language, body), false).await?;

    let fragments = extract_code(&answer, language);
    Ok(json!({
        "language": language,
        "fragments": fragments,
        "count": fragments.len()
    }))
}

async fn handle_doc(
    state: &AppState,
    spec: &CommandSpec,
    body: &str,
) -> Result<Value, CommandError> {
    let answer = ask_session(state, spec, doc_prompt(body), false).await?;

    match extract_doc(&answer) {
        Some(doc) => Ok(json!({ "doc": doc })),
        None => Err(CommandError::Backend(
            "model answer holds no documentation comment".to_string(),
        )),
    }
}

async fn handle_ask(
    state: &AppState,
    spec: &CommandSpec,
    body: &str,
) -> Result<Value, CommandError> {
    let text = ask_session(state, spec, body.to_string(), false).await?;
    match spec.option("context") {
        Some(context) if spec.kind == CommandKind::Debug => {
            Ok(json!({ "text": text, "context": context }))
        }
        _ => Ok(json!({ "text": text })),
    }
}
