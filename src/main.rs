mod config;
mod debounce;
mod embeddings;
mod error;
mod logging;
mod native_messaging;
mod note;
mod protocol;
mod session;
mod text;

use std::io::{stdin, stdout, Read, Stdout};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;

use crate::embeddings::{CandleLoader, EmbeddingEngine};
use crate::protocol::{ResponseErr, ResponseOk, TextParams};
use crate::session::{NoteSession, ProcessOutcome};

fn main() {
    if let Err(e) = real_main() {
        // Keep stderr noisy for user bug reports; logs also go to file.
        eprintln!("[Note Helper] fatal error: {e:?}");
        log::error!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    logging::init_logging()?;

    let args: Vec<String> = std::env::args().collect();
    let model_dir = read_arg_value(&args, "--model-dir").map(PathBuf::from);
    if let Some(dir) = &model_dir {
        log::info!("Using explicit model dir: {}", dir.display());
    }

    let engine = Arc::new(EmbeddingEngine::new(Box::new(CandleLoader::new(model_dir))));

    // One-shot mode: plain text on stdin, Note JSON on stdout. No debounce.
    if args.iter().any(|a| a == "--once") {
        return run_once(engine);
    }

    serve(engine)
}

fn read_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn run_once(engine: Arc<EmbeddingEngine>) -> anyhow::Result<()> {
    let mut input = String::new();
    stdin().read_to_string(&mut input).context("failed reading text from stdin")?;

    let session = NoteSession::new(engine, Duration::ZERO);
    let note = session.process_text(&input);
    let error = session.error();
    session.shutdown();

    if let Some(message) = error {
        anyhow::bail!(message);
    }
    match note {
        Some(note) => println!("{}", serde_json::to_string_pretty(&note)?),
        None => println!("null"),
    }
    Ok(())
}

fn serve(engine: Arc<EmbeddingEngine>) -> anyhow::Result<()> {
    log::info!("=== Note Helper Started ===");
    log::info!("Waiting for messages from the extension...");

    let session = Arc::new(NoteSession::new(
        engine,
        Duration::from_millis(config::processing::DEBOUNCE_QUIET_MS),
    ));
    let out = Arc::new(Mutex::new(stdout()));
    let mut in_stream = stdin();
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    let mut message_count: u64 = 0;
    loop {
        let req = match native_messaging::read_message(&mut in_stream) {
            Ok(Some(r)) => r,
            Ok(None) => {
                log::info!("No more messages after {} messages, exiting", message_count);
                break;
            }
            Err(e) => {
                log::error!("Error reading message: {:?}", e);
                break;
            }
        };

        message_count += 1;
        log::info!(
            "Processing message #{}: {} (id: {})",
            message_count,
            req.method,
            req.id
        );

        // process runs off the read loop so a newer request can supersede it.
        if req.method == "process" {
            let session = session.clone();
            let out = out.clone();
            workers.push(std::thread::spawn(move || {
                let resp = respond(req.id.clone(), handle_process(&session, &req.params));
                if let Err(e) = send(&out, &resp) {
                    log::error!("Error sending response: {:?}", e);
                }
            }));
            workers.retain(|w| !w.is_finished());
            continue;
        }

        let resp = respond(req.id.clone(), handle_request(&session, &req.method, &req.params));
        if let Err(e) = send(&out, &resp) {
            log::error!("Error sending response: {:?}", e);
            break;
        }
    }

    for worker in workers {
        if worker.join().is_err() {
            log::error!("process worker panicked");
        }
    }
    session.shutdown();

    log::info!("=== Note Helper Stopped ===");
    Ok(())
}

fn respond(id: String, result: anyhow::Result<Value>) -> Value {
    let resp = match result {
        Ok(result) => serde_json::to_value(ResponseOk { id, result }),
        Err(e) => {
            log::error!("Handler error: {:?}", e);
            serde_json::to_value(ResponseErr { id, error: format!("{e}") })
        }
    };
    resp.unwrap_or_else(|e| serde_json::json!({ "error": format!("failed serializing response: {e}") }))
}

fn send(out: &Mutex<Stdout>, v: &Value) -> anyhow::Result<()> {
    let mut guard = out.lock().unwrap_or_else(PoisonError::into_inner);
    native_messaging::write_json(&mut *guard, v)
}

fn handle_request(session: &NoteSession, method: &str, params: &Value) -> anyhow::Result<Value> {
    match method {
        "hello" => handle_hello(params),
        "loadModel" => handle_load_model(session),
        "summarize" => handle_summarize(session, params),
        "bulletize" => handle_bulletize(session, params),
        "stats" => handle_stats(session),
        "dispose" => handle_dispose(session),
        _ => anyhow::bail!("Unknown method: {method}"),
    }
}

fn text_param(params: &Value) -> anyhow::Result<String> {
    if params.is_null() {
        return Ok(String::new());
    }
    let p: TextParams = serde_json::from_value(params.clone()).context("invalid params: expected { text }")?;
    Ok(p.text)
}

fn handle_hello(params: &Value) -> anyhow::Result<Value> {
    let addon_version = params.get("addonVersion").and_then(|v| v.as_str()).unwrap_or("unknown");
    log::info!(
        "Hello from addon version {}, responding with host version {}",
        addon_version,
        config::HOST_VERSION
    );
    Ok(serde_json::json!({
        "type": "hello-response",
        "hostImpl": "rust",
        "hostVersion": config::HOST_VERSION,
        "model": config::embedding::EMBEDDING_MODEL_NAME,
        "addonVersion": addon_version
    }))
}

fn handle_load_model(session: &NoteSession) -> anyhow::Result<Value> {
    let model = session.engine().load_model()?;
    Ok(serde_json::json!({ "ok": true, "model": model.name() }))
}

fn handle_process(session: &NoteSession, params: &Value) -> anyhow::Result<Value> {
    let text = text_param(params)?;
    let outcome = session.process(&text);
    let status = outcome.status();
    let error = match &outcome {
        ProcessOutcome::Failed(message) => Some(message.clone()),
        _ => None,
    };
    Ok(serde_json::json!({
        "status": status,
        "note": outcome.into_note(),
        "error": error
    }))
}

fn handle_summarize(session: &NoteSession, params: &Value) -> anyhow::Result<Value> {
    let text = text_param(params)?;
    let summary = session.engine().summarize(&text)?;
    Ok(serde_json::json!({ "summary": summary }))
}

fn handle_bulletize(session: &NoteSession, params: &Value) -> anyhow::Result<Value> {
    let text = text_param(params)?;
    let bullets = session.engine().bulletize(&text)?;
    Ok(serde_json::json!({ "bullets": bullets }))
}

fn handle_stats(session: &NoteSession) -> anyhow::Result<Value> {
    let stats = session.engine().stats();
    Ok(serde_json::json!({
        "engine": stats,
        "processing": session.is_processing(),
        "error": session.error()
    }))
}

fn handle_dispose(session: &NoteSession) -> anyhow::Result<Value> {
    session.shutdown();
    Ok(serde_json::json!({ "ok": true }))
}
