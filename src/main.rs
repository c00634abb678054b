use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

use scene_bot_client::token::USER_KEY;
use scene_bot_client::transcript::{self, ROLE_BOT, ROLE_USER};
use scene_bot_client::{
    CallOptions, FileTokenStore, SceneBotClient, SceneBotConfig, SceneBotError, TokenStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "scene_bot_client=info".to_string()),
        )
        .init();

    // Load configuration - try multiple paths, fall back to the environment
    let config_paths: Vec<String> = vec![
        std::env::var("SCENE_CONFIG").ok(),
        Some("scene.yaml".to_string()),
        Some("scene.jsonld".to_string()),
        Some("config/scene.yaml".to_string()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut config = None;
    for path in &config_paths {
        match SceneBotConfig::load(path) {
            Ok(cfg) => {
                info!("Loaded configuration from: {}", path);
                config = Some(cfg);
                break;
            }
            Err(e) => {
                tracing::debug!("Failed to load config from {}: {}", path, e);
            }
        }
    }
    let config = config.unwrap_or_else(|| {
        info!("No config file found, reading settings from environment");
        SceneBotConfig::from_env()
    });

    let transcripts_root = PathBuf::from(&config.transcripts_dir);
    std::fs::create_dir_all(&transcripts_root)?;

    let store = Arc::new(FileTokenStore::new(&config.token_file));
    let profile = profile_name(store.as_ref()).await;
    let client = SceneBotClient::new(config, store.clone());

    let transcript_uid = match transcript::create_transcript(&transcripts_root, &profile) {
        Ok(uid) => Some(uid),
        Err(e) => {
            warn!("Could not start a transcript, continuing without one: {}", e);
            None
        }
    };

    println!("Scene chat ({profile}). Type a message, or /help for commands.");

    let mut lang: Option<String> = None;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if let Some(command) = text.strip_prefix('/') {
            if !run_command(command, store.as_ref(), &mut lang) {
                break;
            }
            continue;
        }

        record(&transcripts_root, &profile, &transcript_uid, ROLE_USER, text, lang.as_deref());

        match client
            .send_message(text, lang.as_deref(), &CallOptions::default())
            .await
        {
            Ok(reply) => {
                println!("scene-bot> {reply}");
                record(&transcripts_root, &profile, &transcript_uid, ROLE_BOT, &reply, lang.as_deref());
            }
            Err(err) => {
                tracing::debug!("send_message failed: {}", err);
                eprintln!("[{}] {}", err.code(), friendly_message(&err));
            }
        }
    }

    Ok(())
}

/// Profile name for transcript storage, taken from the stored user blob.
async fn profile_name(store: &FileTokenStore) -> String {
    let Some(blob) = store.get(USER_KEY).await else {
        return "default".to_string();
    };
    serde_json::from_str::<serde_json::Value>(&blob)
        .ok()
        .and_then(|user| {
            user.get("username")
                .and_then(|name| name.as_str())
                .map(|name| name.to_string())
        })
        .unwrap_or_else(|| "default".to_string())
}

/// Returns false when the REPL should exit.
fn run_command(command: &str, store: &FileTokenStore, lang: &mut Option<String>) -> bool {
    let (name, rest) = match command.split_once(' ') {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "quit" | "exit" => return false,
        "help" => {
            println!("  /token <value>  store an auth token");
            println!("  /logout         clear stored credentials");
            println!("  /lang <lang>    set the conversation language");
            println!("  /quit           leave the chat");
        }
        "token" => {
            if rest.is_empty() {
                eprintln!("usage: /token <value>");
            } else if let Err(e) = store.set(scene_bot_client::token::TOKEN_KEY, rest) {
                eprintln!("could not store token: {e}");
            } else {
                println!("token stored");
            }
        }
        "logout" => {
            for key in [
                scene_bot_client::token::TOKEN_KEY,
                scene_bot_client::token::AUTH_TOKEN_KEY,
                USER_KEY,
            ] {
                if let Err(e) = store.remove(key) {
                    eprintln!("could not clear {key}: {e}");
                }
            }
            println!("signed out");
        }
        "lang" => {
            if rest.is_empty() {
                *lang = None;
                println!("language reset to the configured default");
            } else {
                *lang = Some(rest.to_string());
                println!("language set to {rest}");
            }
        }
        other => eprintln!("unknown command: /{other}"),
    }
    true
}

fn record(
    root: &std::path::Path,
    profile: &str,
    transcript_uid: &Option<String>,
    role: &str,
    content: &str,
    lang: Option<&str>,
) {
    if let Some(uid) = transcript_uid {
        if let Err(e) = transcript::append_message(root, profile, uid, role, content, lang) {
            warn!("Failed to record {} message: {}", role, e);
        }
    }
}

/// One short line per error code, suited for direct display in the chat.
fn friendly_message(err: &SceneBotError) -> String {
    match err {
        SceneBotError::InvalidInput(_) => "Please type a message first.".to_string(),
        SceneBotError::NoBackend(_) => {
            "No Scene backend is configured. Set SCENE_BACKEND_URL and restart.".to_string()
        }
        SceneBotError::ClientRateLimit { retry_in_ms } => {
            format!("You're sending messages too quickly. Try again in {retry_in_ms}ms.")
        }
        SceneBotError::Unauthorized { .. } => {
            "Your session has expired. Sign in again to keep chatting.".to_string()
        }
        SceneBotError::Timeout(_) => "SceneBot took too long to answer. Try again.".to_string(),
        SceneBotError::DnsFail(_) => {
            "Could not reach the Scene backend. Check your connection.".to_string()
        }
        SceneBotError::BadResponse(_) => {
            "SceneBot sent back something unexpected. Try again.".to_string()
        }
        SceneBotError::ServiceUnavailable { .. } => {
            "SceneBot is unavailable right now. Try again later.".to_string()
        }
    }
}
