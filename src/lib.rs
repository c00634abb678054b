//! Client adapter for the Scene backend's conversational bot.
//!
//! The crate sends one chat message at a time to the `/api/scene-bot`
//! endpoint and hands back either the bot's reply as a plain string or a
//! typed error from a small, stable taxonomy. Input validation, client-side
//! throttling, token resolution and an unauthenticated demo fallback are
//! all handled here so callers only deal with the reply/error contract.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scene_bot_client::{MemoryTokenStore, SceneBotClient, SceneBotConfig};
//!
//! # async fn demo() -> scene_bot_client::Result<()> {
//! let config = SceneBotConfig::from_env();
//! let client = SceneBotClient::new(config, Arc::new(MemoryTokenStore::new()));
//! let reply = client.send("What is playing tonight?").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod reply;
pub mod token;
pub mod transcript;

pub use client::{CallOptions, SceneBotClient};
pub use config::SceneBotConfig;
pub use error::{ErrorCode, Result, SceneBotError};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
