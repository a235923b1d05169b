//! # apiary
//!
//! A room-per-bot runtime for team messaging platforms: one bot instance per
//! conversation space, kept converged with remote room and subscription
//! state by a reconciliation loop, with inbound messages routed through a
//! trigger/lexicon pipeline to registered handlers.
//!
//! ```no_run
//! use apiary::{Matcher, Runtime};
//! use apiary_client::HttpPlatform;
//! use apiary_storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = apiary_core::config::load("config.toml")?;
//! let platform = Arc::new(HttpPlatform::new(&config.platform));
//! let storage = Arc::new(MemoryStorage::new());
//!
//! let mut runtime = Runtime::new(config, platform, storage).await?;
//! runtime.hears(Matcher::phrase("hello"), |bot, trigger| async move {
//!     let _ = bot.say(format!("hi {}!", trigger.person.display_name)).await;
//! });
//! Arc::new(runtime).run().await
//! # }
//! ```

pub mod runtime;
pub mod transport;

pub use apiary_core::error::{ApiaryError, BatchReport, Result};
pub use apiary_core::types::OutgoingMessage;
pub use runtime::{Bot, Lexicon, Matcher, Runtime, RuntimeEvent, Trigger};
