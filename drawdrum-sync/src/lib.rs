//! Display state synchronization for DrawDrum
//!
//! One admin mutates a single display state (passport text, prize line,
//! formatting, logo, countdown timer); every connected display receives the
//! change and newly joined displays get a full snapshot first.
//!
//! # Event Types
//!
//! - `init` - Full snapshot, sent once to a joining channel
//! - `passport_update` - Text, prize and formatting replaced
//! - `logo_update` - Logo path changed (empty removes it)
//! - `timer_action` - Timer start / pause / resume / reset
//! - `error` - Rejected inbound message, sent only to its sender
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use drawdrum_sync::{QueueChannel, SqliteStateStore, SyncCoordinator, TextUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStateStore::new("/tmp/drawdrum.db")?;
//!     let coordinator = SyncCoordinator::new(Arc::new(store), 300);
//!
//!     // A display joins and immediately receives `init`
//!     let (channel, mut events) = QueueChannel::open();
//!     let (_id, snapshot) = coordinator.subscribe(Arc::new(channel)).await?;
//!     println!("current text: {}", snapshot.passport_text);
//!
//!     // The admin pushes new text; the timer starts automatically
//!     coordinator.set_text(TextUpdate::new("Hello\n**World**")).await;
//!
//!     while let Ok(event) = events.try_recv() {
//!         println!("{}", event.to_json()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod display;
pub mod error;
pub mod events;
pub mod registry;
pub mod state;
pub mod store;
pub mod timer;

// Re-exports
pub use coordinator::{AppContext, SyncCoordinator};
pub use display::{Countdown, DisplayChange, DisplayModel, ReconnectPolicy, TimerDecoration};
pub use error::{Result, SyncError};
pub use events::{
    AdminCommand, InitPayload, LogoPayload, LogoUpdate, PassportPayload, SyncEvent, TextUpdate,
};
pub use registry::{BroadcastReport, ChannelId, ConnectionRegistry, EventChannel, QueueChannel};
pub use state::{DisplayState, FormattingInput, FormattingOptions, TextStyle};
pub use store::{MemoryStateStore, SqliteStateStore, StateStore};
pub use timer::{
    TimerAction, TimerActionKind, TimerCommand, TimerEngine, TimerPhase, TimerSnapshot,
    DEFAULT_TIMER_DURATION_SECS,
};
