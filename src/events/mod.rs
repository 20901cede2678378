//! # Events Module
//!
//! Progress reporting for pipeline runs.
//!
//! ## Design
//! The executor and its stages emit events through a channel so any front
//! end (the CLI spinner, a log sink, a test) can observe a run without the
//! core knowing who is listening.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Stage(StageEvent::Progress(p)) = event {
//!             println!("{} emitted {}", p.stage, p.emitted);
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(&sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
