//! Document preview loading state machine.
//!
//! Embedded document viewers report success late, twice, or not at all. This
//! crate turns those signals into one inspectable session state plus a list
//! of side effects for the runtime to perform.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use viewer_core::{DocumentRef, Effect, PreviewController, PreviewPolicy, SessionState, Signal};
//! use doc_model::Strategy;
//!
//! let mut controller = PreviewController::with_system_clock();
//! let policy = PreviewPolicy::new(
//!     vec![Strategy::DirectEmbed, Strategy::ProxyViewer],
//!     Duration::from_secs(5),
//!     3,
//! );
//! let document = DocumentRef::url("https://example.com/report.pdf").unwrap();
//!
//! let effects = controller.start(document, policy).unwrap();
//! let generation = effects
//!     .iter()
//!     .find_map(|effect| match effect {
//!         Effect::Load(request) => Some(request.generation),
//!         _ => None,
//!     })
//!     .unwrap();
//!
//! controller.on_signal(generation, Signal::Loaded);
//! assert_eq!(controller.state(), SessionState::Ready);
//! ```

mod clock;
mod controller;
mod session;
mod signal;
mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{ControllerError, ControllerStats, Effect, LoadRequest, PreviewController};
pub use session::{PreviewPolicy, PreviewSession, SessionState, SessionStatus};
pub use signal::{FailureReason, Generation, Signal};
pub use source::{resolve, DocumentRef, ResolvedSource, SourceError};
