//! Preview runtime.
//!
//! Drives a [`viewer_core::PreviewController`] against real time: a deadline
//! thread turns armed deadlines into timeouts, a [`RenderingSurface`] turns
//! load requests into signals, and every path funnels through one
//! [`PreviewHandle`] so the controller has a single writer.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use doc_model::Strategy;
//! use preview_scheduler::{PreviewHandle, ScriptedSurface};
//! use viewer_core::{DocumentRef, PreviewPolicy, SessionStatus};
//!
//! let surface = Arc::new(ScriptedSurface::parse("fail:blocked,loaded").unwrap());
//! let handle = PreviewHandle::new(surface).unwrap();
//! let updates = handle.subscribe();
//!
//! let policy = PreviewPolicy::new(
//!     vec![Strategy::DirectEmbed, Strategy::ProxyViewer],
//!     Duration::from_secs(5),
//!     2,
//! );
//! handle.start(DocumentRef::url("https://example.com/a.pdf").unwrap(), policy).unwrap();
//!
//! let settled = updates.iter().find(SessionStatus::is_settled).unwrap();
//! assert_eq!(settled, SessionStatus::Ready { strategy: Strategy::ProxyViewer });
//! handle.shutdown();
//! ```

mod handle;
mod open;
mod surface;
mod timer;

pub use handle::{PreviewHandle, RuntimeError, SignalReporter};
pub use open::{open_document, OpenError};
pub use surface::{ParseScriptError, RenderingSurface, ScriptStep, ScriptedOutcome, ScriptedSurface};
pub use timer::{DeadlineCallback, DeadlineTimer};
