//! Authenticated browser-session orchestration with traffic capture and
//! in-page request replay.
//!
//! This crate keeps one long-lived logged-in page alive and usable: it
//! classifies what the page currently shows, waits for a human when login
//! or a verification challenge blocks automation, and runs structured
//! scripts against the page with bounded retries. On top of that session it
//! captures the request traffic an interaction produces into a HAR 1.2
//! artifact and replays captured requests with in-page `fetch`, so every
//! replay carries the session's cookies and origin.
//!
//! The browser itself is an external collaborator behind the [`Browser`]
//! and [`Page`] traits; this crate is pure orchestration.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backend`] | The `Browser` / `Page` seam the orchestration drives |
//! | [`commands`] | Structured in-page commands with JSON-escaped splicing |
//! | [`config`] | Site profile, fingerprint, timing and retry options |
//! | [`error`] | Crate-wide error type and result alias |
//! | [`executor`] | Script execution with bounded retries |
//! | [`identifiers`] | Page and capture ID newtypes |
//! | [`observer`] | Traffic capture on dedicated pages, HAR export |
//! | [`replay`] | In-page request replay |
//! | [`session`] | Session lifecycle, classification, login and captcha waits |
//! | [`traffic`] | Shared captured-request data types |
//!
//! # Example
//!
//! ```ignore
//! use session_pilot::{Action, RequestObserver, RequestReplayer, Session, SessionOptions};
//!
//! # async fn example(browser: std::sync::Arc<dyn session_pilot::Browser>) -> session_pilot::Result<()> {
//! let options = SessionOptions::new("https://example.com")?;
//! let session = Session::open(browser, options.clone()).await?;
//!
//! // Blocks until a human finishes login if the site demands one.
//! session.ensure_on_target_page().await?;
//!
//! // Capture the traffic a scripted interaction produces.
//! let observer = RequestObserver::new(session.browser().clone(), options.clone());
//! let observation = observer
//!     .observe("https://example.com/feed", &[Action::Scroll { pixels: 800 }])
//!     .await?;
//!
//! // Replay one captured request inside the authenticated context.
//! let replayer = RequestReplayer::open(session.browser().clone(), options).await?;
//! if let Some(log) = observation.requests.first() {
//!     let result = replayer.replay(&log.to_sample()).await?;
//!     println!("replayed: {:?}", result.response);
//! }
//!
//! replayer.close().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod identifiers;
pub mod observer;
pub mod replay;
pub mod session;
pub mod traffic;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{Browser, NavigationKind, Page, PageEvent};
pub use commands::{CaptchaSelectors, PageCommand};
pub use config::{BehaviorProfile, Fingerprint, RetryPolicy, SessionOptions, SiteProfile};
pub use error::{Error, Result};
pub use executor::ScriptExecutor;
pub use identifiers::{CaptureId, PageId};
pub use observer::{Action, Har, Observation, RequestObserver};
pub use replay::{PageChanges, ReplayResponse, ReplayResult, RequestReplayer};
pub use session::{
    CaptchaHandler, CaptchaInfo, CaptchaKind, CaptchaResult, LoginStatus, NavigationEvent,
    PageState, Session,
};
pub use traffic::{RequestLog, RequestSample, ResponseInfo};
