//! Bookloop application library.
//!
//! Book listings, requests for them and the notifications both parties
//! receive, exposed as kernel modules mounted by the HTTP server.

pub mod app;
pub mod error;
pub mod modules;
pub mod outcome;
pub mod utils;
pub mod workflow;

pub use app::Services;
pub use error::{ServiceError, ServiceResult};
pub use outcome::{Advisory, Outcome, SideEffect};
