//! GitHub REST API plumbing.
//!
//! The engine itself only calls the API for rate-limit diagnostics at
//! phase boundaries; the harvester that fetches issue and PR objects is
//! an external collaborator. What lives here is the shared client
//! surface both sides use: token resolution, the HTTPS client, typed
//! errors, and the error classifier that decides whether a failed call
//! means skip, retry-later, or give up.

mod client;
mod error;

pub use client::{resolve_token, GithubClient, MockRateLimitProbe, RateLimitProbe, RateLimits};
pub use error::{classify, handle_api_error, ApiError, ErrorClass};
