//! Ambient cross-cutting concerns that sit alongside the thirteen core
//! components without being one of them.
//!
//! `ratelimit` is the one surviving slice of a much larger enterprise
//! feature set (SSO, licensing, GraphQL, HA clustering, event sourcing,
//! distributed tracing, ...) — everything else there had no counterpart in
//! this platform and was dropped. It exists only to back the `rateLimited`
//! error kind in `crate::error::ErrorKind`; see DESIGN.md for what was kept
//! versus trimmed.

pub mod ratelimit;
