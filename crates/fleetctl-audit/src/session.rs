//! Ambient acting-session context for the audit wrapper.
//!
//! Callers of `Store` never thread a `Session` through every call — it
//! would leak an auth concern into a generic CRUD interface the
//! reconciliation engines also use unauthenticated. Instead the wrapper
//! reads whatever session the caller's task has set with
//! [`with_session`], falling back to `Session::internal_agent()` when
//! none is set (reconcile loops and migrations run as the internal
//! agent; inbound k8s/talos request handlers set a real session before
//! touching the store).

use std::future::Future;

use crate::event::Session;

tokio::task_local! {
    static CURRENT_SESSION: Session;
}

/// Runs `f` with `session` as the ambient session for every `Store` call
/// made during its execution.
pub async fn with_session<F: Future>(session: Session, f: F) -> F::Output {
    CURRENT_SESSION.scope(session, f).await
}

/// The caller's ambient session, or `Session::internal_agent()` if none
/// was set via [`with_session`].
pub fn current_or_internal_agent() -> Session {
    CURRENT_SESSION
        .try_with(Session::clone)
        .unwrap_or_else(|_| Session::internal_agent())
}
