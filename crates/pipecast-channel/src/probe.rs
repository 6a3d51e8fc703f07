//! Existence checks for channel listeners.

use pipecast_transport::PipeNamespace;

/// Whether a listener whose name contains `name` is bound in the
/// environment's pipe namespace.
///
/// The match is a case-sensitive substring match, so `"app"` also reports a
/// channel called `"my-app-control"`. The answer is a snapshot; the listener
/// may stop or start right after.
pub fn is_running(name: &str) -> bool {
    is_running_in(&PipeNamespace::from_env(), name)
}

/// [`is_running`] against an explicit namespace.
pub fn is_running_in(namespace: &PipeNamespace, name: &str) -> bool {
    namespace.contains(name)
}
