//! Session-expired callback.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

/// Zero-argument async callback run when the server reports the session as
/// expired. Repeated invocation must be safe.
pub type SessionExpiredHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler that does nothing, for standalone use of the request layer.
pub fn noop_handler() -> SessionExpiredHandler {
    Arc::new(|| async {}.boxed())
}
