use std::sync::Arc;

use crate::session::LookupSession;
use crate::source::UpstreamSource;

pub struct AppState<S, O> {
    pub session: Arc<LookupSession<S, O>>,
    /// Used by the proxy route regardless of where the session loads from.
    pub upstream: UpstreamSource,
}

impl<S, O> AppState<S, O> {
    pub fn new(session: Arc<LookupSession<S, O>>, upstream: UpstreamSource) -> Self {
        Self { session, upstream }
    }
}

impl<S, O> Clone for AppState<S, O> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            upstream: self.upstream.clone(),
        }
    }
}
