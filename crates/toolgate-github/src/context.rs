use crate::client::GithubApi;
use crate::ledger::PendingWrites;
use std::sync::Arc;

/// Process-wide state handed to every GitHub handler.
pub struct GithubContext {
    api: Arc<dyn GithubApi>,
    pending: Arc<PendingWrites>,
}

impl GithubContext {
    pub fn new(api: Arc<dyn GithubApi>) -> Self {
        Self {
            api,
            pending: Arc::new(PendingWrites::new()),
        }
    }

    pub fn api(&self) -> &dyn GithubApi {
        self.api.as_ref()
    }

    pub fn pending(&self) -> &Arc<PendingWrites> {
        &self.pending
    }
}
