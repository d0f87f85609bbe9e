use crate::database::Database;
use std::sync::Arc;

/// Process-wide state handed to every PostgreSQL handler.
///
/// `allow_writes` is fixed at construction; there is no setter.
pub struct PgContext {
    db: Arc<dyn Database>,
    allow_writes: bool,
}

impl PgContext {
    pub fn new(db: Arc<dyn Database>, allow_writes: bool) -> Self {
        Self { db, allow_writes }
    }

    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn allow_writes(&self) -> bool {
        self.allow_writes
    }
}
