use std::sync::Arc;

use courier_db::Database;
use courier_gateway::connection::ConnectionSettings;
use courier_gateway::{Dispatcher, TokenVerifier};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub verifier: TokenVerifier,
    pub dispatcher: Dispatcher,
    pub connection: ConnectionSettings,
}

impl AppStateInner {
    /// Wire the store, verifier and a fresh dispatcher together.
    pub fn new(db: Arc<Database>, verifier: TokenVerifier, connection: ConnectionSettings) -> AppState {
        let dispatcher = Dispatcher::new(db.clone(), verifier.clone());
        Arc::new(Self {
            db,
            verifier,
            dispatcher,
            connection,
        })
    }
}
