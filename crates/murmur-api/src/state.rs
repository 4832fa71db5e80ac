use std::sync::Arc;

use murmur_gateway::{DeliveryCoordinator, IdentityVerifier, PresenceDirectory};

use crate::conversations::ConversationEngine;
use crate::session::SessionManager;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub sessions: SessionManager,
    pub conversations: ConversationEngine,
    pub presence: PresenceDirectory,
    pub delivery: DeliveryCoordinator,
    pub verifier: Arc<dyn IdentityVerifier>,
}
