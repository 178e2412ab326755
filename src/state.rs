use std::sync::Arc;

use crate::{
    db::DBLayer, internal_api::auth::InternalAuthConfig, lookup::LookupService,
    registration::RegistrationService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DBLayer>,
    pub registration: RegistrationService,
    pub lookup: LookupService,
    pub internal_auth: Option<Arc<InternalAuthConfig>>,
}

impl AppState {
    pub fn new(db: Arc<DBLayer>, internal_auth: Option<InternalAuthConfig>) -> Self {
        Self {
            registration: RegistrationService::new(db.clone()),
            lookup: LookupService::new(db.clone()),
            db,
            internal_auth: internal_auth.map(Arc::new),
        }
    }
}
