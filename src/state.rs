use std::sync::Arc;

use crate::admin::FlagAdminService;
use crate::cache::FlagCache;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<FlagCache>,
    pub admin: Arc<FlagAdminService>,
    pub api_key: Arc<str>,
}
