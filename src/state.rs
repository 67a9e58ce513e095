//! Shared application state, constructed once at startup and handed to the
//! proxy handler as an `Arc<AppState>`.

use sqlx::PgPool;

use crate::audit::AuditEmitter;
use crate::auth::KeyAuthenticator;
use crate::cache::TieredCache;
use crate::config::Config;
use crate::policy::PolicyResolver;
use crate::proxy::upstream::UpstreamClient;

pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub cache: TieredCache,
    pub authenticator: KeyAuthenticator,
    pub policy_resolver: PolicyResolver,
    pub upstream: UpstreamClient,
    pub audit: AuditEmitter,
}
