use std::sync::Arc;

use crate::accounts::Accounts;
use crate::config::Config;
use crate::db::PostStore;
use crate::rate_limit::LoginRateLimiter;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub accounts: Accounts,
    pub posts: Arc<dyn PostStore>,
    pub login_limiter: LoginRateLimiter,
}
