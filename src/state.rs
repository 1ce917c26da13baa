use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::session::TokenSigner;
use crate::config::Config;
use crate::mail::Mailer;
use crate::uploads::AvatarStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: Arc<TokenSigner>,
    pub mailer: Arc<dyn Mailer>,
    pub avatars: Arc<dyn AvatarStore>,
}
