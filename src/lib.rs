pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod mailer;
pub mod store;

pub use db::DbPool;

use auth::AuthService;
use config::Config;

pub struct AppState {
    pub config: Config,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(config: Config, auth: AuthService) -> Self {
        Self { config, auth }
    }
}
