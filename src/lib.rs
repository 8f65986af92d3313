pub mod app;
pub mod config;
pub mod error;
pub mod state;
pub mod users;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
