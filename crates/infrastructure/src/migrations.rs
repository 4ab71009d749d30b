use sqlx::migrate::Migrator;

/// 工作区根目录下 `migrations/` 中的表结构
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
