pub mod achievements;
pub mod background;
pub mod config;
pub mod db;
pub mod github_pull;
pub mod health_monitor;
pub mod leaderboard;
pub mod sessions;
pub mod types;
