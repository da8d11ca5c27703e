pub mod api;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod init;
pub mod intercept;
pub mod logger;
pub mod page;
pub mod settings;
pub mod stats;
