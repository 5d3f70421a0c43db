pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod i18n;
pub mod model;
pub mod providers;
pub mod selection;
pub mod service;
pub mod storage;
pub mod tg;
