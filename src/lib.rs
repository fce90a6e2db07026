//! Core library for takeout-playlist-import
pub mod config;
pub mod db;
pub mod models;
pub mod api;
pub mod takeout;
pub mod matcher;
pub mod resolver;
pub mod syncer;
pub mod report;
pub mod import;
pub mod util;
