pub mod auth;
pub mod music_catalog;
