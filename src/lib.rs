pub mod api;
pub mod auth;
pub mod config;
pub mod fingerprint;
pub mod models;
pub mod storage;
pub mod visits;
