//! Blango - HTTP API for a small blog
//!
//! Posts, tags and users behind token authentication, with visibility rules
//! per caller, time-windowed listings and a per-identity response cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
