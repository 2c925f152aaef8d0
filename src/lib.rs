//! Paddock - a small multi-user garage manager
//!
//! Tracks a household's (or a small fleet's) vehicles: maintenance history,
//! paperwork expiry dates, photos and documents. Served as a classic
//! server-rendered web app, with an optional Telegram bot for quick access
//! from chat.

pub mod bot;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod web;
