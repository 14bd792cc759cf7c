//! Command handlers

pub mod config;
pub mod items;
pub mod serve;
