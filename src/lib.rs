//! ViralSpot content analysis API
//!
//! This library provides the core functionality for the viralspot service:
//! filtered and session-randomized content listings, a prioritized
//! profile-processing queue with duplicate prevention, and viral analysis
//! runs produced by an AI service.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
