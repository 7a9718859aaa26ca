// src/lib.rs

//! Catalog Tracker Library
//!
//! Fetches playlist catalogs from many sources under bounded concurrency and
//! keeps a per-source history of which entries appeared and disappeared.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod tracker;
pub mod utils;

pub use tracker::Tracker;
