// src/lib.rs

//! hotrank: ranking feed harvester with trend enrichment

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
