pub mod api;
pub mod backends;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod data_models;
pub mod error;
pub mod extractor;
pub mod http;
pub mod normalizer;
pub mod pdf;
pub mod retry;
pub mod search;
