pub mod catalog;
pub mod client;
pub mod config;
pub mod controller;
pub mod destination;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod output;
pub mod parser;
pub mod store;
