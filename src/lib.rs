pub mod app;
pub mod chart;
pub mod config;
pub mod domain;
pub mod error;
pub mod eurostat;
pub mod output;
pub mod sdmx;
pub mod store;
pub mod table;
