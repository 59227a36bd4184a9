pub mod types;
pub mod config;
pub mod crs;
pub mod data;
pub mod reproject;
pub mod processing;
pub mod output;
pub mod archive;
pub mod pipeline;
