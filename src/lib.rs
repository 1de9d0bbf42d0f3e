pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod eta;
pub mod fetch;
pub mod gene;
pub mod harvest;
pub mod kmer;
pub mod organism;
pub mod output;
pub mod parser;
pub mod progress;
pub mod stats;
pub mod store;
