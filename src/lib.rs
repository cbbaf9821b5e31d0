pub mod app;
pub mod biosample;
pub mod config;
pub mod domain;
pub mod entrez;
pub mod error;
pub mod gbif;
pub mod server;
pub mod wiki;
