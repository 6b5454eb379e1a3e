pub mod application;
pub mod auth;
pub mod change_detector;
pub mod chunker;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod models;
pub mod persistence;
pub mod retriever;
pub mod scanner;
pub mod supervisor;
pub mod sync;
pub mod webserver;
