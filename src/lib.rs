pub mod annotation;
pub mod audio;
pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod generation;
pub mod normalization;
pub mod routes;
pub mod script;
pub mod urls;
pub mod video;
pub mod voice_script;
