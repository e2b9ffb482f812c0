pub mod app;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod model;
pub mod session;
pub mod util;
