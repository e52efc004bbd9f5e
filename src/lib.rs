pub mod amqp;
pub mod app;
pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod relay;
pub mod state;
