#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;

pub use config::Config;
pub use connection::{ConnectionManager, ReadyState};
pub use error::{Error, Kind, WsError};
pub use handler::{ConnectionHandler, NoopHandler};

pub type Result<T> = std::result::Result<T, Error>;
