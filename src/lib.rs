#![doc = include_str!("../README.md")]

pub mod credentials;
pub mod delay;
pub mod display;
pub mod error;
pub mod html;
pub mod parse;
pub mod price;
pub mod query;
pub mod reports;
pub mod session;

pub use error::{Error, Result};
