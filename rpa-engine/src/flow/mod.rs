//! Flow module - interpreter, browser session and extraction helpers

pub mod model;
pub mod context;
pub mod table;
pub mod captcha;
pub mod browser;
pub mod page;
pub mod session;
pub mod transition;
pub mod actions;
pub mod executor;
pub mod engine;
