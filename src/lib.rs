pub mod api;
pub mod client;
pub mod config;
pub mod countdown;
pub mod gateway;
pub mod hints;
pub mod logging;
pub mod notices;
pub mod poller;
pub mod portal_client;
pub mod session;
pub mod session_store;
pub mod sketchpad;
pub mod ui;

pub mod test_helpers;
