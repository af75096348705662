pub mod cli;
pub mod client;
pub mod codec;
pub mod command;
pub mod context;
pub mod engine;
pub mod errors;
pub mod message;
pub mod orderbook;
pub mod orders;
pub mod simulate;
pub mod utils;
