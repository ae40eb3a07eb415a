mod client;
mod models;

pub use client::BinanceClient;
pub use models::*;
