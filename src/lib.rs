pub mod aggregate;
pub mod config;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod tiles;

pub mod speedtile {
    include!(concat!(env!("OUT_DIR"), "/speedtile.rs"));
}
