mod client;
mod parse;
mod reader;

pub use client::{SmiClient, SmiError};
pub use reader::SmiReader;
