mod config;
mod constants;
mod error;
mod result;
mod stats;
mod tally;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use result::*;
pub use stats::*;
pub use tally::*;
