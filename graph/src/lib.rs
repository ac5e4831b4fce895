pub mod dot;
pub mod graph;

pub use dot::{Block, Cfg, DotError};
