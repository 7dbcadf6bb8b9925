pub mod lexer;
pub mod line;
pub mod reader;

pub use reader::{ReadOptions, read_components, read_one};
