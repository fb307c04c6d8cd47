pub mod citations;
pub mod tool;
