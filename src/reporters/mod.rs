pub mod json;
pub mod terminal;
