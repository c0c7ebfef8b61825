pub mod blame_parser;
pub mod paths;
pub mod process;
