pub mod dynamodb;
pub mod identity;
pub mod memory;
pub mod mongodb;
pub mod parser_adapter;
pub mod parsers;
