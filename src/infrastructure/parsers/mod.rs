pub mod csv_parser;
pub mod json_parser;
