pub mod analyzer;
pub mod cli;
pub mod db;
pub mod differ;
pub mod extractor;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod rules;
pub mod util;
