//! CLI subcommand implementations for the pricecheck binary.

pub mod doctor;
pub mod price_cmd;
pub mod scrape_cmd;
