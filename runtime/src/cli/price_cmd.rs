//! `pricecheck parse-price <text>`: run the price parser on a fragment.

use crate::price::parse_price;
use anyhow::{bail, Result};

pub fn run(text: &str) -> Result<()> {
    match parse_price(text) {
        Some(parsed) => {
            let json = serde_json::json!({
                "price": parsed.price,
                "currency": parsed.currency,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        None => bail!("no price found in {text:?}"),
    }
}
