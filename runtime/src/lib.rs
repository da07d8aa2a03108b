// Copyright 2026 Pricecheck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pricecheck runtime library: tiered product extraction for e-commerce pages.
//!
//! [`pipeline::Pipeline::scrape_product`] tries a static HTTP fetch with
//! selector rules, then a headless-browser render of the same rules, then a
//! structured-output language model over the rendered markup.

pub mod acquisition;
pub mod ai;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod price;
pub mod renderer;
pub mod result;
pub mod stealth;

pub use config::PipelineConfig;
pub use error::{ConfigError, ExtractError};
pub use pipeline::Pipeline;
pub use result::{ExtractionConfig, ExtractionMethod, ExtractionResult, ProductData};
