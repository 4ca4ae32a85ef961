//! Tool implementations for Atlas.
//!
//! The model gets exactly one tool: `get_crypto_conversion`, a live
//! crypto/fiat conversion quote.

pub mod conversion;

use atlas_config::ConversionConfig;
use atlas_core::tool::ToolRegistry;

pub use conversion::{ConversionOutcome, ConversionRequest, CryptoConversionTool};

/// Build the tool registry offered to the model.
pub fn default_registry(config: &ConversionConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CryptoConversionTool::from_config(config)));
    registry
}
