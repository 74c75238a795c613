use propgate_core::{EndpointCategory, EndpointRegistry};
use serde_json::Value;

use crate::cli::EndpointsArgs;
use crate::error::CliError;

pub fn run(args: &EndpointsArgs) -> Result<Value, CliError> {
    let registry = EndpointRegistry::builtin();
    let descriptors = match &args.category {
        Some(raw) => {
            let category: EndpointCategory = raw.parse().map_err(CliError::InvalidArgument)?;
            registry.by_category(category)
        }
        None => registry.iter().collect(),
    };
    Ok(serde_json::to_value(descriptors)?)
}
