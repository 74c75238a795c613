use propgate_core::Gateway;
use serde_json::{json, Value};

use crate::cli::ComparablesArgs;
use crate::error::CliError;

use super::parse_params;

pub async fn run(args: &ComparablesArgs, gateway: &Gateway) -> Result<Value, CliError> {
    let mut params = parse_params(&args.params)?;
    let policy = gateway.comparables();

    let payload = match (&args.prop_id, &args.address1, &args.address2) {
        (Some(prop_id), _, _) => {
            params.insert(String::from("propId"), json!(prop_id));
            policy.by_prop_id(params).await?
        }
        (None, Some(address1), Some(address2)) => {
            params.insert(String::from("address1"), json!(address1));
            params.insert(String::from("address2"), json!(address2));
            policy.by_address(params).await?
        }
        _ => {
            return Err(CliError::InvalidArgument(String::from(
                "comparables needs --prop-id or both --address1 and --address2",
            )))
        }
    };
    Ok(payload)
}
