use propgate_core::Gateway;
use serde_json::Value;

use crate::cli::QueryArgs;
use crate::error::CliError;

use super::parse_params;

pub async fn run(args: &QueryArgs, gateway: &Gateway) -> Result<Value, CliError> {
    let params = parse_params(&args.params)?;
    let payload = gateway
        .query_cached(&args.endpoint, params, args.cache.into())
        .await?;
    Ok(payload)
}
