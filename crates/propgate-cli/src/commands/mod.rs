mod comparables;
mod endpoints;
mod geo_id;
mod query;

use propgate_core::{Gateway, GatewayBuilder, ParamBag};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    match &cli.command {
        Command::Endpoints(args) => endpoints::run(args),
        Command::Query(args) => query::run(args, &gateway()?).await,
        Command::Comparables(args) => comparables::run(args, &gateway()?).await,
        Command::GeoId(args) => geo_id::run(args, &gateway()?).await,
    }
}

fn gateway() -> Result<Gateway, CliError> {
    Ok(GatewayBuilder::from_env()?.build()?)
}

/// Parses repeated `key=value` arguments. Later keys win.
pub(crate) fn parse_params(raw: &[String]) -> Result<ParamBag, CliError> {
    let mut params = ParamBag::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::InvalidArgument(format!(
                "parameter '{pair}' must be key=value"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "parameter '{pair}' has an empty key"
            )));
        }
        params.insert(key.to_owned(), Value::String(value.trim().to_owned()));
    }
    Ok(params)
}
