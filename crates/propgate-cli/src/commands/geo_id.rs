use propgate_core::Gateway;
use serde_json::{json, Value};

use crate::cli::GeoIdArgs;
use crate::error::CliError;

/// Prints `{"subtype": .., "geoId": ..}`; `geoId` is null when unresolved.
pub async fn run(args: &GeoIdArgs, gateway: &Gateway) -> Result<Value, CliError> {
    let subtype = args.subtype.trim().to_ascii_uppercase();
    let geo_id = gateway
        .resolvers()
        .resolve_geo_id_from_address(&args.address1, &args.address2, &subtype)
        .await;
    Ok(json!({ "subtype": subtype, "geoId": geo_id }))
}
