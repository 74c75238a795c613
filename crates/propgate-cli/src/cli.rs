//! CLI argument definitions for propgate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `query` | Run any registered endpoint with loose parameters |
//! | `comparables` | Comparable sales with one widened retry |
//! | `geo-id` | Resolve a geo id of one subtype for an address |
//! | `endpoints` | List registered endpoints |
//!
//! # Examples
//!
//! ```bash
//! propgate query salesHistorySnapshot -p address1="123 Main St" -p address2="Anytown, CA 90210"
//! propgate comparables --address1 "123 Main St" --address2 "Anytown, CA 90210" --pretty
//! propgate geo-id --address1 "123 Main St" --address2 "Anytown, CA 90210" --subtype SB
//! propgate endpoints --category school
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

use propgate_core::CacheMode;

/// Property-data query gateway.
#[derive(Debug, Parser)]
#[command(
    name = "propgate",
    author,
    version,
    about = "Property-data query gateway with fallback identifier resolution"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Debug-level logs on stderr (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a registered endpoint.
    Query(QueryArgs),
    /// Comparable sales for an address or a property id.
    Comparables(ComparablesArgs),
    /// Resolve a geo id of one subtype for an address.
    GeoId(GeoIdArgs),
    /// List registered endpoints.
    Endpoints(EndpointsArgs),
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Endpoint identifier, e.g. `salesHistorySnapshot`.
    pub endpoint: String,

    /// Parameter as `key=value`; repeatable.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Response cache behaviour.
    #[arg(long, value_enum, default_value_t = CacheArg::Use)]
    pub cache: CacheArg,
}

#[derive(Debug, Args)]
pub struct ComparablesArgs {
    #[arg(long, requires = "address2", conflicts_with = "prop_id")]
    pub address1: Option<String>,

    #[arg(long, requires = "address1")]
    pub address2: Option<String>,

    /// Known property identifier.
    #[arg(long)]
    pub prop_id: Option<String>,

    /// Extra filters as `key=value`, e.g. `-p miles=2`.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

#[derive(Debug, Args)]
pub struct GeoIdArgs {
    #[arg(long)]
    pub address1: String,

    #[arg(long)]
    pub address2: String,

    /// Geo subtype code such as SB, DB, N2 or ZI.
    #[arg(long, default_value = "ZI")]
    pub subtype: String,
}

#[derive(Debug, Args)]
pub struct EndpointsArgs {
    /// Only endpoints of this category, e.g. `school` or `sales-history`.
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheArg {
    /// Serve cached responses when fresh.
    Use,
    /// Always fetch and overwrite the cache.
    Refresh,
    /// Never touch the cache.
    Bypass,
}

impl From<CacheArg> for CacheMode {
    fn from(value: CacheArg) -> Self {
        match value {
            CacheArg::Use => Self::Use,
            CacheArg::Refresh => Self::Refresh,
            CacheArg::Bypass => Self::Bypass,
        }
    }
}
