//! # Propgate Core
//!
//! Query resolution and fallback orchestration for an upstream property-data
//! provider.
//!
//! ## Overview
//!
//! Callers name a logical endpoint and pass a loose parameter bag. The
//! dispatcher validates the bag, fills missing identifiers by chaining
//! auxiliary lookups, injects derived date windows, deduplicates identical
//! concurrent requests and finally calls the upstream through a retrying
//! transport.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`registry`] | Static endpoint catalog and fallback strategies |
//! | [`cache`] | Process-wide TTL cache |
//! | [`transport`] | URL building and retrying upstream calls |
//! | [`resolvers`] | Address → id and address/id → geo id lookups |
//! | [`dispatcher`] | Validation, single-flight and fallback orchestration |
//! | [`comparables`] | Comparable-sales lookups with one widened retry |
//! | [`geo`] | Geo-id subtypes and multi-code disambiguation |
//! | [`normalize`] | Best-effort address normalization |
//! | [`config`] | Environment-driven configuration |
//! | [`gateway`] | Wiring from configuration to a ready dispatcher |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use propgate_core::{params, GatewayBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = GatewayBuilder::from_env()?.build()?;
//!
//!     let history = gateway
//!         .query(
//!             "salesHistorySnapshot",
//!             params::bag([("address1", "123 Main St"), ("address2", "Anytown, CA 90210")]),
//!         )
//!         .await?;
//!     println!("{history}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Query Dispatcher│────▶│ Fallback Resolvers│
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retrying        │◀────│ TTL Cache /      │
//! │ Transport       │     │ Context Store    │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ HTTP Client     │
//! └─────────────────┘
//! ```
//!
//! ## Security
//!
//! - The API key is read from the environment and never logged.

pub mod cache;
pub mod comparables;
pub mod config;
pub mod context;
pub mod derived;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod geo;
pub mod http_client;
pub mod normalize;
pub mod params;
pub mod registry;
pub mod resolvers;
pub mod retry;
pub mod throttling;
pub mod transport;

pub use cache::{CacheMode, TtlCache};
pub use comparables::ComparablesPolicy;
pub use config::GatewayConfig;
pub use context::{ContextStore, RequestContext};
pub use derived::AddressComponents;
pub use dispatcher::{cache_key, QueryDispatcher};
pub use error::{ConfigError, NormalizeError, QueryError, StructuredError, UpstreamSignal};
pub use gateway::{Gateway, GatewayBuilder};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use normalize::{AddressCandidate, AddressNormalizer, NormalizedAddress, PlacesNormalizer};
pub use params::ParamBag;
pub use registry::{
    CachePolicy, DerivedParam, EndpointCategory, EndpointDescriptor, EndpointRegistry,
    FallbackStrategy,
};
pub use resolvers::FallbackResolvers;
pub use retry::{Backoff, RetryConfig};
pub use throttling::UpstreamThrottle;
pub use transport::{FetchOptions, Transport};
