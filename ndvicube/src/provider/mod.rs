//! Sentinel Hub service clients
//!
//! This module implements the catalog and raster collaborators against the
//! Sentinel Hub APIs:
//!
//! - [`SentinelHubCatalog`]: STAC catalog search, implements
//!   [`CatalogSearch`](crate::catalog::CatalogSearch)
//! - [`SentinelHubProcess`]: Process API raster requests, implements
//!   [`RasterFetch`](crate::fetch::RasterFetch)
//!
//! Both share one [`SentinelHubSession`], which owns the HTTP client and the
//! OAuth2 token cache.
//!
//! ```ignore
//! use std::sync::Arc;
//! use ndvicube::provider::{Credentials, ReqwestClient, SentinelHubSession};
//!
//! let http = ReqwestClient::with_timeout(120)?;
//! let session = Arc::new(SentinelHubSession::new(http, Credentials::new(id, secret)));
//! let catalog = SentinelHubCatalog::new(Arc::clone(&session));
//! let process = SentinelHubProcess::new(session);
//! ```

mod auth;
mod catalog;
mod http;
mod process;
mod session;
mod types;

pub use auth::{Credentials, TokenProvider, DEFAULT_AUTH_URL};
pub use catalog::{SentinelHubCatalog, CATALOG_PAGE_LIMIT};
pub use http::{HttpClient, ReqwestClient};
pub use process::SentinelHubProcess;
pub use session::{SentinelHubSession, DEFAULT_BASE_URL};
pub use types::{HttpResponse, ProviderError};

#[cfg(test)]
pub use http::tests::MockHttpClient;
