//! Sentinel Hub Process API raster requests.
//!
//! Each [`FetchRequest`] becomes one `POST {base}/api/v1/process` call
//! returning a single-band TIFF rendered by the source's evalscript.

use std::sync::Arc;

use serde_json::json;
use tracing::trace;

use super::http::HttpClient;
use super::session::SentinelHubSession;
use super::types::ProviderError;
use crate::dekad::format_instant;
use crate::fetch::{FetchError, FetchRequest, FetchedRaster, RasterFetch};

const PROCESS_PATH: &str = "/api/v1/process";

const CRS84: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";

/// Raster fetcher backed by the Process API.
pub struct SentinelHubProcess<H> {
    session: Arc<SentinelHubSession<H>>,
}

impl<H: HttpClient> SentinelHubProcess<H> {
    pub fn new(session: Arc<SentinelHubSession<H>>) -> Self {
        Self { session }
    }

    /// JSON body for a request.
    pub fn request_body(request: &FetchRequest) -> serde_json::Value {
        let mut data_filter = json!({
            "timeRange": {
                "from": format_instant(request.time_range.start()),
                "to": format_instant(request.time_range.end()),
            }
        });
        if let Some(order) = request.source.mosaicking_order() {
            data_filter["mosaickingOrder"] = json!(order);
        }

        json!({
            "input": {
                "bounds": {
                    "bbox": request.tile.bbox.to_array(),
                    "properties": { "crs": CRS84 }
                },
                "data": [{
                    "type": request.source.collection(),
                    "dataFilter": data_filter
                }]
            },
            "output": {
                "width": request.tile.size.0,
                "height": request.tile.size.1,
                "responses": [{
                    "identifier": "default",
                    "format": { "type": "image/tiff" }
                }]
            },
            "evalscript": request.source.evalscript()
        })
    }
}

impl<H: HttpClient> RasterFetch for SentinelHubProcess<H> {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedRaster, FetchError> {
        let body = Self::request_body(request).to_string();
        trace!(
            timestamp = %request.timestamp,
            tile = request.tile.index,
            source = %request.source,
            "Process API request"
        );

        let response = self
            .session
            .post_json(PROCESS_PATH, &body)
            .map_err(|e| match e {
                ProviderError::AuthError(msg) => FetchError::Auth(msg),
                other => FetchError::Request(other.to_string()),
            })?;

        match response.status {
            200..=299 if !response.body.is_empty() => Ok(FetchedRaster {
                bytes: response.body,
                width: request.tile.size.0,
                height: request.tile.size.1,
            }),
            200..=299 | 404 => Err(FetchError::Unavailable(format!(
                "HTTP {} for {}",
                response.status,
                format_instant(request.timestamp)
            ))),
            status => Err(FetchError::Http {
                status,
                message: response.body_excerpt(),
            }),
        }
    }
}
