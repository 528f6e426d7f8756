//! Sentinel Hub STAC catalog search.
//!
//! `POST {base}/api/v1/catalog/1.0.0/search` with a CQL2 text filter on
//! cloud cover. Results are paginated through the `context.next` token.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::http::HttpClient;
use super::session::SentinelHubSession;
use crate::catalog::{CatalogError, CatalogSearch, Observation, QualityFilter};
use crate::coord::BoundingBox;
use crate::dekad::TimeInterval;
use crate::source::S2L2A_COLLECTION;

const SEARCH_PATH: &str = "/api/v1/catalog/1.0.0/search";

/// Items requested per page.
pub const CATALOG_PAGE_LIMIT: u32 = 100;

/// Upper bound on pages per search.
const MAX_PAGES: usize = 1000;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    context: Option<SearchContext>,
}

#[derive(Deserialize)]
struct Feature {
    id: String,
    properties: FeatureProperties,
}

#[derive(Deserialize)]
struct FeatureProperties {
    datetime: String,
    #[serde(rename = "eo:cloud_cover", default)]
    cloud_cover: Option<f64>,
}

#[derive(Deserialize)]
struct SearchContext {
    #[serde(default)]
    next: Option<u64>,
}

/// Sentinel-2 L2A catalog.
pub struct SentinelHubCatalog<H> {
    session: Arc<SentinelHubSession<H>>,
    collection: String,
}

impl<H: HttpClient> SentinelHubCatalog<H> {
    pub fn new(session: Arc<SentinelHubSession<H>>) -> Self {
        Self {
            session,
            collection: S2L2A_COLLECTION.to_string(),
        }
    }

    fn request_body(
        &self,
        bbox: &BoundingBox,
        interval: &TimeInterval,
        filter: &QualityFilter,
        next: Option<u64>,
    ) -> serde_json::Value {
        let mut body = json!({
            "bbox": bbox.to_array(),
            "datetime": interval.to_iso_range(),
            "collections": [self.collection],
            "limit": CATALOG_PAGE_LIMIT,
            "filter": filter.to_cql2(),
            "filter-lang": "cql2-text",
            "fields": {
                "include": ["id", "properties.datetime", "properties.eo:cloud_cover"],
                "exclude": []
            }
        });
        if let Some(next) = next {
            body["next"] = json!(next);
        }
        body
    }

    fn page(
        &self,
        bbox: &BoundingBox,
        interval: &TimeInterval,
        filter: &QualityFilter,
        next: Option<u64>,
    ) -> Result<SearchResponse, CatalogError> {
        let body = self.request_body(bbox, interval, filter, next).to_string();
        let response = self
            .session
            .post_json(SEARCH_PATH, &body)
            .map_err(|e| CatalogError::Request(e.to_string()))?;
        if !response.is_success() {
            return Err(CatalogError::Request(format!(
                "HTTP {}: {}",
                response.status,
                response.body_excerpt()
            )));
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CatalogError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CatalogError::InvalidResponse(format!("bad datetime {:?}: {}", s, e)))
}

impl<H: HttpClient> CatalogSearch for SentinelHubCatalog<H> {
    fn search(
        &self,
        bbox: &BoundingBox,
        interval: &TimeInterval,
        filter: &QualityFilter,
    ) -> Result<Vec<Observation>, CatalogError> {
        let mut observations = Vec::new();
        let mut next = None;

        for page in 0..MAX_PAGES {
            let response = self.page(bbox, interval, filter, next)?;
            for feature in response.features {
                let mut observation = Observation::new(
                    parse_datetime(&feature.properties.datetime)?,
                    feature.id,
                );
                observation.cloud_cover = feature.properties.cloud_cover;
                observations.push(observation);
            }

            next = response.context.and_then(|c| c.next);
            if next.is_none() {
                debug!(
                    interval = %interval,
                    pages = page + 1,
                    items = observations.len(),
                    "Catalog search complete"
                );
                return Ok(observations);
            }
        }

        Err(CatalogError::InvalidResponse(format!(
            "pagination did not finish after {} pages",
            MAX_PAGES
        )))
    }
}
