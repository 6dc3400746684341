//! PI Web API client
//!
//! Navigation always starts at the API root and follows the `Links` of each
//! response, so the client works with any server layout.

use super::types::{
    selected_fields, ElementInfo, PiAttribute, PiConnection, PiElement, PiItems, PiPoint, PiRoot,
    PiServer, PointInfo,
};
use crate::auth::AuthConfig;
use crate::error::Result;
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig, RequestConfig};
use crate::types::BackoffType;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// Client for one PI Web API server
#[derive(Debug)]
pub struct PiClient {
    http: HttpClient,
    base_url: String,
}

impl PiClient {
    /// Create a client with Basic auth
    pub fn new(connection: &PiConnection) -> Result<Self> {
        let base_url = connection.base_url();
        let config = HttpClientConfig::builder()
            .base_url(base_url.clone())
            .timeout(Duration::from_secs(connection.timeout_secs))
            .max_retries(connection.max_retries)
            .backoff(
                BackoffType::Exponential,
                Duration::from_millis(200),
                Duration::from_secs(10),
            )
            .accept_invalid_certs(connection.accept_invalid_certs)
            .rate_limit(RateLimiterConfig::new(
                connection.requests_per_second,
                connection.requests_per_second,
            ))
            .header("Accept", "application/json")
            .build();

        let auth = AuthConfig::basic(connection.username.clone(), connection.password.clone());
        let http = HttpClient::with_auth(config, auth)?;

        Ok(Self { http, base_url })
    }

    /// API root URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a resource (absolute link or path below the root)
    pub async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut request = RequestConfig::new();
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        debug!(url, ?query, "GET PI Web API");
        self.http.request_json(Method::GET, url, request).await
    }

    /// API root
    pub async fn root(&self) -> Result<PiRoot> {
        self.get(&self.base_url, &[]).await
    }

    /// All data servers
    pub async fn data_servers(&self) -> Result<Vec<PiServer>> {
        let root = self.root().await?;
        let servers: PiItems<PiServer> = self.get(root.links.get("DataServers")?, &[]).await?;
        Ok(servers.items)
    }

    /// Points of a data server, optionally filtered by name
    pub async fn points(&self, server: &PiServer, name_filter: Option<&str>) -> Result<Vec<PiPoint>> {
        let fields = selected_fields(
            "Items",
            &["Name", "PointType", "Span", "Zero", "Links.RecordedData"],
        );
        let mut query = vec![("selectedFields", fields.as_str())];
        if let Some(filter) = name_filter {
            query.push(("nameFilter", filter));
        }

        let points: PiItems<PiPoint> = self.get(server.links.get("Points")?, &query).await?;
        Ok(points.items)
    }

    /// Databases of the first asset server
    pub async fn asset_databases(&self) -> Result<Vec<PiElement>> {
        let servers: PiItems<PiServer> = self.get("assetservers", &[]).await?;
        let Some(server) = servers.items.first() else {
            info!("PI Web API reports no asset server");
            return Ok(Vec::new());
        };

        let databases: PiItems<PiElement> = self.get(server.links.get("Databases")?, &[]).await?;
        Ok(databases.items)
    }

    /// Elements below `elements_link`, searching the whole hierarchy
    pub async fn search_elements(
        &self,
        elements_link: &str,
        name_filter: Option<&str>,
    ) -> Result<Vec<PiElement>> {
        let fields = selected_fields(
            "Items",
            &[
                "Name",
                "Path",
                "Description",
                "Links.Elements",
                "Links.Attributes",
            ],
        );
        let mut query = vec![
            ("searchFullHierarchy", "true"),
            ("selectedFields", fields.as_str()),
        ];
        if let Some(filter) = name_filter {
            query.push(("nameFilter", filter));
        }

        let elements: PiItems<PiElement> = self.get(elements_link, &query).await?;
        Ok(elements.items)
    }

    /// List every point of every data server
    pub async fn list_points(&self) -> Result<Vec<PointInfo>> {
        let mut listed = Vec::new();
        for server in self.data_servers().await? {
            info!("Data server {}", server.name);
            for point in self.points(&server, None).await? {
                listed.push(PointInfo {
                    server: server.name.clone(),
                    name: point.name,
                    point_type: point.point_type,
                    span: point.span,
                    zero: point.zero,
                });
            }
        }
        Ok(listed)
    }

    /// List elements whose path starts with `path_prefix`
    pub async fn list_elements(
        &self,
        path_prefix: Option<&str>,
        with_attributes: bool,
    ) -> Result<Vec<ElementInfo>> {
        let matches = |path: &str| path_prefix.map_or(true, |p| path.starts_with(p));
        let mut listed = Vec::new();

        for database in self.asset_databases().await? {
            if matches(&database.path) {
                info!("Database {}: {:?}", database.path, database.description);
            }

            let elements = self
                .search_elements(database.links.get("Elements")?, None)
                .await?;
            for element in elements.into_iter().filter(|e| matches(&e.path)) {
                let attributes = if with_attributes {
                    let attrs: PiItems<PiAttribute> =
                        self.get(element.links.get("Attributes")?, &[]).await?;
                    attrs.items
                } else {
                    Vec::new()
                };

                listed.push(ElementInfo {
                    path: element.path,
                    description: element.description,
                    attributes,
                });
            }
        }

        Ok(listed)
    }
}
