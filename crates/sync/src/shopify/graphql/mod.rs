//! Query-document source with cost-based throttling.

mod conversions;
mod queries;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphql_client::QueryBody;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use storesync_core::{Order, Product};
use tracing::instrument;

use crate::config::{ApiStyle, ShopifyConfig, SyncTuning};
use crate::rate_limit::{Attempt, CostBudget, RetryPolicy, parse_retry_after};

use super::{
    CatalogSource, CollectionMatch, GraphQLError, GraphQLErrorLocation, Page, ShopifyError,
    truncate_body,
};
use conversions::{convert_order, convert_product};
use queries::{
    COLLECTION_OPERATION, CollectionData, CollectionVariables, ORDERS_DOCUMENT,
    ORDERS_OPERATION, OrdersData, OrdersVariables, PRODUCTS_OPERATION, ProductsData,
    ProductsVariables, collection_document, keyword_search_query, products_document,
};

/// Error code the API returns when the cost budget is exhausted.
const THROTTLED_CODE: &str = "THROTTLED";

/// Shopify Admin API GraphQL source.
///
/// Every response carries the query cost and the remaining budget; when the
/// budget drops below the configured floor the client pauses long enough for
/// it to refill before returning.
#[derive(Clone)]
pub struct GraphQlSource {
    inner: Arc<GraphQlSourceInner>,
}

struct GraphQlSourceInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
    page_size: i64,
    cost_floor: f64,
    min_cost_delay: Duration,
    retry: RetryPolicy,
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLErrorResponse>>,
    extensions: Option<ResponseExtensions>,
}

#[derive(Debug, Deserialize)]
struct ResponseExtensions {
    cost: Option<CostBudget>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorResponse {
    message: String,
    #[serde(default)]
    locations: Vec<GraphQLErrorLocationResponse>,
    #[serde(default)]
    path: Vec<serde_json::Value>,
    #[serde(default)]
    extensions: Option<GraphQLErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorExtensions {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorLocationResponse {
    line: i64,
    column: i64,
}

impl GraphQLErrorResponse {
    fn code(&self) -> Option<&str> {
        self.extensions.as_ref().and_then(|e| e.code.as_deref())
    }
}

impl GraphQlSource {
    /// Create a new GraphQL source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ShopifyConfig, tuning: &SyncTuning) -> Result<Self, ShopifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(GraphQlSourceInner {
                client,
                endpoint: format!(
                    "https://{}/admin/api/{}/graphql.json",
                    config.store, config.api_version
                ),
                access_token: config.access_token.clone(),
                page_size: i64::from(tuning.page_size),
                cost_floor: tuning.cost_floor,
                min_cost_delay: tuning.min_cost_delay,
                retry: RetryPolicy::from_tuning(tuning),
            }),
        })
    }

    // =========================================================================
    // GraphQL Execution
    // =========================================================================

    /// Execute a query document, retrying throttled attempts and pacing on cost.
    async fn execute<V, D>(
        &self,
        operation_name: &'static str,
        query: &'static str,
        variables: V,
    ) -> Result<D, ShopifyError>
    where
        V: Serialize + Send + Sync,
        D: DeserializeOwned + Send,
    {
        let body = QueryBody {
            variables,
            query,
            operation_name,
        };

        let (data, cost) = self
            .inner
            .retry
            .run(operation_name, || self.send_once::<V, D>(&body))
            .await?;

        if let Some(cost) = cost {
            self.pace_on_cost(operation_name, &cost).await;
        }

        Ok(data)
    }

    /// One HTTP round trip.
    async fn send_once<V, D>(
        &self,
        body: &QueryBody<V>,
    ) -> Result<Attempt<(D, Option<CostBudget>)>, ShopifyError>
    where
        V: Serialize + Send + Sync,
        D: DeserializeOwned + Send,
    {
        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("X-Shopify-Access-Token", self.inner.access_token.expose_secret())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ShopifyError::Unauthorized(
                "Invalid or expired access token".to_string(),
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ShopifyError::Status {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let graphql_response: GraphQLResponse<D> = response.json().await?;
        let cost = graphql_response.extensions.and_then(|e| e.cost);

        // Check for GraphQL errors
        if let Some(errors) = graphql_response.errors
            && !errors.is_empty()
        {
            if errors.iter().all(|e| e.code() == Some(THROTTLED_CODE)) {
                let retry_after = cost
                    .as_ref()
                    .and_then(|c| c.throttle_delay(self.inner.cost_floor, self.inner.min_cost_delay));
                return Ok(Attempt::RateLimited { retry_after });
            }
            return Err(ShopifyError::GraphQL(convert_errors(errors)));
        }

        let data = graphql_response.data.ok_or_else(|| {
            ShopifyError::GraphQL(vec![GraphQLError {
                message: "No data in response".to_string(),
                code: None,
                locations: vec![],
                path: vec![],
            }])
        })?;

        Ok(Attempt::Done((data, cost)))
    }

    /// Sleep if the remaining cost budget is under the floor.
    async fn pace_on_cost(&self, operation_name: &str, cost: &CostBudget) {
        tracing::debug!(
            operation_name,
            actual_cost = cost.actual_query_cost,
            available = cost.throttle_status.currently_available,
            "Query cost"
        );
        if let Some(delay) = cost.throttle_delay(self.inner.cost_floor, self.inner.min_cost_delay) {
            tracing::warn!(
                operation_name,
                available = cost.throttle_status.currently_available,
                restore_rate = cost.throttle_status.restore_rate,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Cost budget low, pausing"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn products(
        &self,
        first: i64,
        after: Option<String>,
        query: Option<String>,
    ) -> Result<Page<Product>, ShopifyError> {
        let variables = ProductsVariables {
            first,
            after,
            query,
        };
        let data: ProductsData = self
            .execute(PRODUCTS_OPERATION, products_document(), variables)
            .await?;

        let next_cursor = data.products.next_cursor();
        Ok(Page {
            items: data.products.into_nodes().map(convert_product).collect(),
            next_cursor,
        })
    }
}

fn convert_errors(errors: Vec<GraphQLErrorResponse>) -> Vec<GraphQLError> {
    errors
        .into_iter()
        .map(|e| GraphQLError {
            code: e.code().map(String::from),
            message: e.message,
            locations: e
                .locations
                .into_iter()
                .map(|l| GraphQLErrorLocation {
                    line: l.line,
                    column: l.column,
                })
                .collect(),
            path: e.path,
        })
        .collect()
}

#[async_trait]
impl CatalogSource for GraphQlSource {
    fn style(&self) -> ApiStyle {
        ApiStyle::GraphQl
    }

    #[instrument(skip(self))]
    async fn product_page(&self, cursor: Option<String>) -> Result<Page<Product>, ShopifyError> {
        self.products(self.inner.page_size, cursor, None).await
    }

    #[instrument(skip(self))]
    async fn order_page(&self, cursor: Option<String>) -> Result<Page<Order>, ShopifyError> {
        let variables = OrdersVariables {
            first: self.inner.page_size,
            after: cursor,
        };
        let data: OrdersData = self
            .execute(ORDERS_OPERATION, ORDERS_DOCUMENT, variables)
            .await?;

        let next_cursor = data.orders.next_cursor();
        Ok(Page {
            items: data.orders.into_nodes().map(convert_order).collect(),
            next_cursor,
        })
    }

    #[instrument(skip(self))]
    async fn search_products(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<Product>, ShopifyError> {
        let first = i64::try_from(limit.clamp(1, 250)).unwrap_or(250);
        let page = self
            .products(first, None, Some(keyword_search_query(keyword)))
            .await?;
        Ok(page.items)
    }

    #[instrument(skip(self))]
    async fn collection_by_handle(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Option<CollectionMatch>, ShopifyError> {
        let variables = CollectionVariables {
            handle: handle.to_string(),
            first: i64::try_from(limit.clamp(1, 250)).unwrap_or(250),
        };
        let data: CollectionData = self
            .execute(COLLECTION_OPERATION, collection_document(), variables)
            .await?;

        Ok(data.collection_by_handle.map(|c| CollectionMatch {
            handle: c.handle,
            title: c.title,
            products: c.products.into_nodes().map(convert_product).collect(),
        }))
    }
}
