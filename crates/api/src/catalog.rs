//! HTTP client for the catalog write service.
//!
//! The catalog owns product storage and its own upsert atomicity; this
//! client only translates [`CatalogWriter`] calls into REST requests.
//!
//! ```text
//! GET    /products?{handle|sku|external_id}=..   find
//! POST   /products                               create
//! POST   /products/{id}                          update
//! GET    /products/{id}/variants                 list variants
//! POST   /products/{id}/variants/batch-delete    delete variants
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use swatch_core::ports::{
    CatalogError, CatalogRef, CatalogVariant, CatalogWriter, LookupKey, WriteOptions,
};
use swatch_core::product_row::ProductRow;

use crate::config::CatalogConfig;

pub struct HttpCatalogClient {
    client: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct WriteBody<'a> {
    product: &'a ProductRow,
    variant_strategy: &'static str,
    image_strategy: &'static str,
    unarchive: bool,
}

impl<'a> WriteBody<'a> {
    fn new(row: &'a ProductRow, options: &WriteOptions) -> Self {
        Self {
            product: row,
            variant_strategy: options.variant_strategy.as_str(),
            image_strategy: options.image_strategy.as_str(),
            unarchive: options.unarchive,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductList {
    products: Vec<CatalogRef>,
}

#[derive(Debug, Deserialize)]
struct VariantList {
    variants: Vec<CatalogVariant>,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    ids: &'a [String],
}

impl HttpCatalogClient {
    pub fn new(config: &CatalogConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &CatalogConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.api_url));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        builder: reqwest::RequestBuilder,
    ) -> Result<T, CatalogError> {
        let response = Self::ensure_success(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Unavailable(format!("invalid catalog response: {e}")))
    }

    async fn ensure_success(
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CatalogError> {
        let response = builder
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(classify_status(status, body))
    }
}

/// Client errors reject the row; throttling, timeouts and server errors
/// mean the catalog itself is unhealthy.
fn classify_status(status: StatusCode, body: String) -> CatalogError {
    let message = format!("catalog returned {}: {body}", status.as_u16());
    if status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
    {
        CatalogError::Rejected(message)
    } else {
        CatalogError::Unavailable(message)
    }
}

fn lookup_query(key: &LookupKey) -> (&'static str, &str) {
    match key {
        LookupKey::Handle(v) => ("handle", v),
        LookupKey::Sku(v) => ("sku", v),
        LookupKey::ExternalId(v) => ("external_id", v),
    }
}

#[async_trait]
impl CatalogWriter for HttpCatalogClient {
    async fn find_product(&self, key: &LookupKey) -> Result<Option<CatalogRef>, CatalogError> {
        let (name, value) = lookup_query(key);
        let list: ProductList = Self::send(
            self.request(reqwest::Method::GET, "/products")
                .query(&[(name, value), ("limit", "1")]),
        )
        .await?;
        Ok(list.products.into_iter().next())
    }

    async fn create_product(
        &self,
        row: &ProductRow,
        options: &WriteOptions,
    ) -> Result<CatalogRef, CatalogError> {
        Self::send(
            self.request(reqwest::Method::POST, "/products")
                .json(&WriteBody::new(row, options)),
        )
        .await
    }

    async fn update_product(
        &self,
        existing: &CatalogRef,
        row: &ProductRow,
        options: &WriteOptions,
    ) -> Result<CatalogRef, CatalogError> {
        Self::send(
            self.request(
                reqwest::Method::POST,
                &format!("/products/{}", existing.product_id),
            )
            .json(&WriteBody::new(row, options)),
        )
        .await
    }

    async fn list_variants(&self, product_id: &str) -> Result<Vec<CatalogVariant>, CatalogError> {
        let list: VariantList = Self::send(self.request(
            reqwest::Method::GET,
            &format!("/products/{product_id}/variants"),
        ))
        .await?;
        Ok(list.variants)
    }

    async fn delete_variants(
        &self,
        product_id: &str,
        variant_ids: &[String],
    ) -> Result<(), CatalogError> {
        Self::ensure_success(
            self.request(
                reqwest::Method::POST,
                &format!("/products/{product_id}/variants/batch-delete"),
            )
            .json(&DeleteBody { ids: variant_ids }),
        )
        .await?;
        Ok(())
    }
}
