use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::domain::ports::{ProductStore, StoreError};
use crate::domain::product::{decode_product, merge, ProductInsights};

#[derive(Debug, Serialize)]
pub struct InsightsReport {
    #[serde(flatten)]
    pub insights: ProductInsights,
    pub products: usize,
    /// Payloads that did not match any known product shape.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ProductInsightsService {
    products: Arc<dyn ProductStore>,
}

impl ProductInsightsService {
    pub fn new(products: Arc<dyn ProductStore>) -> Self {
        Self { products }
    }

    pub async fn load(
        &self,
        source_product_id: Option<Uuid>,
        research_result_id: Option<Uuid>,
    ) -> Result<InsightsReport, StoreError> {
        let payloads = self
            .products
            .product_payloads(source_product_id, research_result_id)
            .await?;

        let mut decoded = Vec::with_capacity(payloads.len());
        let mut skipped = 0;
        for payload in &payloads {
            match decode_product(payload) {
                Ok(insights) => decoded.push(insights),
                Err(err) => {
                    warn!(error = %err, "skipping product payload");
                    skipped += 1;
                }
            }
        }

        Ok(InsightsReport {
            products: decoded.len(),
            insights: merge(decoded),
            skipped,
        })
    }
}
