//! Catalog application of validated rows, and variant pruning.

use std::collections::{BTreeMap, BTreeSet};

use crate::artifacts::{PruneCandidate, RowOutcome};
use crate::import_job::{ImportMode, ImportOptions};
use crate::ports::{CatalogError, CatalogRef, CatalogWriter, LookupKey, WriteOptions};
use crate::product_row::ProductRow;

/// Result of staging or applying one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWrite {
    pub outcome: RowOutcome,
    pub catalog_ref: Option<CatalogRef>,
}

pub fn write_options(options: &ImportOptions) -> WriteOptions {
    WriteOptions {
        variant_strategy: options.variant_strategy,
        image_strategy: options.image_strategy,
        unarchive: options.unarchive,
    }
}

/// Stage (dry run) or apply (execute) one row.
///
/// The upsert strategy picks the lookup key; a dry run only ever reads.
pub async fn apply_row(
    catalog: &dyn CatalogWriter,
    row: &ProductRow,
    options: &ImportOptions,
) -> Result<RowWrite, CatalogError> {
    let existing = match LookupKey::for_row(options.upsert, row) {
        Some(key) => catalog.find_product(&key).await?,
        None => None,
    };

    let write = match (options.mode, existing) {
        (ImportMode::DryRun, Some(found)) => RowWrite {
            outcome: RowOutcome::WouldUpdate,
            catalog_ref: Some(found),
        },
        (ImportMode::DryRun, None) => RowWrite {
            outcome: RowOutcome::WouldCreate,
            catalog_ref: None,
        },
        (ImportMode::Execute, Some(found)) => RowWrite {
            catalog_ref: Some(
                catalog
                    .update_product(&found, row, &write_options(options))
                    .await?,
            ),
            outcome: RowOutcome::Updated,
        },
        (ImportMode::Execute, None) => RowWrite {
            catalog_ref: Some(catalog.create_product(row, &write_options(options)).await?),
            outcome: RowOutcome::Created,
        },
    };
    Ok(write)
}

/// SKUs the import carried for each pre-existing product it touched.
#[derive(Debug, Default)]
pub struct PruneScope {
    skus_by_product: BTreeMap<String, BTreeSet<String>>,
}

impl PruneScope {
    /// Track a row that matched an existing product. Rows without a SKU
    /// cannot identify a variant and are not tracked.
    pub fn record(&mut self, product_id: &str, sku: Option<&str>) {
        if let Some(sku) = sku {
            self.skus_by_product
                .entry(product_id.to_string())
                .or_default()
                .insert(sku.to_string());
        }
    }

    /// Variants of touched products whose SKU the import did not mention.
    pub async fn candidates(
        &self,
        catalog: &dyn CatalogWriter,
    ) -> Result<Vec<PruneCandidate>, CatalogError> {
        let mut candidates = Vec::new();
        for (product_id, kept) in &self.skus_by_product {
            for variant in catalog.list_variants(product_id).await? {
                let stale = variant.sku.as_ref().is_some_and(|sku| !kept.contains(sku));
                if stale {
                    candidates.push(PruneCandidate {
                        product_id: product_id.clone(),
                        variant,
                    });
                }
            }
        }
        Ok(candidates)
    }
}

/// Delete the candidates, one call per product.
pub async fn prune(
    catalog: &dyn CatalogWriter,
    candidates: &[PruneCandidate],
) -> Result<(), CatalogError> {
    let mut by_product: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for candidate in candidates {
        by_product
            .entry(candidate.product_id.as_str())
            .or_default()
            .push(candidate.variant.id.clone());
    }
    for (product_id, variant_ids) in by_product {
        catalog.delete_variants(product_id, &variant_ids).await?;
    }
    Ok(())
}
