//! Product catalog service

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use shared::models::{MovementKind, MovementReference, Product, StockBatch};

use crate::error::{AppError, AppResult};
use crate::services::batches::BatchRow;
use crate::services::movements::{MovementLogService, NewMovement};
use crate::services::reducer::{stock_level, StockReducer};

/// Service for managing the product catalog
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Input for creating a new product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub sku: String,
    pub minimum_stock_threshold: Option<i32>,
    /// Stock already on the shelf when the product enters the system
    pub initial_stock: Option<InitialStockInput>,
}

/// Opening stock recorded as a vendor-less batch
#[derive(Debug, Deserialize)]
pub struct InitialStockInput {
    pub quantity: i32,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    /// Defaults to today
    pub batch_date: Option<NaiveDate>,
}

/// Input for updating an existing product
#[derive(Debug, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub minimum_stock_threshold: Option<i32>,
}

/// A product together with the authoritative batch sum behind its cache
#[derive(Debug, Serialize)]
pub struct ProductStockView {
    pub product: Product,
    /// Live sum over active batches; the cache should agree
    pub authoritative_stock: i64,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    sku: String,
    stock: i32,
    minimum_stock_threshold: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            sku: row.sku,
            stock: row.stock,
            minimum_stock_threshold: row.minimum_stock_threshold,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StockViewRow {
    id: Uuid,
    name: String,
    sku: String,
    stock: i32,
    minimum_stock_threshold: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    authoritative_stock: i64,
}

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a new product, optionally seeded with opening stock.
    ///
    /// Opening stock becomes a regular batch with no vendor behind it, and
    /// an added movement so the audit trail starts at the true beginning.
    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<Product> {
        if input.name.trim().is_empty() {
            return Err(AppError::validation("name", "Product name is required"));
        }
        if input.sku.trim().is_empty() {
            return Err(AppError::validation("sku", "Product SKU is required"));
        }
        if let Some(threshold) = input.minimum_stock_threshold {
            if threshold < 0 {
                return Err(AppError::validation(
                    "minimum_stock_threshold",
                    "Minimum stock threshold cannot be negative",
                ));
            }
        }
        if let Some(ref initial) = input.initial_stock {
            if initial.quantity <= 0 {
                return Err(AppError::validation(
                    "initial_stock",
                    "Initial stock quantity must be positive",
                ));
            }
            if initial.purchase_price < Decimal::ZERO || initial.selling_price < Decimal::ZERO {
                return Err(AppError::validation("price", "Prices cannot be negative"));
            }
        }

        // Check if SKU already exists
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE LOWER(sku) = LOWER($1)",
        )
        .bind(&input.sku)
        .fetch_one(&self.db)
        .await?;

        if existing > 0 {
            return Err(AppError::DuplicateEntry(format!("SKU {}", input.sku)));
        }

        let mut tx = self.db.begin().await?;

        let mut product: Product = sqlx::query_as::<_, ProductRow>(
            r#"
            INSERT INTO products (name, sku, minimum_stock_threshold)
            VALUES ($1, $2, $3)
            RETURNING id, name, sku, stock, minimum_stock_threshold, created_at, updated_at
            "#,
        )
        .bind(input.name.trim())
        .bind(input.sku.trim())
        .bind(input.minimum_stock_threshold.unwrap_or(0))
        .fetch_one(&mut *tx)
        .await?
        .into();

        if let Some(initial) = input.initial_stock {
            let stock_before =
                stock_level(StockReducer::active_stock(&mut tx, product.id).await?)?;
            let batch_date = initial.batch_date.unwrap_or_else(|| Utc::now().date_naive());

            let batch: StockBatch = sqlx::query_as::<_, BatchRow>(
                r#"
                INSERT INTO stock_batches (product_id, quantity_purchased, quantity_remaining,
                                           purchase_price, selling_price, batch_date, status)
                VALUES ($1, $2, $2, $3, $4, $5, 'active')
                RETURNING id, product_id, vendor_id, purchase_order_id, quantity_purchased,
                          quantity_remaining, purchase_price, selling_price, batch_date, status,
                          created_at, updated_at
                "#,
            )
            .bind(product.id)
            .bind(initial.quantity)
            .bind(initial.purchase_price)
            .bind(initial.selling_price)
            .bind(batch_date)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;

            MovementLogService::record(
                &mut tx,
                NewMovement {
                    product_id: product.id,
                    batch_id: Some(batch.id),
                    kind: MovementKind::Added,
                    reference: MovementReference::Adjustment("initial stock".to_string()),
                    quantity: initial.quantity,
                    stock_before,
                },
            )
            .await?;

            product.stock = StockReducer::refresh_product_stock(&mut tx, product.id).await?;
        }

        tx.commit().await?;

        tracing::info!("Created product {} ({})", product.name, product.sku);

        Ok(product)
    }

    /// Get a product by ID
    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        let product = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, sku, stock, minimum_stock_threshold, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;

        Ok(product.into())
    }

    /// Get a product by SKU
    pub async fn get_product_by_sku(&self, sku: &str) -> AppResult<Product> {
        let product = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, sku, stock, minimum_stock_threshold, created_at, updated_at
            FROM products
            WHERE LOWER(sku) = LOWER($1)
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product with SKU {}", sku)))?;

        Ok(product.into())
    }

    /// Get a product alongside the authoritative sum of its active batches
    pub async fn get_product_with_stock(&self, product_id: Uuid) -> AppResult<ProductStockView> {
        let row = sqlx::query_as::<_, StockViewRow>(
            r#"
            SELECT p.id, p.name, p.sku, p.stock, p.minimum_stock_threshold,
                   p.created_at, p.updated_at,
                   COALESCE(SUM(CASE WHEN b.status = 'active' THEN b.quantity_remaining ELSE 0 END), 0) as authoritative_stock
            FROM products p
            LEFT JOIN stock_batches b ON b.product_id = p.id
            WHERE p.id = $1
            GROUP BY p.id, p.name, p.sku, p.stock, p.minimum_stock_threshold, p.created_at, p.updated_at
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;

        Ok(ProductStockView {
            product: Product {
                id: row.id,
                name: row.name,
                sku: row.sku,
                stock: row.stock,
                minimum_stock_threshold: row.minimum_stock_threshold,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            authoritative_stock: row.authoritative_stock,
        })
    }

    /// List all products ordered by name
    pub async fn list_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, sku, stock, minimum_stock_threshold, created_at, updated_at
            FROM products
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// List products whose cached stock is at or below their threshold.
    ///
    /// Reads the cache only, so the answer can lag the batch ledger by an
    /// in-flight transaction. Good enough for reorder screens.
    pub async fn low_stock_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, sku, stock, minimum_stock_threshold, created_at, updated_at
            FROM products
            WHERE stock <= minimum_stock_threshold
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Update product name or reorder threshold
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        if let Some(ref name) = input.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("name", "Product name cannot be empty"));
            }
        }
        if let Some(threshold) = input.minimum_stock_threshold {
            if threshold < 0 {
                return Err(AppError::validation(
                    "minimum_stock_threshold",
                    "Minimum stock threshold cannot be negative",
                ));
            }
        }

        let product = sqlx::query_as::<_, ProductRow>(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                minimum_stock_threshold = COALESCE($3, minimum_stock_threshold),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, sku, stock, minimum_stock_threshold, created_at, updated_at
            "#,
        )
        .bind(product_id)
        .bind(input.name.as_ref().map(|n| n.trim().to_string()))
        .bind(input.minimum_stock_threshold)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;

        Ok(product.into())
    }
}
