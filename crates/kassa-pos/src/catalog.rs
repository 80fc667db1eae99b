//! # Catalog
//!
//! Categories and products. Opening stock is set here once; every later
//! stock change goes through the stock engine and leaves a move.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use kassa_core::validation::{
    normalize_barcode, validate_name, validate_price, validate_unit,
};
use kassa_core::{
    Actor, Capability, Category, CoreError, Money, Product, Quantity, ValidationError,
};
use kassa_db::{CategoryRepository, DbError, ProductRepository};

use crate::error::{PosError, PosResult};
use crate::events::PosEvent;
use crate::ServiceContext;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub barcode: Option<String>,
    pub buy_price: Money,
    pub sell_price: Money,
    /// Opening stock. Not recorded as a move.
    pub stock: Quantity,
    pub unit: String,
    pub category_id: Option<String>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, sell_price: Money) -> Self {
        NewProduct {
            name: name.into(),
            barcode: None,
            buy_price: Money::zero(),
            sell_price,
            stock: Quantity::zero(),
            unit: "pcs".to_string(),
            category_id: None,
        }
    }

    pub fn with_buy_price(mut self, price: Money) -> Self {
        self.buy_price = price;
        self
    }

    pub fn with_stock(mut self, stock: Quantity) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn in_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }
}

/// Partial update. `None` keeps the current value; for the nullable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub barcode: Option<Option<String>>,
    pub buy_price: Option<Money>,
    pub sell_price: Option<Money>,
    pub unit: Option<String>,
    pub category_id: Option<Option<String>>,
    pub is_favorite: Option<bool>,
}

// =============================================================================
// Catalog Service
// =============================================================================

#[derive(Clone)]
pub struct Catalog {
    ctx: ServiceContext,
}

impl Catalog {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        Catalog { ctx }
    }

    pub async fn create_category(&self, actor: &Actor, name: &str) -> PosResult<Category> {
        self.ctx.ensure_open()?;
        actor.require(Capability::EditProducts)?;

        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: validate_name("name", name)?,
            created_at: Utc::now(),
        };
        let category_ref = &category;

        self.ctx
            .retry("create_category", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                CategoryRepository::insert(&mut tx, category_ref)
                    .await
                    .map_err(|e| duplicate_on(e, "categories.name", "name", &category_ref.name))?;
                tx.commit().await.map_err(DbError::from)?;
                Ok(())
            })
            .await?;

        info!(category_id = %category.id, name = %category.name, "Category created");
        self.ctx
            .events
            .publish(PosEvent::audit(actor, "category.create", category.name.clone()));
        Ok(category)
    }

    pub async fn create_product(&self, actor: &Actor, new: NewProduct) -> PosResult<Product> {
        self.ctx.ensure_open()?;
        actor.require(Capability::EditProducts)?;

        validate_price("buy_price", new.buy_price)?;
        validate_price("sell_price", new.sell_price)?;
        if new.stock.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "stock".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: validate_name("name", &new.name)?,
            barcode: normalize_barcode(new.barcode.as_deref())?,
            buy_price_tiyin: new.buy_price.tiyin(),
            sell_price_tiyin: new.sell_price.tiyin(),
            stock_milli: new.stock.milli(),
            unit: validate_unit(&new.unit)?,
            category_id: new.category_id,
            is_favorite: false,
            is_archived: false,
            created_at: now,
            updated_at: now,
        };
        let product_ref = &product;

        self.ctx
            .retry("create_product", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                ProductRepository::insert(&mut tx, product_ref)
                    .await
                    .map_err(|e| product_write_error(e, product_ref))?;
                tx.commit().await.map_err(DbError::from)?;
                Ok(())
            })
            .await?;

        info!(product_id = %product.id, name = %product.name, stock = %product.stock(), "Product created");
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "product.create",
            format!("{} @ {} (stock {})", product.name, product.sell_price(), product.stock()),
        ));
        Ok(product)
    }

    /// Edits catalog fields. Stock is not editable here.
    pub async fn update_product(
        &self,
        actor: &Actor,
        product_id: &str,
        update: ProductUpdate,
    ) -> PosResult<Product> {
        self.ctx.ensure_open()?;
        actor.require(Capability::EditProducts)?;

        let name = update.name.as_deref().map(|n| validate_name("name", n)).transpose()?;
        let barcode = match &update.barcode {
            Some(code) => Some(normalize_barcode(code.as_deref())?),
            None => None,
        };
        let unit = update.unit.as_deref().map(validate_unit).transpose()?;
        if let Some(price) = update.buy_price {
            validate_price("buy_price", price)?;
        }
        if let Some(price) = update.sell_price {
            validate_price("sell_price", price)?;
        }
        let (name, barcode, unit, update) = (&name, &barcode, &unit, &update);

        let product = self
            .ctx
            .retry("update_product", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                // Zero delta: locks the row before it is read.
                if !ProductRepository::apply_delta(&mut tx, product_id, Quantity::zero()).await? {
                    return Err(CoreError::ProductNotFound(product_id.to_string()).into());
                }
                let mut product = ProductRepository::fetch(&mut tx, product_id)
                    .await?
                    .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

                if let Some(name) = name {
                    product.name = name.clone();
                }
                if let Some(barcode) = barcode {
                    product.barcode = barcode.clone();
                }
                if let Some(price) = update.buy_price {
                    product.buy_price_tiyin = price.tiyin();
                }
                if let Some(price) = update.sell_price {
                    product.sell_price_tiyin = price.tiyin();
                }
                if let Some(unit) = unit {
                    product.unit = unit.clone();
                }
                if let Some(category_id) = &update.category_id {
                    if let Some(id) = category_id {
                        if !CategoryRepository::exists(&mut tx, id).await? {
                            return Err(CoreError::CategoryNotFound(id.clone()).into());
                        }
                    }
                    product.category_id = category_id.clone();
                }
                if let Some(favorite) = update.is_favorite {
                    product.is_favorite = favorite;
                }
                product.updated_at = Utc::now();

                ProductRepository::update_details(&mut tx, &product)
                    .await
                    .map_err(|e| product_write_error(e, &product))?;
                tx.commit().await.map_err(DbError::from)?;
                Ok(product)
            })
            .await?;

        info!(product_id = %product.id, name = %product.name, "Product updated");
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "product.update",
            format!("{} @ {}", product.name, product.sell_price()),
        ));
        Ok(product)
    }

    /// Returns the new flag.
    pub async fn toggle_favorite(&self, actor: &Actor, product_id: &str) -> PosResult<bool> {
        self.ctx.ensure_open()?;
        actor.require(Capability::EditProducts)?;

        let favorite = self
            .ctx
            .retry("toggle_favorite", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let favorite = ProductRepository::toggle_favorite(&mut tx, product_id)
                    .await
                    .map_err(|e| match e {
                        DbError::NotFound { .. } => {
                            PosError::from(CoreError::ProductNotFound(product_id.to_string()))
                        }
                        other => other.into(),
                    })?;
                tx.commit().await.map_err(DbError::from)?;
                Ok(favorite)
            })
            .await?;

        self.ctx.events.publish(PosEvent::audit(
            actor,
            "product.favorite",
            format!("{} favorite={}", product_id, favorite),
        ));
        Ok(favorite)
    }

    /// Retires a product. Its sales and stock moves keep referencing it;
    /// it drops out of search, barcode lookup and low-stock lists, and the
    /// till refuses it with `ProductArchived`.
    pub async fn archive_product(&self, actor: &Actor, product_id: &str) -> PosResult<Product> {
        self.set_archived(actor, product_id, true).await
    }

    /// Puts an archived product back on sale.
    pub async fn restore_product(&self, actor: &Actor, product_id: &str) -> PosResult<Product> {
        self.set_archived(actor, product_id, false).await
    }

    async fn set_archived(
        &self,
        actor: &Actor,
        product_id: &str,
        archived: bool,
    ) -> PosResult<Product> {
        self.ctx.ensure_open()?;
        actor.require(Capability::EditProducts)?;

        let operation = if archived { "archive_product" } else { "restore_product" };
        let product = self
            .ctx
            .retry(operation, move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let product = ProductRepository::set_archived(&mut tx, product_id, archived)
                    .await
                    .map_err(|e| match e {
                        DbError::NotFound { .. } => {
                            PosError::from(CoreError::ProductNotFound(product_id.to_string()))
                        }
                        other => other.into(),
                    })?;
                tx.commit().await.map_err(DbError::from)?;
                Ok(product)
            })
            .await?;

        info!(product_id = %product.id, archived, "Product archive flag changed");
        self.ctx.events.publish(PosEvent::audit(
            actor,
            if archived { "product.archive" } else { "product.restore" },
            product.name.clone(),
        ));
        Ok(product)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub async fn find_by_barcode(&self, barcode: &str) -> PosResult<Option<Product>> {
        match normalize_barcode(Some(barcode))? {
            Some(code) => Ok(self.ctx.db.products().get_by_barcode(&code).await?),
            None => Ok(None),
        }
    }

    pub async fn search(&self, query: &str, limit: u32) -> PosResult<Vec<Product>> {
        Ok(self.ctx.db.products().search(query, limit).await?)
    }

    pub async fn favorites(&self) -> PosResult<Vec<Product>> {
        Ok(self.ctx.db.products().list_favorites().await?)
    }

    pub async fn categories(&self) -> PosResult<Vec<Category>> {
        Ok(self.ctx.db.categories().list().await?)
    }
}

/// Constraint failures on a product row in domain terms.
fn product_write_error(err: DbError, product: &Product) -> PosError {
    match (&err, &product.category_id) {
        (DbError::ForeignKeyViolation { .. }, Some(category_id)) => {
            CoreError::CategoryNotFound(category_id.clone()).into()
        }
        _ => match &product.barcode {
            Some(code) => duplicate_on(err, "products.barcode", "barcode", code),
            None => err.into(),
        },
    }
}

fn duplicate_on(err: DbError, column: &str, field: &str, value: &str) -> PosError {
    if err.is_unique_violation_on(column) {
        ValidationError::Duplicate {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into()
    } else {
        err.into()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, cashier, open_shift, pos, product, warehouse};
    use kassa_core::{SaleLine, SaleRequest};

    #[tokio::test]
    async fn test_create_product_has_no_stock_move() {
        let (pos, sink) = pos().await;
        let dairy = pos.catalog().create_category(&warehouse(), "Sut mahsulotlari").await.unwrap();

        let kefir = pos
            .catalog()
            .create_product(
                &warehouse(),
                NewProduct::new("Kefir 1L", Money::from_som(12_000))
                    .with_buy_price(Money::from_som(9_000))
                    .with_stock(Quantity::from_units(30))
                    .with_barcode("4780001234567")
                    .in_category(&dairy.id),
            )
            .await
            .unwrap();
        assert_eq!(kefir.stock(), Quantity::from_units(30));
        assert_eq!(kefir.unit, "pcs");
        assert!(pos.stock().history(&kefir.id, 10).await.unwrap().is_empty());

        let found = pos.catalog().find_by_barcode("4780001234567").await.unwrap().unwrap();
        assert_eq!(found.id, kefir.id);

        pos.shutdown().await;
        let actions = sink.actions().await;
        assert!(actions.contains(&"category.create".to_string()));
        assert!(actions.contains(&"product.create".to_string()));
    }

    #[tokio::test]
    async fn test_duplicates_and_missing_category() {
        let (pos, _sink) = pos().await;
        pos.catalog()
            .create_product(&admin(), NewProduct::new("Cola", Money::from_som(8_000)).with_barcode("5449000000996"))
            .await
            .unwrap();

        let err = pos
            .catalog()
            .create_product(&admin(), NewProduct::new("Cola 2", Money::from_som(8_000)).with_barcode("5449000000996"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));

        let err = pos
            .catalog()
            .create_product(&admin(), NewProduct::new("Fanta", Money::from_som(8_000)).in_category("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::CategoryNotFound(_))));

        pos.catalog().create_category(&admin(), "Ichimliklar").await.unwrap();
        let err = pos.catalog().create_category(&admin(), "Ichimliklar").await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_stock() {
        let (pos, _sink) = pos().await;
        let bread = product(&pos, "Non", 10, 4_000).await;

        let updated = pos
            .catalog()
            .update_product(
                &admin(),
                &bread.id,
                ProductUpdate {
                    name: Some("Tandir non".into()),
                    sell_price: Some(Money::from_som(5_000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Tandir non");
        assert_eq!(updated.sell_price(), Money::from_som(5_000));
        assert_eq!(updated.stock(), Quantity::from_units(10));
        assert_eq!(updated.buy_price(), bread.buy_price());

        let err = pos
            .catalog()
            .update_product(&admin(), "missing", ProductUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ProductNotFound(_))));

        let err = pos
            .catalog()
            .update_product(&cashier(), &bread.id, ProductUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_toggle_favorite() {
        let (pos, _sink) = pos().await;
        let bread = product(&pos, "Non", 10, 4_000).await;

        assert!(pos.catalog().toggle_favorite(&admin(), &bread.id).await.unwrap());
        assert_eq!(pos.catalog().favorites().await.unwrap().len(), 1);
        assert!(!pos.catalog().toggle_favorite(&admin(), &bread.id).await.unwrap());

        let err = pos.catalog().toggle_favorite(&admin(), "missing").await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_archive_retires_product_but_keeps_history() {
        let (pos, sink) = pos().await;
        let tea = product(&pos, "Choy", 10, 15_000).await;
        open_shift(&pos, &cashier()).await;

        let sale = pos
            .sales()
            .create_sale(
                &cashier(),
                &SaleRequest::cash(vec![SaleLine::new(&tea.id, Quantity::from_units(2), tea.sell_price())]),
            )
            .await
            .unwrap();

        let err = pos.catalog().archive_product(&cashier(), &tea.id).await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::Forbidden { .. })));

        let archived = pos.catalog().archive_product(&admin(), &tea.id).await.unwrap();
        assert!(archived.is_archived);
        assert!(pos.catalog().search("Choy", 10).await.unwrap().is_empty());

        let err = pos
            .sales()
            .create_sale(
                &cashier(),
                &SaleRequest::cash(vec![SaleLine::new(&tea.id, Quantity::from_units(1), tea.sell_price())]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ProductArchived(_))));
        assert_eq!(err.code(), crate::ErrorCode::BusinessRule);

        // Earlier sales still refund onto the archived row.
        pos.sales().refund_sale(&admin(), &sale.sale.id).await.unwrap();
        let stored = pos.database().products().get_by_id(&tea.id).await.unwrap().unwrap();
        assert_eq!(stored.stock(), Quantity::from_units(10));
        assert_eq!(pos.stock().history(&tea.id, 10).await.unwrap().len(), 2);

        let restored = pos.catalog().restore_product(&admin(), &tea.id).await.unwrap();
        assert!(!restored.is_archived);
        assert_eq!(pos.catalog().search("Choy", 10).await.unwrap().len(), 1);

        let err = pos.catalog().archive_product(&admin(), "missing").await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ProductNotFound(_))));

        pos.shutdown().await;
        let actions = sink.actions().await;
        assert!(actions.contains(&"product.archive".to_string()));
        assert!(actions.contains(&"product.restore".to_string()));
    }
}
