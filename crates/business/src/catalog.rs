//! Product catalog management

use crate::error::{BusinessError, BusinessResult};
use crate::services::ServiceContext;
use monetary_core::Product;
use rust_decimal::Decimal;

pub struct CatalogService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> CatalogService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Insert or replace a product
    pub async fn put(&self, product: &Product) -> BusinessResult<()> {
        if product.name.trim().is_empty() {
            return Err(BusinessError::InvalidRequest("product name is required".to_string()));
        }
        if product.currency.trim().is_empty() {
            return Err(BusinessError::InvalidRequest("product currency is required".to_string()));
        }
        if product.credits_per_yuan <= Decimal::ZERO {
            return Err(BusinessError::InvalidAmount(format!(
                "credits per yuan must be positive: {}",
                product.credits_per_yuan
            )));
        }
        if product.min_amount_minor < 0 {
            return Err(BusinessError::InvalidAmount(format!(
                "minimum amount must not be negative: {}",
                product.min_amount_minor
            )));
        }
        if let Some(max) = product.max_amount_minor {
            if max < product.min_amount_minor {
                return Err(BusinessError::InvalidAmount(format!(
                    "maximum {} below minimum {}",
                    max, product.min_amount_minor
                )));
            }
        }

        self.ctx
            .bounded("products.put", self.ctx.products().put_product(product))
            .await
    }

    pub async fn get(&self, id: i64) -> BusinessResult<Option<Product>> {
        self.ctx
            .bounded("products.get", self.ctx.products().get_product(id))
            .await
    }

    /// Enabled products by `sort_order`
    pub async fn list_enabled(&self) -> BusinessResult<Vec<Product>> {
        self.ctx
            .bounded("products.list", self.ctx.products().list_enabled())
            .await
    }
}
