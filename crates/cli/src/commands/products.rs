//! Product catalog: add, list

use anyhow::{Context, Result};
use monetary_business::CatalogService;
use monetary_core::{to_minor_units, Product};
use rust_decimal::Decimal;

use super::App;

/// Product fields as entered on the command line; limits in yuan
pub struct ProductInput {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub currency: String,
    pub rate: Decimal,
    pub min: Decimal,
    pub max: Option<Decimal>,
    pub disabled: bool,
    pub sort_order: i64,
}

impl ProductInput {
    fn into_product(self) -> Result<Product> {
        Ok(Product {
            id: self.id,
            name: self.name,
            description: self.description,
            currency: self.currency,
            credits_per_yuan: self.rate,
            min_amount_minor: to_minor_units(self.min).context("Invalid minimum amount")?,
            max_amount_minor: self
                .max
                .map(to_minor_units)
                .transpose()
                .context("Invalid maximum amount")?,
            enabled: !self.disabled,
            sort_order: self.sort_order,
        })
    }
}

pub async fn add(app: &App, input: ProductInput) -> Result<()> {
    let product = input.into_product()?;
    CatalogService::new(&app.ctx)
        .put(&product)
        .await
        .with_context(|| format!("Failed to save product {}", product.id))?;

    println!("✅ Product saved!");
    println!("   ID:       {}", product.id);
    println!("   Name:     {}", product.name);
    println!("   Currency: {}", product.currency);
    println!("   Rate:     {} per yuan", product.credits_per_yuan);
    println!("   Enabled:  {}", product.enabled);
    Ok(())
}

pub async fn list(app: &App) -> Result<()> {
    let products = CatalogService::new(&app.ctx)
        .list_enabled()
        .await
        .context("Failed to list products")?;

    if products.is_empty() {
        println!("No products found");
        return Ok(());
    }

    println!("{:<6} {:<24} {:<10} {:>10} {:>10} {:>10}", "ID", "Name", "Currency", "Rate", "Min", "Max");
    println!("{}", "-".repeat(76));
    for p in &products {
        let max = p
            .max_amount_minor
            .map(|m| Decimal::new(m, 2).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<24} {:<10} {:>10} {:>10} {:>10}",
            p.id,
            p.name,
            p.currency,
            p.credits_per_yuan,
            Decimal::new(p.min_amount_minor, 2),
            max
        );
    }
    Ok(())
}
