//! Ledger operations: balance, credit, debit, transfer, query

use anyhow::{Context, Result};
use monetary_business::{LedgerService, OrderPipeline};
use monetary_core::AccountRef;

use super::App;

pub async fn balance(app: &App, account: &AccountRef, currency: &str) -> Result<()> {
    let value = LedgerService::new(&app.ctx)
        .get_balance(account, currency)
        .await
        .with_context(|| format!("Failed to read balance of {}", account))?;

    println!("💰 {} {} {}", account, value, currency);
    Ok(())
}

pub async fn credit(app: &App, account: &AccountRef, amount: i64, currency: &str) -> Result<()> {
    let value = LedgerService::new(&app.ctx)
        .credit(account, amount, currency)
        .await
        .with_context(|| format!("Failed to credit {}", account))?;

    println!("✅ Credit successful!");
    println!("   Account: {}", account);
    println!("   Amount:  {} {}", amount, currency);
    println!("   Balance: {}", value);
    Ok(())
}

pub async fn debit(app: &App, account: &AccountRef, amount: i64, currency: &str) -> Result<()> {
    let value = LedgerService::new(&app.ctx)
        .debit(account, amount, currency)
        .await
        .with_context(|| format!("Failed to debit {}", account))?;

    println!("✅ Debit successful!");
    println!("   Account: {}", account);
    println!("   Amount:  {} {}", amount, currency);
    println!("   Balance: {}", value);
    Ok(())
}

pub async fn transfer(app: &App, from: &AccountRef, to: &AccountRef, amount: i64, currency: &str) -> Result<()> {
    let receipt = LedgerService::new(&app.ctx)
        .transfer(from, to, amount, currency)
        .await
        .with_context(|| format!("Failed to transfer from {} to {}", from, to))?;

    println!("✅ Transfer successful!");
    println!("   Amount: {} {}", amount, currency);
    println!("   From:   {} (remaining {})", from, receipt.from_remaining);
    println!("   To:     {} (balance {})", to, receipt.to_balance);
    Ok(())
}

/// Balance and recent orders of an identifier
pub async fn query(app: &App, user_id: &str) -> Result<()> {
    let summary = OrderPipeline::new(&app.ctx, &app.gateway)
        .query_user(user_id)
        .await
        .with_context(|| format!("Failed to query {}", user_id))?;

    println!("👤 {}", summary.user_id);
    println!("   Balance: {}", summary.balance);
    if summary.orders.is_empty() {
        println!("   No orders");
    }
    for order in &summary.orders {
        println!(
            "   {}  {}  {} yuan  {} {}  {}",
            order.out_trade_no,
            order.created_at.format("%Y-%m-%d %H:%M:%S"),
            order.amount(),
            order.credits,
            order.currency,
            order.status
        );
    }
    Ok(())
}
