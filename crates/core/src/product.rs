//! # Product Module
//!
//! Định nghĩa Product - catalog entry quyết định tỷ lệ quy đổi và giới hạn
//! số tiền khi tạo order.

use crate::error::{CoreError, CoreResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Số tiền tối thiểu cho một order (yuan)
pub const MIN_ORDER_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Catalog entry cho recharge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Currency được credit khi mua product này
    pub currency: String,
    /// Số credits cho mỗi yuan
    pub credits_per_yuan: Decimal,
    pub min_amount_minor: i64,
    pub max_amount_minor: Option<i64>,
    pub enabled: bool,
    pub sort_order: i64,
}

impl Product {
    /// Kiểm tra số tiền (fen) nằm trong giới hạn của product
    pub fn check_amount(&self, amount_minor: i64) -> CoreResult<()> {
        if amount_minor < self.min_amount_minor {
            return Err(CoreError::AmountOutOfRange {
                amount_minor,
                min_minor: self.min_amount_minor,
                max_minor: self.max_amount_minor,
            });
        }
        if let Some(max) = self.max_amount_minor {
            if amount_minor > max {
                return Err(CoreError::AmountOutOfRange {
                    amount_minor,
                    min_minor: self.min_amount_minor,
                    max_minor: self.max_amount_minor,
                });
            }
        }
        Ok(())
    }
}

/// Parse số tiền yuan dạng chuỗi ("10", "10.5", "0.01").
///
/// Từ chối số âm, số không hợp lệ, và số nhỏ hơn 0.01.
pub fn parse_money(money: &str) -> CoreResult<Decimal> {
    let amount: Decimal = money
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidAmount(format!("not a number: {}", money)))?;

    if amount < MIN_ORDER_AMOUNT {
        return Err(CoreError::InvalidAmount(format!(
            "amount must be at least {}: {}",
            MIN_ORDER_AMOUNT, money
        )));
    }
    Ok(amount)
}

/// Yuan -> fen, làm tròn tới fen gần nhất.
pub fn to_minor_units(amount: Decimal) -> CoreResult<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|fen| fen.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|fen| fen.to_i64())
        .ok_or_else(|| CoreError::InvalidAmount(format!("amount out of range: {}", amount)))
}

/// Credits = floor(amount × rate).
pub fn credits_for(amount: Decimal, credits_per_yuan: Decimal) -> CoreResult<i64> {
    amount
        .checked_mul(credits_per_yuan)
        .map(|c| c.floor())
        .and_then(|c| c.to_i64())
        .ok_or_else(|| {
            CoreError::InvalidAmount(format!(
                "credits out of range: {} x {}",
                amount, credits_per_yuan
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(min: i64, max: Option<i64>) -> Product {
        Product {
            id: 1,
            name: "Gold".to_string(),
            description: None,
            currency: "gold".to_string(),
            credits_per_yuan: dec!(10),
            min_amount_minor: min,
            max_amount_minor: max,
            enabled: true,
            sort_order: 0,
        }
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("10").unwrap(), dec!(10));
        assert_eq!(parse_money(" 0.01 ").unwrap(), dec!(0.01));
        assert!(parse_money("0.001").is_err());
        assert!(parse_money("-5").is_err());
        assert!(parse_money("abc").is_err());
        assert!(parse_money("").is_err());
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(dec!(10.5)).unwrap(), 1050);
        assert_eq!(to_minor_units(dec!(0.015)).unwrap(), 2);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);

        // Decimal::MAX overflows the ×100, larger-than-i64 fen does not fit
        let huge = parse_money("79228162514264337593543950335").unwrap();
        assert!(matches!(to_minor_units(huge), Err(CoreError::InvalidAmount(_))));
        assert!(matches!(
            to_minor_units(dec!(100000000000000000000)),
            Err(CoreError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_credits_floor() {
        assert_eq!(credits_for(dec!(5), dec!(10)).unwrap(), 50);
        assert_eq!(credits_for(dec!(1.99), dec!(10)).unwrap(), 19);
        assert_eq!(credits_for(dec!(3), dec!(0.5)).unwrap(), 1);
    }

    #[test]
    fn test_check_amount_bounds() {
        let p = product(100, Some(10_000));
        assert!(p.check_amount(100).is_ok());
        assert!(p.check_amount(10_000).is_ok());
        assert!(matches!(
            p.check_amount(99),
            Err(CoreError::AmountOutOfRange { amount_minor: 99, .. })
        ));
        assert!(p.check_amount(10_001).is_err());

        let unbounded = product(0, None);
        assert!(unbounded.check_amount(i64::MAX).is_ok());
    }
}
