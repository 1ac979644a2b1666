use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrderKind, OrderStatus, Side};
use crate::values::{Asset, Price, Quantity, Symbol, Timestamp, UserId, ValidationError};

/// Unique identifier for an order
pub type OrderId = Uuid;

/// Full order details
///
/// The same shape is used for the durable order record and for the copy
/// resting in a book. The book copy tracks live remaining quantity; the
/// durable record only moves when a fill is settled or the order is
/// cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    /// Required for limit orders
    pub price: Option<Price>,
    /// Original quantity of base asset
    pub quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub status: OrderStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    /// Create a new limit order
    pub fn limit(
        owner: UserId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: Timestamp,
    ) -> Self {
        Self::with_kind(
            owner,
            symbol,
            side,
            OrderKind::Limit,
            Some(price),
            quantity,
            timestamp,
        )
    }

    /// Create a new market order
    pub fn market(
        owner: UserId,
        symbol: Symbol,
        side: Side,
        quantity: Quantity,
        timestamp: Timestamp,
    ) -> Self {
        Self::with_kind(
            owner,
            symbol,
            side,
            OrderKind::Market,
            None,
            quantity,
            timestamp,
        )
    }

    fn with_kind(
        owner: UserId,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        price: Option<Price>,
        quantity: Quantity,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            symbol,
            side,
            kind,
            price,
            quantity,
            remaining_quantity: quantity,
            status: OrderStatus::Open,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Check the fields a caller controls
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity <= Decimal::ZERO {
            return Err(ValidationError::new("quantity", "must be positive"));
        }
        if self.remaining_quantity < Decimal::ZERO || self.remaining_quantity > self.quantity {
            return Err(ValidationError::new(
                "remaining_quantity",
                format!(
                    "{} is outside 0..={}",
                    self.remaining_quantity, self.quantity
                ),
            ));
        }
        match (self.kind, self.price) {
            (OrderKind::Limit, None) => Err(ValidationError::new(
                "price",
                "required for limit orders",
            )),
            (_, Some(price)) if price <= Decimal::ZERO => {
                Err(ValidationError::new("price", "must be positive"))
            }
            (_, Some(price)) => checked_notional(price, self.quantity).map(|_| ()),
            _ => Ok(()),
        }
    }

    pub fn filled_quantity(&self) -> Quantity {
        self.quantity - self.remaining_quantity
    }

    /// Whether this order crosses a resting order at `resting_price`
    pub fn crosses(&self, resting_price: Price) -> bool {
        match (self.side, self.price) {
            (Side::Buy, Some(limit)) => limit >= resting_price,
            (Side::Sell, Some(limit)) => limit <= resting_price,
            (_, None) => false,
        }
    }

    /// Record an execution of `quantity`
    ///
    /// Status only moves forward: a cancelled order keeps its status while
    /// in-flight fills drain its residue.
    pub fn fill(&mut self, quantity: Quantity, at: Timestamp) -> Result<(), ValidationError> {
        if quantity <= Decimal::ZERO || quantity > self.remaining_quantity {
            return Err(ValidationError::new(
                "fill",
                format!(
                    "cannot fill {quantity} of order {} with {} remaining",
                    self.id, self.remaining_quantity
                ),
            ));
        }

        self.remaining_quantity -= quantity;
        self.updated_at = at;
        if !self.status.is_terminal() {
            self.status = if self.remaining_quantity.is_zero() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
        }
        Ok(())
    }

    /// Cancel `quantity` of the remainder and move to the terminal status
    pub fn cancel(&mut self, quantity: Quantity, at: Timestamp) -> Result<(), ValidationError> {
        if self.status.is_terminal() {
            return Err(ValidationError::new(
                "status",
                format!("order {} is already {:?}", self.id, self.status),
            ));
        }
        if quantity < Decimal::ZERO || quantity > self.remaining_quantity {
            return Err(ValidationError::new(
                "cancel",
                format!(
                    "cannot cancel {quantity} of order {} with {} remaining",
                    self.id, self.remaining_quantity
                ),
            ));
        }

        self.remaining_quantity -= quantity;
        self.status = OrderStatus::Cancelled;
        self.updated_at = at;
        Ok(())
    }

    /// Asset and amount that must stay locked to back `quantity` of this order
    ///
    /// Buys reserve quote at the limit price, sells reserve base. A market
    /// buy has no price to reserve against.
    pub fn reservation(&self, quantity: Quantity) -> Result<(Asset, Decimal), ValidationError> {
        match (self.side, self.price) {
            (Side::Buy, Some(price)) => Ok((
                self.symbol.quote().to_string(),
                checked_notional(price, quantity)?,
            )),
            (Side::Buy, None) => Err(ValidationError::new(
                "price",
                format!("buy order {} has no price to reserve against", self.id),
            )),
            (Side::Sell, _) => Ok((self.symbol.base().to_string(), quantity)),
        }
    }
}

/// `price * quantity`, or a validation error when it does not fit a `Decimal`
pub fn checked_notional(price: Price, quantity: Quantity) -> Result<Decimal, ValidationError> {
    price.checked_mul(quantity).ok_or_else(|| {
        ValidationError::new(
            "quantity",
            format!("{quantity} at {price} exceeds the representable notional"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn btc_usd() -> Symbol {
        Symbol::parse("BTC-USD").unwrap()
    }

    #[test]
    fn test_limit_order_starts_open() {
        let order = Order::limit(
            Uuid::new_v4(),
            btc_usd(),
            Side::Buy,
            dec!(100),
            dec!(2),
            Utc::now(),
        );
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.remaining_quantity, dec!(2));
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let now = Utc::now();
        let mut order = Order::limit(Uuid::new_v4(), btc_usd(), Side::Buy, dec!(100), dec!(0), now);
        order.remaining_quantity = dec!(0);
        assert_eq!(order.validate().unwrap_err().field, "quantity");

        let order = Order::limit(Uuid::new_v4(), btc_usd(), Side::Sell, dec!(-1), dec!(1), now);
        assert_eq!(order.validate().unwrap_err().field, "price");

        let mut order = Order::limit(Uuid::new_v4(), btc_usd(), Side::Sell, dec!(1), dec!(1), now);
        order.price = None;
        assert_eq!(order.validate().unwrap_err().field, "price");

        let order = Order::market(Uuid::new_v4(), btc_usd(), Side::Sell, dec!(1), now);
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_fill_moves_status_forward() {
        let now = Utc::now();
        let mut order = Order::limit(Uuid::new_v4(), btc_usd(), Side::Sell, dec!(10), dec!(3), now);

        order.fill(dec!(1), now).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity(), dec!(1));

        order.fill(dec!(2), now).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.fill(dec!(0.1), now).is_err());
    }

    #[test]
    fn test_cancelled_order_stays_cancelled_while_residue_drains() {
        let now = Utc::now();
        let mut order = Order::limit(Uuid::new_v4(), btc_usd(), Side::Buy, dec!(10), dec!(5), now);

        // 2 matched but unsettled, 3 still resting when cancelled
        order.cancel(dec!(3), now).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.remaining_quantity, dec!(2));

        order.fill(dec!(2), now).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.remaining_quantity.is_zero());
        assert!(order.cancel(dec!(0), now).is_err());
    }

    #[test]
    fn test_crosses() {
        let now = Utc::now();
        let buy = Order::limit(Uuid::new_v4(), btc_usd(), Side::Buy, dec!(100), dec!(1), now);
        assert!(buy.crosses(dec!(99)));
        assert!(buy.crosses(dec!(100)));
        assert!(!buy.crosses(dec!(101)));

        let sell = Order::limit(Uuid::new_v4(), btc_usd(), Side::Sell, dec!(100), dec!(1), now);
        assert!(sell.crosses(dec!(101)));
        assert!(!sell.crosses(dec!(99)));
    }

    #[test]
    fn test_reservation() {
        let now = Utc::now();
        let buy = Order::limit(Uuid::new_v4(), btc_usd(), Side::Buy, dec!(100), dec!(2), now);
        assert_eq!(buy.reservation(dec!(2)), Ok(("USD".to_string(), dec!(200))));

        let sell = Order::limit(Uuid::new_v4(), btc_usd(), Side::Sell, dec!(100), dec!(2), now);
        assert_eq!(sell.reservation(dec!(1.5)), Ok(("BTC".to_string(), dec!(1.5))));

        let market_buy = Order::market(Uuid::new_v4(), btc_usd(), Side::Buy, dec!(2), now);
        assert_eq!(market_buy.reservation(dec!(2)).unwrap_err().field, "price");
    }

    #[test]
    fn test_notional_overflow_is_rejected() {
        let now = Utc::now();
        let huge = dec!(100000000000000000000);
        let buy = Order::limit(Uuid::new_v4(), btc_usd(), Side::Buy, huge, dec!(10000000000), now);
        assert_eq!(buy.validate().unwrap_err().field, "quantity");
        assert!(buy.reservation(buy.quantity).is_err());

        let sell = Order::limit(Uuid::new_v4(), btc_usd(), Side::Sell, huge, dec!(10000000000), now);
        assert!(sell.validate().is_err());
    }
}
