mod balance;
mod depth;
mod event;
mod order;
mod order_kind;
mod order_status;
mod side;
mod trade;

pub use balance::{Balance, BalanceError, BalanceKey};
pub use depth::{BookDepth, DepthLevel};
pub use event::TradeSettled;
pub use order::{Order, OrderId, checked_notional};
pub use order_kind::OrderKind;
pub use order_status::OrderStatus;
pub use side::Side;
pub use trade::{Trade, TradeKey};
