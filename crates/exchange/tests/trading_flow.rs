//! Integration test: placement -> matching -> settlement -> events
//!
//! Runs the whole service on in-memory adapters and checks balances,
//! order records and depth after settlement has gone idle.

use std::sync::Arc;

use bourse_clock::ManualClock;
use bourse_core::{BalanceKey, OrderStatus, Side, Symbol, Trade, TradeKey, TradeSettled, UserId};
use bourse_exchange::{Exchange, ExchangeComponents, ExchangeError, PlaceOrder};
use bourse_ledger::{InMemoryFundsLedger, InMemoryOrderStore};
use bourse_ports::{BookError, LedgerError, StorageError, TradeJournal};
use bourse_settlement::{ChannelEventSink, InMemoryTradeJournal, OverflowPolicy, SettlementConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

fn start_with(journal: Arc<dyn TradeJournal>) -> (Exchange, Receiver<TradeSettled>) {
    let _ = env_logger::try_init();

    let (sink, events) = ChannelEventSink::new(1024, OverflowPolicy::DropNewest);
    let exchange = Exchange::with_components(ExchangeComponents {
        ledger: Arc::new(InMemoryFundsLedger::new()),
        orders: Arc::new(InMemoryOrderStore::new()),
        journal,
        events: Arc::new(sink),
        clock: Arc::new(ManualClock::new()),
        settlement: SettlementConfig::default().with_backoff(1, 5),
    });
    (exchange, events)
}

fn start() -> (Exchange, Receiver<TradeSettled>) {
    start_with(Arc::new(InMemoryTradeJournal::new()))
}

async fn funded(exchange: &Exchange, deposits: &[(&str, Decimal)]) -> UserId {
    let user = Uuid::new_v4();
    for (asset, amount) in deposits {
        exchange.deposit(user, asset, *amount).await.unwrap();
    }
    user
}

/// (available, locked) for one asset, zero if never touched
async fn holding(exchange: &Exchange, user: UserId, asset: &str) -> (Decimal, Decimal) {
    exchange
        .balances(user)
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.asset == asset)
        .map(|b| (b.available, b.locked))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

#[tokio::test]
async fn test_two_bids_swept_by_one_ask() {
    let (exchange, _events) = start();
    let alice = funded(&exchange, &[("USD", dec!(100))]).await;
    let bob = funded(&exchange, &[("USD", dec!(200))]).await;
    let carol = funded(&exchange, &[("BTC", dec!(1.5))]).await;

    let first = exchange
        .place_order(PlaceOrder::limit(alice, "btc-usd", Side::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();
    let second = exchange
        .place_order(PlaceOrder::limit(bob, "BTC-USD", Side::Buy, dec!(100), dec!(2)))
        .await
        .unwrap();
    assert!(first.trades.is_empty() && second.trades.is_empty());

    let sell = exchange
        .place_order(PlaceOrder::limit(carol, "BTC-USD", Side::Sell, dec!(99), dec!(1.5)))
        .await
        .unwrap();

    let fills: Vec<(Uuid, Decimal, Decimal)> = sell
        .trades
        .iter()
        .map(|t| (t.maker_order_id, t.quantity, t.price))
        .collect();
    assert_eq!(
        fills,
        vec![
            (first.order.id, dec!(1), dec!(100)),
            (second.order.id, dec!(0.5), dec!(100)),
        ]
    );

    let depth = exchange.depth("BTC-USD").unwrap();
    assert_eq!(depth.bids.len(), 1);
    assert_eq!(depth.bids[0].price, dec!(100));
    assert_eq!(depth.bids[0].quantity, dec!(1.5));
    assert!(depth.asks.is_empty());

    exchange.wait_settled().await;

    assert_eq!(holding(&exchange, alice, "BTC").await, (dec!(1), dec!(0)));
    assert_eq!(holding(&exchange, alice, "USD").await, (dec!(0), dec!(0)));
    assert_eq!(holding(&exchange, bob, "BTC").await, (dec!(0.5), dec!(0)));
    assert_eq!(holding(&exchange, bob, "USD").await, (dec!(0), dec!(150)));
    assert_eq!(holding(&exchange, carol, "USD").await, (dec!(150), dec!(0)));
    assert_eq!(holding(&exchange, carol, "BTC").await, (dec!(0), dec!(0)));

    let alice_order = exchange.order(alice, first.order.id).await.unwrap();
    assert_eq!(alice_order.status, OrderStatus::Filled);
    let bob_order = exchange.order(bob, second.order.id).await.unwrap();
    assert_eq!(bob_order.status, OrderStatus::PartiallyFilled);
    assert_eq!(bob_order.remaining_quantity, dec!(1.5));
    let carol_order = exchange.order(carol, sell.order.id).await.unwrap();
    assert_eq!(carol_order.status, OrderStatus::Filled);

    assert_eq!(exchange.open_orders(bob).await.unwrap().len(), 1);
    assert!(exchange.open_orders(carol).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_releases_the_unfilled_reservation() {
    let (exchange, _events) = start();
    let bob = funded(&exchange, &[("USD", dec!(200))]).await;
    let carol = funded(&exchange, &[("BTC", dec!(0.5))]).await;

    let bid = exchange
        .place_order(PlaceOrder::limit(bob, "BTC-USD", Side::Buy, dec!(100), dec!(2)))
        .await
        .unwrap();
    exchange
        .place_order(PlaceOrder::limit(carol, "BTC-USD", Side::Sell, dec!(100), dec!(0.5)))
        .await
        .unwrap();
    exchange.wait_settled().await;

    // Someone else's order looks like it does not exist
    assert_eq!(
        exchange.cancel_order(carol, bid.order.id).await,
        Err(ExchangeError::NotFound(bid.order.id))
    );

    let cancelled = exchange.cancel_order(bob, bid.order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(holding(&exchange, bob, "USD").await, (dec!(150), dec!(0)));
    assert_eq!(holding(&exchange, bob, "BTC").await, (dec!(0.5), dec!(0)));
    assert!(exchange.depth("BTC-USD").unwrap().is_empty());

    let again = exchange.cancel_order(bob, bid.order.id).await.unwrap_err();
    assert!(matches!(again, ExchangeError::Validation(_)));
    assert!(exchange.open_orders(bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_of_unknown_order_leaves_book_unchanged() {
    let (exchange, _events) = start();
    let seller = funded(&exchange, &[("BTC", dec!(3))]).await;
    exchange
        .place_order(PlaceOrder::limit(seller, "BTC-USD", Side::Sell, dec!(101), dec!(3)))
        .await
        .unwrap();

    let before = exchange.depth("BTC-USD").unwrap();
    let missing = Uuid::new_v4();
    assert_eq!(
        exchange.cancel_order(seller, missing).await,
        Err(ExchangeError::NotFound(missing))
    );
    let after = exchange.depth("BTC-USD").unwrap();
    assert_eq!(before.asks, after.asks);
    assert_eq!(before.bids, after.bids);
}

#[tokio::test]
async fn test_buyer_keeps_price_improvement() {
    let (exchange, _events) = start();
    let seller = funded(&exchange, &[("BTC", dec!(1))]).await;
    let buyer = funded(&exchange, &[("USD", dec!(100))]).await;

    exchange
        .place_order(PlaceOrder::limit(seller, "BTC-USD", Side::Sell, dec!(90), dec!(1)))
        .await
        .unwrap();
    let bid = exchange
        .place_order(PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();
    assert_eq!(bid.trades[0].price, dec!(90));

    exchange.wait_settled().await;
    assert_eq!(holding(&exchange, buyer, "USD").await, (dec!(10), dec!(0)));
    assert_eq!(holding(&exchange, buyer, "BTC").await, (dec!(1), dec!(0)));
    assert_eq!(holding(&exchange, seller, "USD").await, (dec!(90), dec!(0)));
}

#[tokio::test]
async fn test_rejections_have_no_side_effects() {
    let (exchange, _events) = start();
    let buyer = funded(&exchange, &[("USD", dec!(50))]).await;

    let err = exchange
        .place_order(PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, dec!(100), dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::Ledger(LedgerError::InsufficientFunds { .. })
    ));
    assert!(err.is_rejection());
    assert_eq!(holding(&exchange, buyer, "USD").await, (dec!(50), dec!(0)));

    let err = exchange
        .place_order(PlaceOrder::market(buyer, "BTC-USD", Side::Buy, dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Unsupported(_)));

    for bad in [
        PlaceOrder::limit(buyer, "BTCUSD", Side::Buy, dec!(1), dec!(1)),
        PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, dec!(1), dec!(0)),
        PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, dec!(-1), dec!(1)),
    ] {
        let err = exchange.place_order(bad).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)), "{err:?}");
    }

    assert!(exchange.open_orders(buyer).await.unwrap().is_empty());
    assert_eq!(holding(&exchange, buyer, "USD").await, (dec!(50), dec!(0)));
    assert!(exchange.depth("BTC-USD").unwrap().is_empty());
}

#[tokio::test]
async fn test_events_are_published_in_match_order() {
    let (exchange, mut events) = start();
    let seller = funded(&exchange, &[("ETH", dec!(3))]).await;
    let buyer = funded(&exchange, &[("USD", dec!(1000))]).await;

    exchange
        .place_order(PlaceOrder::limit(seller, "ETH-USD", Side::Sell, dec!(100), dec!(1)))
        .await
        .unwrap();
    exchange
        .place_order(PlaceOrder::limit(seller, "ETH-USD", Side::Sell, dec!(110), dec!(2)))
        .await
        .unwrap();
    let bid = exchange
        .place_order(PlaceOrder::limit(buyer, "ETH-USD", Side::Buy, dec!(110), dec!(3)))
        .await
        .unwrap();
    exchange.wait_settled().await;

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!((first.sequence, first.price), (1, dec!(100)));
    assert_eq!((second.sequence, second.price), (2, dec!(110)));
    assert_eq!(first.taker_order_id, bid.order.id);
    assert_eq!(first.symbol, Symbol::parse("ETH-USD").unwrap());

    // 10 of price improvement on the first unit
    assert_eq!(holding(&exchange, buyer, "USD").await, (dec!(680), dec!(0)));
    assert_eq!(exchange.settlement_stats().settled, 2);
}

#[tokio::test]
async fn test_cancel_while_a_fill_is_still_settling() {
    let (exchange, _events) = start();
    let bob = funded(&exchange, &[("USD", dec!(200))]).await;
    let carol = funded(&exchange, &[("BTC", dec!(0.5))]).await;

    let bid = exchange
        .place_order(PlaceOrder::limit(bob, "BTC-USD", Side::Buy, dec!(100), dec!(2)))
        .await
        .unwrap();
    let sell = exchange
        .place_order(PlaceOrder::limit(carol, "BTC-USD", Side::Sell, dec!(100), dec!(0.5)))
        .await
        .unwrap();
    assert_eq!(sell.trades.len(), 1);
    assert_eq!(exchange.settlement_stats().settled, 0);

    // The matched 0.5 stays on the record until settlement drains it
    let cancelled = exchange.cancel_order(bob, bid.order.id).await.unwrap();
    assert_eq!(
        (cancelled.status, cancelled.remaining_quantity),
        (OrderStatus::Cancelled, dec!(0.5))
    );

    exchange.wait_settled().await;
    let settled = exchange.order(bob, bid.order.id).await.unwrap();
    assert_eq!(
        (settled.status, settled.remaining_quantity),
        (OrderStatus::Cancelled, dec!(0))
    );
    assert_eq!(holding(&exchange, bob, "USD").await, (dec!(150), dec!(0)));
    assert_eq!(holding(&exchange, bob, "BTC").await, (dec!(0.5), dec!(0)));
    assert_eq!(holding(&exchange, carol, "USD").await, (dec!(50), dec!(0)));
    assert!(exchange.blocked_trades().is_empty());
    assert!(exchange.reconciliation().is_empty());
    assert!(exchange.depth("BTC-USD").unwrap().is_empty());
}

#[tokio::test]
async fn test_order_history_keeps_terminal_orders() {
    let (exchange, _events) = start();
    let bob = funded(&exchange, &[("USD", dec!(300))]).await;
    let carol = funded(&exchange, &[("BTC", dec!(1))]).await;

    let filled = exchange
        .place_order(PlaceOrder::limit(bob, "BTC-USD", Side::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();
    let cancelled = exchange
        .place_order(PlaceOrder::limit(bob, "BTC-USD", Side::Buy, dec!(90), dec!(1)))
        .await
        .unwrap();
    let open = exchange
        .place_order(PlaceOrder::limit(bob, "ETH-USD", Side::Buy, dec!(10), dec!(1)))
        .await
        .unwrap();
    exchange
        .place_order(PlaceOrder::limit(carol, "BTC-USD", Side::Sell, dec!(100), dec!(1)))
        .await
        .unwrap();
    exchange.cancel_order(bob, cancelled.order.id).await.unwrap();
    exchange.wait_settled().await;

    let history: Vec<_> = exchange
        .orders(bob)
        .await
        .unwrap()
        .into_iter()
        .map(|o| (o.id, o.status))
        .collect();
    assert_eq!(
        history,
        vec![
            (filled.order.id, OrderStatus::Filled),
            (cancelled.order.id, OrderStatus::Cancelled),
            (open.order.id, OrderStatus::Open),
        ]
    );
    assert_eq!(exchange.open_orders(bob).await.unwrap().len(), 1);
    assert!(exchange.orders(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_amounts_are_rejected() {
    let (exchange, _events) = start();
    let buyer = funded(&exchange, &[("USD", dec!(100))]).await;

    // 1e20 * 1e10 does not fit a decimal
    let price = Decimal::from_i128_with_scale(10i128.pow(20), 0);
    let err = exchange
        .place_order(PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, price, dec!(10000000000)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Validation(_)), "{err:?}");
    assert!(err.is_rejection());
    assert!(exchange.orders(buyer).await.unwrap().is_empty());
    assert_eq!(holding(&exchange, buyer, "USD").await, (dec!(100), dec!(0)));
    assert!(exchange.depth("BTC-USD").unwrap().is_empty());

    let whale = funded(&exchange, &[("USD", Decimal::MAX)]).await;
    let err = exchange.deposit(whale, "USD", dec!(1)).await.unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::Ledger(LedgerError::Overflow { .. })
    ));
    assert!(err.is_rejection());
    assert_eq!(holding(&exchange, whale, "USD").await, (Decimal::MAX, dec!(0)));
}

#[tokio::test]
async fn test_settlement_overflow_blocks_only_that_trade() {
    let (exchange, _events) = start();
    let seller = funded(&exchange, &[("BTC", dec!(1)), ("USD", Decimal::MAX - dec!(50))]).await;
    let buyer = funded(&exchange, &[("USD", dec!(100))]).await;

    exchange
        .place_order(PlaceOrder::limit(seller, "BTC-USD", Side::Sell, dec!(100), dec!(1)))
        .await
        .unwrap();
    let bid = exchange
        .place_order(PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();
    assert_eq!(bid.trades.len(), 1);
    exchange.wait_settled().await;

    assert_eq!(exchange.blocked_trades().len(), 1);
    let issues = exchange.reconciliation().issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].balance, Some(BalanceKey::new(seller, "USD")));
    assert_eq!(holding(&exchange, buyer, "USD").await, (dec!(0), dec!(100)));
    assert_eq!(holding(&exchange, seller, "BTC").await, (dec!(0), dec!(1)));

    // Unrelated trading carries on
    let eth_seller = funded(&exchange, &[("ETH", dec!(1))]).await;
    let eth_buyer = funded(&exchange, &[("USD", dec!(10))]).await;
    exchange
        .place_order(PlaceOrder::limit(eth_seller, "ETH-USD", Side::Sell, dec!(10), dec!(1)))
        .await
        .unwrap();
    exchange
        .place_order(PlaceOrder::limit(eth_buyer, "ETH-USD", Side::Buy, dec!(10), dec!(1)))
        .await
        .unwrap();
    exchange.wait_settled().await;
    assert_eq!(exchange.settlement_stats().settled, 1);
    assert_eq!(holding(&exchange, eth_seller, "USD").await, (dec!(10), dec!(0)));
    assert_eq!(holding(&exchange, eth_buyer, "ETH").await, (dec!(1), dec!(0)));
}

/// Journal that refuses every append
struct BrokenJournal;

impl TradeJournal for BrokenJournal {
    fn append(&self, _trades: &[Trade]) -> Result<(), StorageError> {
        Err(StorageError::permanent("journal volume is read-only"))
    }

    fn mark_settled(&self, _key: &TradeKey) -> Result<(), StorageError> {
        Err(StorageError::permanent("journal volume is read-only"))
    }

    fn is_settled(&self, _key: &TradeKey) -> Result<bool, StorageError> {
        Ok(false)
    }

    fn unsettled(&self) -> Result<Vec<Trade>, StorageError> {
        Ok(Vec::new())
    }

    fn last_sequence(&self, _symbol: &Symbol) -> Result<u64, StorageError> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_unjournaled_match_halts_the_book() {
    let (exchange, _events) = start_with(Arc::new(BrokenJournal));
    let seller = funded(&exchange, &[("BTC", dec!(1))]).await;
    let buyer = funded(&exchange, &[("USD", dec!(300))]).await;

    exchange
        .place_order(PlaceOrder::limit(seller, "BTC-USD", Side::Sell, dec!(100), dec!(1)))
        .await
        .unwrap();
    let err = exchange
        .place_order(PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, dec!(100), dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Book(BookError::Storage(_))));
    assert_eq!(exchange.reconciliation().len(), 1);

    // Later orders are refused and their reservation returned
    let err = exchange
        .place_order(PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, dec!(100), dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Book(BookError::Halted(_))));
    assert_eq!(holding(&exchange, buyer, "USD").await, (dec!(200), dec!(100)));

    // Other books keep trading
    let eth_seller = funded(&exchange, &[("ETH", dec!(1))]).await;
    exchange
        .place_order(PlaceOrder::limit(eth_seller, "ETH-USD", Side::Sell, dec!(10), dec!(1)))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_trading_conserves_funds() {
    let (exchange, _events) = start();
    let exchange = Arc::new(exchange);

    let mut sellers = Vec::new();
    let mut buyers = Vec::new();
    for _ in 0..20 {
        sellers.push(funded(&exchange, &[("BTC", dec!(1))]).await);
        buyers.push(funded(&exchange, &[("USD", dec!(100))]).await);
    }

    let mut tasks = Vec::new();
    for (seller, buyer) in sellers.iter().copied().zip(buyers.iter().copied()) {
        let ex = Arc::clone(&exchange);
        tasks.push(tokio::spawn(async move {
            ex.place_order(PlaceOrder::limit(seller, "BTC-USD", Side::Sell, dec!(100), dec!(1)))
                .await
        }));
        let ex = Arc::clone(&exchange);
        tasks.push(tokio::spawn(async move {
            ex.place_order(PlaceOrder::limit(buyer, "BTC-USD", Side::Buy, dec!(100), dec!(1)))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    exchange.wait_settled().await;

    assert!(exchange.depth("BTC-USD").unwrap().is_empty());
    for seller in &sellers {
        assert_eq!(holding(&exchange, *seller, "USD").await, (dec!(100), dec!(0)));
        assert_eq!(holding(&exchange, *seller, "BTC").await, (dec!(0), dec!(0)));
    }
    for buyer in &buyers {
        assert_eq!(holding(&exchange, *buyer, "BTC").await, (dec!(1), dec!(0)));
        assert_eq!(holding(&exchange, *buyer, "USD").await, (dec!(0), dec!(0)));
    }
    assert_eq!(exchange.settlement_stats().settled, 20);
    assert!(exchange.blocked_trades().is_empty());
}
