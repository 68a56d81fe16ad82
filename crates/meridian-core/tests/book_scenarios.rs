//! End-to-end book scenarios with exact event-sequence assertions.

use meridian_core::{
    flags, BookError, BookListener, OrderBook, OrderEvent, OrderId, OrderParams, Price, Quantity,
    Side, TimeInForce, Trade,
};

/// Records every callback in emission order.
#[derive(Default)]
struct Recorder {
    log: Vec<Event>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Event {
    Trade {
        buy: u64,
        sell: u64,
        price: u64,
        qty: u64,
    },
    Order {
        id: u64,
        event: OrderEvent,
        filled: u64,
        remaining: u64,
    },
}

impl BookListener for Recorder {
    fn on_trade(&mut self, trade: &Trade) {
        self.log.push(Event::Trade {
            buy: trade.buy_order_id.0,
            sell: trade.sell_order_id.0,
            price: trade.price.0,
            qty: trade.quantity.0,
        });
    }

    fn on_order_event(
        &mut self,
        order_id: OrderId,
        event: OrderEvent,
        filled: Quantity,
        remaining: Quantity,
    ) {
        self.log.push(Event::Order {
            id: order_id.0,
            event,
            filled: filled.0,
            remaining: remaining.0,
        });
    }
}

fn trade(buy: u64, sell: u64, price: u64, qty: u64) -> Event {
    Event::Trade {
        buy,
        sell,
        price,
        qty,
    }
}

fn order(id: u64, event: OrderEvent, filled: u64, remaining: u64) -> Event {
    Event::Order {
        id,
        event,
        filled,
        remaining,
    }
}

#[test]
fn scenario_simple_match() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(15000), Quantity(100), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Buy, Price(15000), Quantity(100), 2, &mut rec)
        .unwrap();

    assert_eq!(
        rec.log,
        vec![
            order(1, OrderEvent::Accepted, 0, 100),
            trade(2, 1, 15000, 100),
            order(1, OrderEvent::Filled, 100, 0),
            order(2, OrderEvent::Filled, 100, 0),
        ]
    );
    assert!(book.is_empty());
    assert_eq!(book.best_bid(), Price::ZERO);
    assert_eq!(book.best_ask(), Price::ZERO);
}

#[test]
fn scenario_ioc_partial() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(5_000_000), Quantity(50), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(5_010_000), Quantity(50), 2, &mut rec)
        .unwrap();
    rec.log.clear();

    book.add_order(
        OrderParams::limit(OrderId(3), Side::Buy, Price(5_010_000), Quantity(75))
            .with_tif(TimeInForce::Ioc),
        3,
        &mut rec,
    )
    .unwrap();

    assert_eq!(
        rec.log,
        vec![
            trade(3, 1, 5_000_000, 50),
            order(1, OrderEvent::Filled, 50, 0),
            trade(3, 2, 5_010_000, 25),
            order(2, OrderEvent::PartiallyFilled, 25, 25),
            order(3, OrderEvent::Cancelled, 75, 0),
        ]
    );

    // One ask level left at 5,010,000 with 25 remaining.
    assert_eq!(book.best_ask(), Price(5_010_000));
    assert_eq!(book.volume_at_price(Side::Sell, Price(5_010_000)), Quantity(25));
    assert_eq!(book.ask_level_count(), 1);
    assert!(!book.has_order(OrderId(3)));
}

#[test]
fn scenario_fok_reject_leaves_book_unchanged() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(10000), Quantity(40), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(10000), Quantity(20), 2, &mut rec)
        .unwrap();
    rec.log.clear();

    let result = book.add_order(
        OrderParams::limit(OrderId(3), Side::Buy, Price(10000), Quantity(100))
            .with_tif(TimeInForce::Fok),
        3,
        &mut rec,
    );

    assert_eq!(result, Err(BookError::CannotFill));
    assert_eq!(rec.log, vec![order(3, OrderEvent::Rejected, 0, 0)]);
    assert_eq!(book.volume_at_price(Side::Sell, Price(10000)), Quantity(60));
    assert_eq!(book.order_count(), 2);
}

#[test]
fn scenario_fok_exact_liquidity_fills() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(10000), Quantity(40), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(10000), Quantity(20), 2, &mut rec)
        .unwrap();
    rec.log.clear();

    book.add_order(
        OrderParams::limit(OrderId(3), Side::Buy, Price(10000), Quantity(60))
            .with_tif(TimeInForce::Fok),
        3,
        &mut rec,
    )
    .unwrap();

    assert_eq!(
        rec.log,
        vec![
            trade(3, 1, 10000, 40),
            order(1, OrderEvent::Filled, 40, 0),
            trade(3, 2, 10000, 20),
            order(2, OrderEvent::Filled, 20, 0),
            order(3, OrderEvent::Filled, 60, 0),
        ]
    );
    assert!(book.is_empty());
}

#[test]
fn scenario_post_only_accept() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(5_000_000), Quantity(100), 1, &mut rec)
        .unwrap();
    rec.log.clear();

    book.add_order(
        OrderParams::limit(OrderId(2), Side::Buy, Price(4_990_000), Quantity(50))
            .with_flags(flags::POST_ONLY),
        2,
        &mut rec,
    )
    .unwrap();

    assert_eq!(rec.log, vec![order(2, OrderEvent::Accepted, 0, 50)]);
    assert_eq!(book.best_bid(), Price(4_990_000));
}

#[test]
fn scenario_post_only_rejected_at_best() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(5_000_000), Quantity(100), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Buy, Price(4_990_000), Quantity(100), 2, &mut rec)
        .unwrap();
    rec.log.clear();

    // Buy at exactly best ask crosses; sell at exactly best bid crosses.
    assert_eq!(
        book.add_order(
            OrderParams::limit(OrderId(3), Side::Buy, Price(5_000_000), Quantity(10))
                .with_flags(flags::POST_ONLY),
            3,
            &mut rec,
        ),
        Err(BookError::WouldMatch)
    );
    assert_eq!(
        book.add_order(
            OrderParams::limit(OrderId(4), Side::Sell, Price(4_990_000), Quantity(10))
                .with_flags(flags::POST_ONLY),
            4,
            &mut rec,
        ),
        Err(BookError::WouldMatch)
    );
    assert_eq!(book.order_count(), 2);
}

#[test]
fn scenario_iceberg_refresh() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_order(
        OrderParams::limit(OrderId(1), Side::Sell, Price(5_000_000), Quantity(500))
            .with_display(Quantity(100)),
        1,
        &mut rec,
    )
    .unwrap();

    assert_eq!(book.volume_at_price(Side::Sell, Price(5_000_000)), Quantity(500));
    let visible = book.level_stats(Side::Sell, 1)[0].visible_volume;
    assert_eq!(visible, Quantity(100));
    rec.log.clear();

    // First 100 lot sweeps a display slice; the order stays with a new one.
    book.add_limit_order(OrderId(2), Side::Buy, Price(5_000_000), Quantity(100), 2, &mut rec)
        .unwrap();
    assert_eq!(
        rec.log,
        vec![
            trade(2, 1, 5_000_000, 100),
            order(1, OrderEvent::PartiallyFilled, 100, 400),
            order(2, OrderEvent::Filled, 100, 0),
        ]
    );
    assert_eq!(book.level_stats(Side::Sell, 1)[0].visible_volume, Quantity(100));
    rec.log.clear();

    // Second slice behaves identically.
    book.add_limit_order(OrderId(3), Side::Buy, Price(5_000_000), Quantity(100), 3, &mut rec)
        .unwrap();
    assert_eq!(
        rec.log,
        vec![
            trade(3, 1, 5_000_000, 100),
            order(1, OrderEvent::PartiallyFilled, 200, 300),
            order(3, OrderEvent::Filled, 100, 0),
        ]
    );
    assert_eq!(book.volume_at_price(Side::Sell, Price(5_000_000)), Quantity(300));
    assert_eq!(book.level_stats(Side::Sell, 1)[0].visible_volume, Quantity(100));
}

#[test]
fn scenario_iceberg_refresh_loses_priority() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    // Iceberg first in queue, vanilla order behind it.
    book.add_order(
        OrderParams::limit(OrderId(1), Side::Sell, Price(10000), Quantity(300))
            .with_display(Quantity(100)),
        1,
        &mut rec,
    )
    .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(10000), Quantity(50), 2, &mut rec)
        .unwrap();
    rec.log.clear();

    // Sweep the iceberg's visible slice; it requeues behind #2.
    book.add_limit_order(OrderId(3), Side::Buy, Price(10000), Quantity(100), 3, &mut rec)
        .unwrap();

    // Next aggressor hits #2 first.
    book.add_limit_order(OrderId(4), Side::Buy, Price(10000), Quantity(50), 4, &mut rec)
        .unwrap();
    assert!(rec.log.contains(&trade(4, 2, 10000, 50)));
    assert_eq!(book.volume_at_price(Side::Sell, Price(10000)), Quantity(200));
}

#[test]
fn scenario_modify_preserves_priority() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Buy, Price(4_950_000), Quantity(100), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Buy, Price(4_950_000), Quantity(100), 2, &mut rec)
        .unwrap();

    book.modify_order(OrderId(1), Quantity(50)).unwrap();
    assert_eq!(book.volume_at_price(Side::Buy, Price(4_950_000)), Quantity(150));
    rec.log.clear();

    book.add_limit_order(OrderId(3), Side::Sell, Price(4_950_000), Quantity(60), 3, &mut rec)
        .unwrap();

    assert_eq!(
        rec.log,
        vec![
            trade(1, 3, 4_950_000, 50),
            order(1, OrderEvent::Filled, 50, 0),
            trade(2, 3, 4_950_000, 10),
            order(2, OrderEvent::PartiallyFilled, 10, 90),
            order(3, OrderEvent::Filled, 60, 0),
        ]
    );
    assert_eq!(book.volume_at_price(Side::Buy, Price(4_950_000)), Quantity(90));
}

#[test]
fn scenario_modify_bound_checks() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Buy, Price(10000), Quantity(100), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(10000), Quantity(30), 2, &mut rec)
        .unwrap();

    // 30 filled; legal window is (30, 100) exclusive.
    assert_eq!(
        book.modify_order(OrderId(1), Quantity(100)),
        Err(BookError::InvalidQuantity)
    );
    assert_eq!(
        book.modify_order(OrderId(1), Quantity(30)),
        Err(BookError::InvalidQuantity)
    );
    assert_eq!(
        book.modify_order(OrderId(9), Quantity(50)),
        Err(BookError::OrderNotFound)
    );
    book.modify_order(OrderId(1), Quantity(50)).unwrap();
    assert_eq!(book.volume_at_price(Side::Buy, Price(10000)), Quantity(20));
}

#[test]
fn scenario_add_then_cancel_restores_empty_book() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Buy, Price(10000), Quantity(100), 1, &mut rec)
        .unwrap();
    book.cancel_order(OrderId(1), 2, &mut rec).unwrap();

    let stats = book.stats();
    assert_eq!(stats.total_orders, 0);
    assert_eq!(stats.bid_levels, 0);
    assert_eq!(stats.total_bid_volume, Quantity::ZERO);
    assert_eq!(stats.best_bid, Price::ZERO);
    assert!(book.is_empty());
}

#[test]
fn scenario_replace_loses_priority() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(10000), Quantity(50), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(10000), Quantity(50), 2, &mut rec)
        .unwrap();

    // Replace keeps the captured side and requeues at the tail.
    book.replace_order(OrderId(1), OrderId(10), Price(10000), Quantity(50), 3, &mut rec)
        .unwrap();

    rec.log.clear();
    book.add_limit_order(OrderId(3), Side::Buy, Price(10000), Quantity(50), 4, &mut rec)
        .unwrap();
    assert!(rec.log.contains(&trade(3, 2, 10000, 50)));
    assert!(book.has_order(OrderId(10)));
    assert!(!book.has_order(OrderId(1)));
}

#[test]
fn scenario_replace_duplicate_new_id_makes_no_change() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(10000), Quantity(50), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(10100), Quantity(50), 2, &mut rec)
        .unwrap();

    assert_eq!(
        book.replace_order(OrderId(1), OrderId(2), Price(10000), Quantity(50), 3, &mut rec),
        Err(BookError::DuplicateOrder)
    );
    // The old order survives an invalid replacement.
    assert!(book.has_order(OrderId(1)));
    assert_eq!(book.order_count(), 2);
}

#[test]
fn scenario_aon_full_fill_or_reject() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Sell, Price(10000), Quantity(60), 1, &mut rec)
        .unwrap();

    // AON beyond available liquidity rejects without touching the book.
    assert_eq!(
        book.add_order(
            OrderParams::limit(OrderId(2), Side::Buy, Price(10000), Quantity(100))
                .with_flags(flags::AON),
            2,
            &mut rec,
        ),
        Err(BookError::CannotFill)
    );
    assert_eq!(book.volume_at_price(Side::Sell, Price(10000)), Quantity(60));

    // AON within liquidity fills completely.
    book.add_order(
        OrderParams::limit(OrderId(3), Side::Buy, Price(10000), Quantity(60))
            .with_flags(flags::AON),
        3,
        &mut rec,
    )
    .unwrap();
    assert!(book.is_empty());
}

#[test]
fn scenario_stop_limit_triggered_by_trade() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_limit_order(OrderId(1), Side::Buy, Price(10000), Quantity(100), 1, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(10200), Quantity(100), 2, &mut rec)
        .unwrap();

    // Sell stop-limit below the current bid parks.
    book.add_order(
        OrderParams::stop_limit(OrderId(3), Side::Sell, Price(9900), Price(9800), Quantity(50)),
        3,
        &mut rec,
    )
    .unwrap();
    assert!(book.has_order(OrderId(3)));
    rec.log.clear();

    // Sweep the bid; the new best bid (none) keeps the stop parked, then a
    // lower bid arms it.
    book.add_limit_order(OrderId(4), Side::Sell, Price(10000), Quantity(100), 4, &mut rec)
        .unwrap();
    book.add_limit_order(OrderId(5), Side::Buy, Price(9850), Quantity(50), 5, &mut rec)
        .unwrap();

    // Stop converted to a limit at 9800 and crossed the 9850 bid.
    assert!(rec
        .log
        .iter()
        .any(|e| matches!(e, Event::Order { id: 3, event: OrderEvent::Triggered, .. })));
    assert!(rec.log.contains(&trade(5, 3, 9850, 50)));
    assert!(!book.has_order(OrderId(3)));
}

#[test]
fn scenario_conservation_across_matching() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    for i in 0..5u64 {
        book.add_limit_order(
            OrderId(i + 1),
            Side::Sell,
            Price(10000 + i * 100),
            Quantity(20),
            i,
            &mut rec,
        )
        .unwrap();
    }
    rec.log.clear();

    book.add_limit_order(OrderId(10), Side::Buy, Price(10400), Quantity(70), 9, &mut rec)
        .unwrap();

    let traded: u64 = rec
        .log
        .iter()
        .filter_map(|e| match e {
            Event::Trade { qty, .. } => Some(*qty),
            _ => None,
        })
        .sum();
    assert_eq!(traded, 70);

    let snapshot = book.order_snapshot(OrderId(4)).unwrap();
    assert_eq!(snapshot.filled_quantity, Quantity(10));
    assert_eq!(snapshot.remaining_quantity, Quantity(10));

    // Book is never crossed after the loop returns.
    assert!(book.best_bid().is_zero() || book.best_ask().is_zero() || book.best_bid() < book.best_ask());
}

#[test]
fn scenario_level_aggregates_stay_exact() {
    let mut book = OrderBook::new("AAPL");
    let mut rec = Recorder::default();

    book.add_order(
        OrderParams::limit(OrderId(1), Side::Sell, Price(10000), Quantity(300))
            .with_display(Quantity(100)),
        1,
        &mut rec,
    )
    .unwrap();
    book.add_limit_order(OrderId(2), Side::Sell, Price(10000), Quantity(80), 2, &mut rec)
        .unwrap();

    book.add_limit_order(OrderId(3), Side::Buy, Price(10000), Quantity(150), 3, &mut rec)
        .unwrap();

    // The whole 150 fills the iceberg at the head (display caps visibility,
    // not fill size): 150 remaining with a fresh 100 slice, #2 untouched.
    let stats = book.level_stats(Side::Sell, 1)[0];
    assert_eq!(stats.total_volume, Quantity(230));
    assert_eq!(stats.visible_volume, Quantity(180));
    assert_eq!(stats.order_count, 2);

    // The refreshed iceberg requeued behind #2.
    rec.log.clear();
    book.add_limit_order(OrderId(4), Side::Buy, Price(10000), Quantity(80), 4, &mut rec)
        .unwrap();
    assert!(rec.log.contains(&trade(4, 2, 10000, 80)));
}
