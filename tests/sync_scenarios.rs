use feed_mirror::market::{Applied, FeedMessage, TableMessage, Timeframe};
use feed_mirror::market::message::records_from;
use feed_mirror::{Mirror, MirrorConfig, MirrorError};
use serde_json::{Value, json};

fn mirror() -> Mirror {
    Mirror::new(MirrorConfig::default()).expect("default config is valid")
}

fn send(mirror: &Mirror, frame: Value) -> Result<Option<Applied>, MirrorError> {
    mirror.apply_json(&frame.to_string())
}

#[test]
fn test_trade_snapshot_returned_in_order() {
    let mirror = mirror();
    send(&mirror, json!({
        "table": "trade", "action": "partial", "keys": [],
        "data": [{"price": 100, "size": 1}, {"price": 101, "size": 2}]
    }))
    .unwrap();

    let trades = mirror.recent_trades().unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0]["price"], json!(100));
    assert_eq!(trades[1]["price"], json!(101));
}

#[test]
fn test_filled_order_leaves_table() {
    let mirror = mirror();
    send(&mirror, json!({
        "table": "order", "action": "partial", "keys": ["orderID"],
        "data": [{"orderID": "A1", "clOrdID": "mm_A1", "leavesQty": 5, "price": 100}]
    }))
    .unwrap();
    assert_eq!(mirror.open_orders("mm_").unwrap().len(), 1);

    let applied = send(&mirror, json!({
        "table": "order", "action": "update",
        "data": [{"orderID": "A1", "leavesQty": 0}]
    }))
    .unwrap();

    assert_eq!(applied, Some(Applied::Updated { rows: 1, evicted: 1 }));
    assert!(mirror.all_orders().unwrap().is_empty());
    assert!(mirror.open_orders("mm_").unwrap().is_empty());
}

#[test]
fn test_ticker_from_quote_and_trade() {
    let mirror = mirror();
    send(&mirror, json!({
        "table": "instrument", "action": "partial", "keys": ["symbol"],
        "data": [{"symbol": "X", "tickSize": 0.5}]
    }))
    .unwrap();
    send(&mirror, json!({
        "table": "quote", "action": "partial", "keys": ["symbol"],
        "data": [{"symbol": "X", "bidPrice": 100, "askPrice": 102}]
    }))
    .unwrap();
    send(&mirror, json!({
        "table": "trade", "action": "partial", "keys": [],
        "data": [{"symbol": "X", "price": 101}]
    }))
    .unwrap();

    let ticker = mirror.get_ticker().unwrap();
    assert_eq!(ticker.last, 101.0);
    assert_eq!(ticker.bid, 100.0);
    assert_eq!(ticker.ask, 102.0);
    assert_eq!(ticker.mid, 101.0);
    assert_eq!(mirror.get_instrument().unwrap().tick_log, 0);
}

#[test]
fn test_bounded_table_keeps_newest() {
    let mirror = mirror();
    let max = mirror.config().max_table_len;
    send(&mirror, json!({"table": "trade", "action": "partial", "keys": [], "data": []})).unwrap();

    for i in 0..150 {
        send(&mirror, json!({"table": "trade", "action": "insert", "data": [{"seq": i}]})).unwrap();
    }
    assert_eq!(mirror.recent_trades().unwrap().len(), 150);

    for i in 150..210 {
        send(&mirror, json!({"table": "trade", "action": "insert", "data": [{"seq": i}]})).unwrap();
    }
    let trades = mirror.recent_trades().unwrap();
    assert!(trades.len() <= max);

    let seqs: Vec<i64> = trades.iter().map(|t| t["seq"].as_i64().unwrap()).collect();
    let newest: Vec<i64> = (210 - seqs.len() as i64..210).collect();
    assert_eq!(seqs, newest);
}

#[test]
fn test_unmatched_update_aborts_rest_of_message() {
    let mirror = mirror();
    send(&mirror, json!({
        "table": "orderBookL2", "action": "partial", "keys": ["symbol", "id", "side"],
        "data": [
            {"symbol": "X", "id": 1, "side": "Buy", "size": 10},
            {"symbol": "X", "id": 2, "side": "Sell", "size": 20}
        ]
    }))
    .unwrap();
    send(&mirror, json!({
        "table": "quote", "action": "partial", "keys": ["symbol"],
        "data": [{"symbol": "X", "bidPrice": 1, "askPrice": 2}]
    }))
    .unwrap();

    let result = send(&mirror, json!({
        "table": "orderBookL2", "action": "update",
        "data": [
            {"symbol": "X", "id": 1, "side": "Buy", "size": 11},
            {"symbol": "X", "id": 99, "side": "Buy", "size": 1},
            {"symbol": "X", "id": 2, "side": "Sell", "size": 21}
        ]
    }));
    assert!(matches!(
        result,
        Err(MirrorError::ConsistencyMiss { applied: 1, total: 3, .. })
    ));

    let depth = mirror.market_depth().unwrap();
    assert_eq!(depth[0]["size"], json!(11));
    assert_eq!(depth[1]["size"], json!(20));
    assert_eq!(mirror.tables()["quote"].len(), 1);
}

#[test]
fn test_mutations_before_snapshot_are_ignored() {
    let mirror = mirror();
    let applied = send(&mirror, json!({
        "table": "quote", "action": "insert",
        "data": [{"symbol": "X", "bidPrice": 1}]
    }))
    .unwrap();
    assert_eq!(applied, Some(Applied::Skipped));
    assert!(matches!(mirror.get_ticker(), Err(MirrorError::NotReady(_))));
    assert!(!mirror.tables().contains_key("quote"));
    assert_eq!(mirror.stats()["quote"].messages, 1);
}

#[test]
fn test_delete_removes_level() {
    let mirror = mirror();
    mirror
        .apply(FeedMessage::from(TableMessage::partial(
            "orderBookL2",
            ["symbol", "id", "side"],
            records_from(json!([
                {"symbol": "X", "id": 1, "side": "Buy", "price": 10},
                {"symbol": "X", "id": 2, "side": "Buy", "price": 9}
            ])),
        )))
        .unwrap();
    mirror
        .apply(
            TableMessage::delete(
                "orderBookL2",
                records_from(json!([{"symbol": "X", "id": 1, "side": "Buy"}])),
            )
            .into(),
        )
        .unwrap();

    let depth = mirror.market_depth().unwrap();
    assert_eq!(depth.len(), 1);
    assert_eq!(depth[0]["id"], json!(2));
}

#[test]
fn test_order_book_is_not_bounded() {
    let mirror = Mirror::new(MirrorConfig::default().with_max_table_len(10)).unwrap();
    let levels: Vec<Value> = (0..25)
        .map(|id| json!({"symbol": "X", "id": id, "side": "Sell", "size": 1}))
        .collect();
    send(&mirror, json!({
        "table": "orderBookL2", "action": "partial", "keys": ["symbol", "id", "side"], "data": []
    }))
    .unwrap();
    send(&mirror, json!({"table": "orderBookL2", "action": "insert", "data": levels})).unwrap();

    assert_eq!(mirror.market_depth().unwrap().len(), 25);
}

#[test]
fn test_ohlcv_bins() {
    let mirror = mirror();
    assert!(matches!(mirror.get_ohlcv(Timeframe::M5), Err(MirrorError::NotReady(_))));

    send(&mirror, json!({
        "table": "tradeBin5m", "action": "partial", "keys": [],
        "data": [{"timestamp": "2024-01-01T00:05:00.000Z", "symbol": "X",
                  "open": 10, "high": 12, "low": 9, "close": 11, "volume": 100}]
    }))
    .unwrap();

    assert_eq!(mirror.get_ohlcv(Timeframe::M5).unwrap().len(), 1);
    let candles = mirror.ohlcv_candles(Timeframe::M5).unwrap();
    assert_eq!(candles[0].get_high(), 12.0);
    assert_eq!(candles[0].get_volume(), 100.0);
}
