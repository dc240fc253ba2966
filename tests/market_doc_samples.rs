use feed_mirror::market::{Action, FeedMessage, Timeframe};
use feed_mirror::{Mirror, MirrorConfig, MirrorError};
use serde_json::json;

#[test]
fn test_bitmex_welcome_sample_from_docs() {
    let msg = r#"{"info":"Welcome to the BitMEX Realtime API.","version":"2.0.0","timestamp":"2024-01-01T00:00:00.000Z","docs":"https://www.bitmex.com/app/wsAPI","limit":{"remaining":39}}"#;
    let parsed = FeedMessage::from_json(msg).expect("BitMEX welcome sample should parse");

    assert_eq!(parsed, FeedMessage::Info("Welcome to the BitMEX Realtime API.".to_string()));
}

#[test]
fn test_bitmex_subscribe_ack_sample_from_docs() {
    let msg = r#"{"success":true,"subscribe":"trade:XBTUSD","request":{"op":"subscribe","args":["trade:XBTUSD"]}}"#;
    let parsed = FeedMessage::from_json(msg).expect("BitMEX subscribe ack should parse");

    assert_eq!(
        parsed,
        FeedMessage::Subscribed {
            topic: "trade:XBTUSD".to_string(),
            success: true
        }
    );
}

#[test]
fn test_bitmex_error_sample_from_docs() {
    let msg = r#"{"status":400,"error":"Unknown table: trad","meta":{},"request":{"op":"subscribe","args":["trad:XBTUSD"]}}"#;
    let parsed = FeedMessage::from_json(msg).expect("BitMEX error sample should parse");

    assert_eq!(parsed, FeedMessage::Error("Unknown table: trad".to_string()));
}

#[test]
fn test_bitmex_trade_partial_sample_from_docs() {
    let msg = r#"{"table":"trade","action":"partial","keys":[],"types":{"timestamp":"timestamp","symbol":"symbol","side":"symbol","size":"long","price":"float"},"foreignKeys":{"symbol":"instrument","side":"side"},"attributes":{"timestamp":"sorted","symbol":"grouped"},"filter":{"symbol":"XBTUSD"},"data":[{"timestamp":"2024-01-01T00:00:00.123Z","symbol":"XBTUSD","side":"Buy","size":100,"price":42000.5,"tickDirection":"PlusTick","trdMatchID":"0f1b6c2e-52b8-4c36-86a8-3a1a0c4f2d11","grossValue":238095,"homeNotional":0.00238095,"foreignNotional":100}]}"#;
    let parsed = FeedMessage::from_json(msg).expect("BitMEX trade partial should parse");
    let table = parsed.as_table().expect("should be a table message");

    assert_eq!(table.table, "trade");
    assert_eq!(table.action, Action::Partial);
    assert!(table.keys.is_empty());
    assert_eq!(table.data[0]["side"], "Buy");
}

#[test]
fn test_bitmex_order_book_update_sample_from_docs() {
    let msg = r#"{"table":"orderBookL2","action":"update","data":[{"symbol":"XBTUSD","id":8799580000,"side":"Sell","size":2500,"timestamp":"2024-01-01T00:00:01.000Z"}]}"#;
    let parsed = FeedMessage::from_json(msg).expect("BitMEX order book update should parse");
    let table = parsed.as_table().expect("should be a table message");

    assert_eq!(table.action, Action::Update);
    assert_eq!(table.data[0]["id"], json!(8799580000u64));
}

#[test]
fn test_bitmex_unknown_action_is_rejected() {
    let msg = r#"{"table":"trade","action":"upsert","data":[]}"#;
    assert!(matches!(
        FeedMessage::from_json(msg),
        Err(MirrorError::UnknownAction { action, .. }) if action == "upsert"
    ));
}

#[test]
fn test_bitmex_trade_bin_samples_feed_the_mirror() {
    let mirror = Mirror::new(MirrorConfig::default()).unwrap();
    let partial = r#"{"table":"tradeBin1m","action":"partial","keys":[],"data":[{"timestamp":"2024-01-01T00:01:00.000Z","symbol":"XBTUSD","open":42000,"high":42010.5,"low":41990,"close":42005,"trades":12,"volume":3400,"vwap":42001.2}]}"#;
    let insert = r#"{"table":"tradeBin1m","action":"insert","data":[{"timestamp":"2024-01-01T00:02:00.000Z","symbol":"XBTUSD","open":42005,"high":42020,"low":42000,"close":42015,"trades":8,"volume":1200,"vwap":42010.1}]}"#;

    mirror.apply_json(partial).unwrap();
    mirror.apply_json(insert).unwrap();

    let candles = mirror.ohlcv_candles(Timeframe::M1).unwrap();
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].get_timestamp(), 1_704_067_260_000);
    assert_eq!(candles[1].get_close(), 42015.0);
}
