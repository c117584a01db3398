use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use zhanggui_core::common::time::FakeClockProvider;
use zhanggui_core::market::entity::TickQuote;
use zhanggui_core::market::port::QuoteBatch;
use zhanggui_core::trade::entity::{AccountId, OrderStatus, TradeSide};
use zhanggui_core::trade::port::{OrderRequest, TickSink, TradeError, TradePort};
use zhanggui_trade::account::Ledger;
use zhanggui_trade::service::PaperTradeService;
use zhanggui_store::account::JsonAccountStore;

const CODE: &str = "430017.BJ";

fn tick(last: Decimal, ask1: Decimal, bid1: Decimal) -> TickQuote {
    TickQuote {
        time: 1_744_767_365_000,
        last_price: last,
        open: dec!(15.30),
        high: dec!(15.88),
        low: dec!(15.25),
        prev_close: dec!(15.31),
        amount: dec!(82508100.0),
        volume: 20528,
        ask_price: vec![ask1, ask1 + dec!(0.05), ask1 + dec!(0.10), ask1 + dec!(0.15), ask1 + dec!(0.20)],
        bid_price: vec![bid1, bid1 - dec!(0.05), bid1 - dec!(0.10), bid1 - dec!(0.15), bid1 - dec!(0.20)],
        ask_vol: vec![12, 1, 14, 33, 4],
        bid_vol: vec![19, 5, 33, 10, 10],
    }
}

fn batch(quote: TickQuote) -> QuoteBatch {
    let mut ticks = HashMap::new();
    ticks.insert(CODE.to_string(), quote);
    ticks
}

async fn service(initial_cash: Decimal, dir: &std::path::Path) -> PaperTradeService {
    let store = Arc::new(JsonAccountStore::new(dir).expect("store init"));
    let clock = Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 45, 0).single().unwrap(),
    ));
    let ledger = Arc::new(
        Ledger::open(AccountId("sim_test".to_string()), initial_cash, store, clock.clone()).await,
    );
    PaperTradeService::new(ledger, dec!(0.0005), clock)
}

fn buy(quantity: i64, price: Decimal) -> OrderRequest {
    OrderRequest {
        code: CODE.to_string(),
        side: TradeSide::Buy,
        quantity,
        price: Some(price),
        remark: "test_buy".to_string(),
    }
}

fn sell(quantity: i64, price: Decimal) -> OrderRequest {
    OrderRequest {
        code: CODE.to_string(),
        side: TradeSide::Sell,
        quantity,
        price: Some(price),
        remark: "test_sell".to_string(),
    }
}

#[tokio::test]
async fn test_buy_crossing_fills_at_best_ask() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(1000000), dir.path()).await;

    // 卖一 15.55：限价 15.60 穿越，以较低的 15.55 成交
    svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();
    svc.submit_order(buy(1000, dec!(15.60))).await.unwrap();

    assert!(svc.pending_orders().await.is_empty());
    let orders = svc.order_history().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Completed);
    assert_eq!(orders[0].execution_price, Some(dec!(15.55)));
    assert!(orders[0].execution_time.is_some());

    let snapshot = svc.account_snapshot().await;
    let value = dec!(15.55) * dec!(1000);
    let commission = value * dec!(0.0005);
    assert_eq!(snapshot.cash, dec!(1000000) - value - commission);
    assert_eq!(snapshot.position(CODE).unwrap().volume, 1000);
}

#[tokio::test]
async fn test_buy_below_ask_stays_pending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(1000000), dir.path()).await;

    svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();
    let id = svc.submit_order(buy(1000, dec!(15.50))).await.unwrap();

    let pending = svc.pending_orders().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].status, OrderStatus::Pending);
    assert!(svc.account_snapshot().await.position(CODE).is_none());

    // 卖一下移到 15.50 后，同一张挂单在下一批行情中成交
    svc.on_ticks(&batch(tick(dec!(15.48), dec!(15.50), dec!(15.35))))
        .await
        .unwrap();
    assert!(svc.pending_orders().await.is_empty());
    let orders = svc.order_history().await;
    assert_eq!(orders[0].execution_price, Some(dec!(15.50)));
}

#[tokio::test]
async fn test_sell_crossing_fills_at_best_bid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(1000000), dir.path()).await;

    svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();
    svc.submit_order(buy(1000, dec!(15.60))).await.unwrap();

    // 买一 15.70：限价 15.65 穿越，以较高的 15.70 成交
    svc.on_ticks(&batch(tick(dec!(15.68), dec!(15.75), dec!(15.70))))
        .await
        .unwrap();
    svc.submit_order(sell(500, dec!(15.65))).await.unwrap();

    let orders = svc.order_history().await;
    let sell_order = orders.iter().find(|o| o.side == TradeSide::Sell).unwrap();
    assert_eq!(sell_order.status, OrderStatus::Completed);
    assert_eq!(sell_order.execution_price, Some(dec!(15.70)));
    assert_eq!(svc.account_snapshot().await.position(CODE).unwrap().volume, 500);
}

#[tokio::test]
async fn test_no_ladder_keeps_order_pending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(1000000), dir.path()).await;

    let mut quote = tick(dec!(15.45), dec!(15.55), dec!(15.40));
    quote.ask_price = vec![Decimal::ZERO; 5];
    svc.on_ticks(&batch(quote)).await.unwrap();

    svc.submit_order(buy(1000, dec!(15.60))).await.unwrap();
    assert_eq!(svc.pending_orders().await.len(), 1);
}

#[tokio::test]
async fn test_submit_rejects_invalid_quantity_and_missing_quote() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(1000000), dir.path()).await;

    let err = svc.submit_order(buy(0, dec!(15.60))).await.unwrap_err();
    assert!(matches!(err, TradeError::InvalidOrder(_)));

    // 未提供限价且没有任何行情缓存，无法解析价格
    let err = svc
        .submit_order(OrderRequest {
            code: CODE.to_string(),
            side: TradeSide::Buy,
            quantity: 100,
            price: None,
            remark: "no_price".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::NoQuote(_)));
    assert!(svc.order_history().await.is_empty());
}

#[tokio::test]
async fn test_market_order_resolves_price_from_ladder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(1000000), dir.path()).await;

    svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();
    svc.submit_order(OrderRequest {
        code: CODE.to_string(),
        side: TradeSide::Buy,
        quantity: 200,
        price: None,
        remark: "market_buy".to_string(),
    })
    .await
    .unwrap();

    // 市价买入解析为卖一价 15.55，立即穿越成交
    let orders = svc.order_history().await;
    assert_eq!(orders[0].status, OrderStatus::Completed);
    assert_eq!(orders[0].execution_price, Some(dec!(15.55)));
}

#[tokio::test]
async fn test_ledger_rejection_marks_order_failed_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(10000), dir.path()).await;

    svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();
    let summary_before =
        std::fs::read_to_string(dir.path().join("sim_test.json")).expect("摘要档案已落盘");

    // 需要约 15.5 万资金，账户只有 1 万：穿越但落账被拒
    svc.submit_order(buy(10000, dec!(15.60))).await.unwrap();

    // 被拒绝的成交不触发任何写盘，持久化档案逐字节不变
    let summary_after =
        std::fs::read_to_string(dir.path().join("sim_test.json")).expect("摘要档案仍在");
    assert_eq!(summary_before, summary_after);

    let orders = svc.order_history().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);

    // 后续行情不会让 Failed 订单复活
    svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();
    let orders = svc.order_history().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
    assert!(svc.trade_records().await.is_empty());

    let snapshot = svc.account_snapshot().await;
    assert_eq!(snapshot.cash, dec!(10000));
}

#[tokio::test]
async fn test_cancel_only_affects_pending_orders() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(1000000), dir.path()).await;

    svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();
    let pending_id = svc.submit_order(buy(1000, dec!(15.50))).await.unwrap();
    let filled_id = svc.submit_order(buy(100, dec!(15.60))).await.unwrap();

    assert!(svc.cancel_order(&pending_id).await.is_ok());
    let err = svc.cancel_order(&filled_id).await.unwrap_err();
    assert!(matches!(err, TradeError::OrderNotFound(_)));

    let orders = svc.order_history().await;
    let cancelled = orders.iter().find(|o| o.id == pending_id).unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // 已撤销的订单不再参与撮合
    svc.on_ticks(&batch(tick(dec!(15.40), dec!(15.45), dec!(15.30))))
        .await
        .unwrap();
    assert_eq!(
        svc.order_history()
            .await
            .iter()
            .find(|o| o.id == pending_id)
            .unwrap()
            .status,
        OrderStatus::Cancelled
    );
}

#[tokio::test]
async fn test_orders_fill_in_creation_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(20000), dir.path()).await;

    // 两张挂单都会在下一批行情穿越，但资金只够第一张
    svc.on_ticks(&batch(tick(dec!(15.45), dec!(16.00), dec!(15.40))))
        .await
        .unwrap();
    let first = svc.submit_order(buy(1000, dec!(15.80))).await.unwrap();
    let second = svc.submit_order(buy(1000, dec!(15.80))).await.unwrap();

    svc.on_ticks(&batch(tick(dec!(15.50), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();

    let orders = svc.order_history().await;
    let first_order = orders.iter().find(|o| o.id == first).unwrap();
    let second_order = orders.iter().find(|o| o.id == second).unwrap();
    assert_eq!(first_order.status, OrderStatus::Completed);
    assert_eq!(second_order.status, OrderStatus::Failed);

    let snapshot = svc.account_snapshot().await;
    assert!(snapshot.cash >= Decimal::ZERO);
    assert_eq!(snapshot.position(CODE).unwrap().volume, 1000);
}

#[tokio::test]
async fn test_persisted_state_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let svc = service(dec!(1000000), dir.path()).await;
        svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
            .await
            .unwrap();
        svc.submit_order(buy(1000, dec!(15.60))).await.unwrap();
    }

    // 以相同目录重开账本：现金与持仓从档案恢复
    let svc = service(dec!(1000000), dir.path()).await;
    assert!(svc.ledger().recovered_from_disk());
    let snapshot = svc.account_snapshot().await;
    let value = dec!(15.55) * dec!(1000);
    assert_eq!(snapshot.cash, dec!(1000000) - value - value * dec!(0.0005));
    assert_eq!(snapshot.position(CODE).unwrap().volume, 1000);
    assert_eq!(svc.trade_records().await.len(), 1);
}

#[tokio::test]
async fn test_reset_archives_and_reinitializes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dec!(1000000), dir.path()).await;

    svc.on_ticks(&batch(tick(dec!(15.45), dec!(15.55), dec!(15.40))))
        .await
        .unwrap();
    svc.submit_order(buy(1000, dec!(15.60))).await.unwrap();

    svc.ledger().reset(dec!(500000)).await.unwrap();
    let snapshot = svc.account_snapshot().await;
    assert_eq!(snapshot.cash, dec!(500000));
    assert!(snapshot.positions.is_empty());
    assert!(svc.trade_records().await.is_empty());

    let baks = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        .count();
    assert_eq!(baks, 3);
}
