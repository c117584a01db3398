use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use zhanggui_core::common::time::{FakeClockProvider, RealTimeProvider, TimeProvider};
use zhanggui_core::config::{AppConfig, BacktestConfig};
use zhanggui_core::strategy::port::Strategy;
use zhanggui_core::trade::entity::AccountId;
use zhanggui_engine::backtest::BacktestDriver;
use zhanggui_engine::runtime::TradingSession;
use zhanggui_engine::swing::{SwingParams, SwingStrategy};
use zhanggui_market::history::FileHistoryProvider;
use zhanggui_market::replay::ReplayFeed;
use zhanggui_risk::manager::RiskManager;
use zhanggui_store::account::JsonAccountStore;
use zhanggui_trade::account::Ledger;
use zhanggui_trade::service::PaperTradeService;

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 实例化所有具体实现组件并以 Arc<dyn Trait> 注入交易会话；
/// 配置了回测区间时跑批回测，否则以回放行情驱动模拟盘。
///
/// # Logic
/// 1. 初始化全局日志（终端 + 文件）。
/// 2. 加载配置（文件 + 环境变量覆盖，失败回退默认值）。
/// 3. 按模式组装并运行。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::never("logs", "main.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .init();

    let cfg = load_config();
    info!("掌柜交易程序启动, 账户: {}", cfg.account.account_id);

    match cfg.backtest.clone() {
        Some(backtest) => run_backtest(cfg, backtest).await,
        None => run_paper(cfg).await,
    }
}

/// 加载配置：`zhanggui.toml`（可缺省）+ `ZHANGGUI__*` 环境变量覆盖
fn load_config() -> AppConfig {
    let loaded = config::Config::builder()
        .add_source(config::File::with_name("zhanggui").required(false))
        .add_source(config::Environment::with_prefix("ZHANGGUI").separator("__"))
        .build()
        .and_then(|c| c.try_deserialize::<AppConfig>());

    match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("配置加载失败 ({e})，使用默认配置");
            AppConfig::default()
        }
    }
}

/// 策略目标标的：订阅列表剔除大盘指数
fn target_codes(cfg: &AppConfig) -> Vec<String> {
    cfg.feed
        .codes
        .iter()
        .filter(|c| **c != cfg.feed.market_index)
        .cloned()
        .collect()
}

/// # Summary
/// 组装账本 -> 模拟交易所 -> 风控 -> 策略的完整会话。
async fn build_session(
    cfg: &AppConfig,
    clock: Arc<dyn TimeProvider>,
    history: Option<&FileHistoryProvider>,
) -> Result<(TradingSession, Arc<PaperTradeService>), Box<dyn std::error::Error>> {
    let store = Arc::new(JsonAccountStore::new(&cfg.account.data_dir)?);
    let ledger = Arc::new(
        Ledger::open(
            AccountId(cfg.account.account_id.clone()),
            cfg.account.initial_cash,
            store,
            clock.clone(),
        )
        .await,
    );
    let service = Arc::new(PaperTradeService::new(
        ledger,
        cfg.account.commission_rate,
        clock.clone(),
    ));

    let mut strategy = SwingStrategy::new(
        target_codes(cfg),
        cfg.feed.market_index.clone(),
        cfg.strategy.avg_start.clone(),
        cfg.strategy.avg_end.clone(),
        SwingParams::default(),
    );
    match history {
        Some(history) => {
            if !strategy.prepare_data(history).await {
                warn!("策略 {} 数据准备失败，本次运行不会产生信号", strategy.name());
            }
        }
        None => warn!("未配置历史数据文件，策略数据不就绪"),
    }

    let gate = Arc::new(RiskManager::new(
        cfg.risk.clone(),
        cfg.account.commission_rate,
        clock.clone(),
    ));

    let session = TradingSession::new(
        vec![Box::new(strategy)],
        gate,
        service.clone(),
        service.clone(),
    );
    Ok((session, service))
}

/// 回测模式：虚拟时钟 + 历史日线驱动
async fn run_backtest(
    cfg: AppConfig,
    backtest: BacktestConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "回测模式: {} .. {}, 数据文件: {}",
        backtest.start_date, backtest.end_date, backtest.history_file
    );

    let clock = Arc::new(FakeClockProvider::new(chrono_start(&backtest.start_date)?));
    let history = Arc::new(FileHistoryProvider::new(&backtest.history_file)?);
    let (mut session, service) =
        build_session(&cfg, clock.clone(), Some(history.as_ref())).await?;

    let driver = BacktestDriver::new(history, clock, cfg.feed.market_index.clone());
    let report = driver
        .run(
            &mut session,
            service.clone(),
            &target_codes(&cfg),
            &backtest.start_date,
            &backtest.end_date,
            cfg.account.initial_cash,
            "swing",
        )
        .await?;

    info!("回测报告:\n{}", serde_json::to_string_pretty(&report)?);
    service.log_summary().await;
    Ok(())
}

/// 模拟盘模式：真实时钟 + 回放行情文件驱动
async fn run_paper(cfg: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);

    let history = match &cfg.strategy.history_file {
        Some(path) => Some(FileHistoryProvider::new(path)?),
        None => None,
    };
    let (mut session, service) = build_session(&cfg, clock, history.as_ref()).await?;
    service.log_summary().await;

    let Some(replay_file) = cfg.feed.replay_file.clone() else {
        error!("未配置回放行情文件 (feed.replay_file)，实盘行情通道不在本程序范围内，退出");
        return Ok(());
    };
    let feed = ReplayFeed::new(replay_file);

    tokio::select! {
        result = session.run(&feed, &cfg.feed.codes) => result?,
        _ = tokio::signal::ctrl_c() => info!("收到退出信号"),
    }

    service.log_summary().await;
    info!("交易程序结束");
    Ok(())
}

/// "YYYYMMDD" -> 当日零点 (UTC)
fn chrono_start(day: &str) -> Result<chrono::DateTime<chrono::Utc>, Box<dyn std::error::Error>> {
    let date = chrono::NaiveDate::parse_from_str(day, "%Y%m%d")?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("无效日期: {day}"))?;
    Ok(chrono::TimeZone::from_utc_datetime(&chrono::Utc, &midnight))
}
