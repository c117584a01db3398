use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub account: AccountConfig,
    pub risk: RiskConfig,
    pub feed: FeedConfig,
    pub strategy: StrategyConfig,
    /// 配置了回测区间时，应用以回测模式启动
    pub backtest: Option<BacktestConfig>,
}

/// 模拟账户配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// 账户 ID，同时决定档案文件名
    pub account_id: String,
    /// 初始资金
    pub initial_cash: Decimal,
    /// 账户档案目录
    pub data_dir: String,
    /// 手续费率（双边收取）
    pub commission_rate: Decimal,
}

/// 风控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// 最大总仓位比例，超过后进入只卖不买模式
    pub max_position_ratio: Decimal,
    /// 单标的默认最大仓位比例
    pub default_code_limit: Decimal,
    /// 单标的仓位比例覆盖项
    pub code_limits: HashMap<String, Decimal>,
    /// 现金安全垫比例（可用预算 = 可用资金 * (1 - 此比例)）
    pub cash_buffer_ratio: Decimal,
    /// 同标的两次买入的最小间隔（秒）
    pub buy_interval_secs: i64,
    /// 同标的两次卖出的最小间隔（秒）；None 表示卖出不设冷却
    pub sell_interval_secs: Option<i64>,
}

/// 行情来源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// 关注的标的代码列表
    pub codes: Vec<String>,
    /// 大盘指数代码（策略用于判断市场环境）
    pub market_index: String,
    /// 回放行情文件（JSON Lines，每行一个批次）；实盘接入时留空
    pub replay_file: Option<String>,
}

/// 策略数据准备配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// 日线历史数据文件（区间均价基准）；缺省时策略数据不就绪
    pub history_file: Option<String>,
    /// 均价基准区间起点，格式 "YYYYMMDD"
    pub avg_start: String,
    /// 均价基准区间终点，格式 "YYYYMMDD"
    pub avg_end: String,
}

/// 回测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// 回测起始日，格式 "YYYYMMDD"
    pub start_date: String,
    /// 回测截止日，格式 "YYYYMMDD"
    pub end_date: String,
    /// 日线历史数据文件
    pub history_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            account: AccountConfig::default(),
            risk: RiskConfig::default(),
            feed: FeedConfig {
                codes: Vec::new(),
                market_index: "899050.BJ".to_string(),
                replay_file: None,
            },
            strategy: StrategyConfig {
                history_file: None,
                avg_start: "20240102".to_string(),
                avg_end: "20241231".to_string(),
            },
            backtest: None,
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            account_id: "sim_account".to_string(),
            initial_cash: Decimal::from(1_000_000),
            data_dir: "sim_data".to_string(),
            // 万五，双边
            commission_rate: Decimal::new(5, 4),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_ratio: Decimal::new(90, 2),
            default_code_limit: Decimal::new(10, 2),
            code_limits: HashMap::new(),
            cash_buffer_ratio: Decimal::new(5, 2),
            buy_interval_secs: 60,
            sell_interval_secs: None,
        }
    }
}
