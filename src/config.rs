use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{Confidence, Timeframe};

pub type SharedConfig = Arc<RwLock<Config>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    Deepseek,
    Qwen,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::Deepseek => "deepseek",
            AiProvider::Qwen => "qwen",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            AiProvider::Deepseek => "https://api.deepseek.com",
            AiProvider::Qwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AiProvider::Deepseek => "deepseek-chat",
            AiProvider::Qwen => "qwen-max",
        }
    }
}

/// Execution gate thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub min_confidence: Confidence,
    pub cooldown_minutes: i64,
    /// First entry needs 2 of the last 3 signals to agree.
    pub require_confirmation: bool,
}

/// Bounds on the in-memory views kept for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLimits {
    pub signal_history: usize,
    pub ai_decisions: usize,
    pub recent_trades: usize,
    pub profit_curve: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Instrument
    pub symbol: String,
    pub timeframe: Timeframe,
    pub trade_amount: f64,
    pub leverage: f64,
    pub data_points: usize,

    // Ledger
    pub ledger_path: String,

    // Execution gate
    pub gate: GateConfig,

    // Market data
    pub market_base_url: String,

    // Signal source
    pub ai_provider: AiProvider,
    pub ai_api_key: String,
    pub ai_base_url: String,
    pub ai_model: String,

    // Collaborator calls
    pub request_timeout_secs: u64,
    pub max_retries: usize,

    pub limits: MemoryLimits,

    // Logging
    pub log_level: String,

    /// Values from the environment that were replaced by defaults, logged
    /// once tracing is up.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

const DEFAULT_TRADE_AMOUNT: f64 = 0.01;

/// Trade size must be a positive finite number; anything else falls back to
/// the default with a warning.
fn parse_trade_amount(raw: &str) -> (f64, Option<String>) {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => (v, None),
        _ => (
            DEFAULT_TRADE_AMOUNT,
            Some(format!(
                "TRADE_AMOUNT {:?} is not a positive number, using {}",
                raw, DEFAULT_TRADE_AMOUNT
            )),
        ),
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let ai_provider = match env("AI_PROVIDER", "deepseek").to_lowercase().as_str() {
            "qwen" => AiProvider::Qwen,
            _ => AiProvider::Deepseek,
        };
        let ai_api_key = match ai_provider {
            AiProvider::Qwen => env("DASHSCOPE_API_KEY", ""),
            AiProvider::Deepseek => env("DEEPSEEK_API_KEY", ""),
        };

        let mut warnings = Vec::new();
        let (trade_amount, amount_warning) = parse_trade_amount(&env("TRADE_AMOUNT", "0.01"));
        warnings.extend(amount_warning);

        Config {
            symbol: env("SYMBOL", "BTCUSDT"),
            timeframe: Timeframe::from_str_loose(&env("TIMEFRAME", "15m"))
                .unwrap_or(Timeframe::M15),
            trade_amount,
            leverage: env("LEVERAGE", "10").parse().unwrap_or(10.0),
            data_points: env("DATA_POINTS", "48").parse().unwrap_or(48),
            ledger_path: env("LEDGER_PATH", "data/paper_trades.db"),
            gate: GateConfig {
                min_confidence: Confidence::from_str_loose(&env("MIN_CONFIDENCE", "MEDIUM"))
                    .unwrap_or(Confidence::Medium),
                cooldown_minutes: env("SIGNAL_COOLDOWN_MINUTES", "15").parse().unwrap_or(15),
                require_confirmation: env("REQUIRE_SIGNAL_CONFIRMATION", "true").to_lowercase()
                    == "true",
            },
            market_base_url: env("MARKET_BASE_URL", "https://fapi.binance.com"),
            ai_provider,
            ai_api_key,
            ai_base_url: env("AI_BASE_URL", ai_provider.default_base_url()),
            ai_model: env("AI_MODEL", ai_provider.default_model()),
            request_timeout_secs: env("REQUEST_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            max_retries: env("MAX_RETRIES", "2").parse().unwrap_or(2).max(1),
            limits: MemoryLimits {
                signal_history: 20,
                ai_decisions: 30,
                recent_trades: 50,
                profit_curve: 100,
            },
            log_level: env("LOG_LEVEL", "INFO"),
            warnings,
        }
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}
