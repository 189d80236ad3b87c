use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

use crate::config::{AiProvider, Config};
use crate::error::CollaboratorError;
use crate::signals::parse::{decision_from_json, extract_json};
use crate::signals::{DecisionContext, SignalSource, TradeDecision};

const SYSTEM_PROMPT: &str = "You are a professional quantitative trading assistant. \
Analyse only the data provided and reply with exactly one JSON object and no other text. \
Keys: signal, reason, stop_loss, take_profit, confidence, strategy_tag. \
Keep stop-loss and take-profit consistent with the trade direction and avoid overtrading.";

/// Bars summarised in the prompt.
const PROMPT_BARS: usize = 5;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client (DeepSeek or Qwen).
pub struct AiClient {
    client: Client,
    provider: AiProvider,
    api_key: String,
    base_url: String,
    model: String,
}

impl AiClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            provider: cfg.ai_provider,
            api_key: cfg.ai_api_key.clone(),
            base_url: cfg.ai_base_url.trim_end_matches('/').to_string(),
            model: cfg.ai_model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, user: &str, max_tokens: Option<u32>) -> Result<String, CollaboratorError> {
        if !self.is_configured() {
            return Err(CollaboratorError::Disabled("AI api key"));
        }

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.1,
            stream: false,
            max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                service: self.provider.as_str(),
                status: status.as_u16(),
                body,
            });
        }

        let data: ChatResponse = resp.json().await?;
        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CollaboratorError::Malformed("empty completion".to_string()))
    }
}

/// User prompt: last bars, last signal, live quote and current position.
pub fn build_prompt(ctx: &DecisionContext) -> String {
    let snap = &ctx.snapshot;
    let tf = snap.timeframe;
    let mut p = String::new();

    let _ = writeln!(p, "[Role]\nQuant trading assistant for the {} timeframe, trend and risk focused.\n", tf);

    let _ = writeln!(p, "[Last {} {} bars]", PROMPT_BARS, tf);
    for (i, bar) in snap.bars.tail(PROMPT_BARS).iter().enumerate() {
        let _ = writeln!(
            p,
            "K{}: {} open {:.2} close {:.2} change {:+.2}%",
            i + 1,
            if bar.is_bullish() { "bullish" } else { "bearish" },
            bar.open,
            bar.close,
            bar.change_pct()
        );
    }

    if let Some((signal, confidence)) = ctx.last_signal {
        let _ = writeln!(p, "\n[Last signal] {} / {}", signal, confidence);
    }

    let position = match &ctx.position {
        Some(pos) => format!(
            "{} size {} entry {:.2} unrealized {:+.2} USDT",
            pos.side,
            pos.size,
            pos.entry_price,
            pos.unrealized_pnl(snap.price)
        ),
        None => "none".to_string(),
    };

    let _ = writeln!(
        p,
        "\n[Market]\n- Price: ${:.2}\n- Time: {}\n- Bar high/low: {:.2} / {:.2}\n- Volume: {:.2}\n- Change: {:+.2}%\n- Position: {}",
        snap.price,
        snap.timestamp.to_rfc3339(),
        snap.high,
        snap.low,
        snap.volume,
        snap.price_change_pct,
        position
    );
    if snap.is_fallback {
        let _ = writeln!(p, "- Note: market feed is down, this quote is cached");
    }

    let _ = writeln!(
        p,
        "\n[Rules]\n1. Favour trend continuation, do not flip on a single bar.\n\
         2. Reversals need several indicators agreeing.\n\
         3. Give explicit stop-loss and take-profit consistent with direction.\n\
         4. Without a clear trend answer HOLD.\n\n\
         [Output]\nOnly one JSON object:\n\
         {{\"signal\": \"BUY|SELL|HOLD\", \"reason\": \"...\", \"stop_loss\": <number>, \
         \"take_profit\": <number>, \"confidence\": \"HIGH|MEDIUM|LOW\", \
         \"strategy_tag\": \"trend_follow|mean_reversion|breakout|other\"}}\n\
         Long: stop_loss < price < take_profit. Short: take_profit < price < stop_loss."
    );
    p
}

#[async_trait]
impl SignalSource for AiClient {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    async fn decide(&self, ctx: &DecisionContext) -> Result<TradeDecision, CollaboratorError> {
        let prompt = build_prompt(ctx);
        let reply = self.complete(&prompt, None).await?;
        debug!("{} raw reply: {}", self.provider.as_str(), reply);
        let value = extract_json(&reply)?;
        decision_from_json(&value, Utc::now())
    }

    async fn ping(&self) -> Result<(), CollaboratorError> {
        self.complete("Hello", Some(10)).await.map(|_| ())
    }
}
