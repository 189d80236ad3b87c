use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::CollaboratorError;
use crate::models::{Confidence, Signal};
use crate::signals::TradeDecision;

const REQUIRED_FIELDS: [&str; 5] = ["signal", "reason", "stop_loss", "take_profit", "confidence"];

/// Pulls the JSON object out of a model reply. Tolerates code fences,
/// surrounding prose, single quotes, bare keys and trailing commas.
pub fn extract_json(reply: &str) -> Result<Value, CollaboratorError> {
    let body = strip_fences(reply);
    let start = body.find('{');
    let end = body.rfind('}');
    let object = match (start, end) {
        (Some(s), Some(e)) if e > s => &body[s..=e],
        _ => return Err(CollaboratorError::Malformed("no JSON object in reply".to_string())),
    };

    if let Ok(v) = serde_json::from_str(object) {
        return Ok(v);
    }

    let repaired = repair(&object.replace('\'', "\""));
    serde_json::from_str(&repaired).map_err(|e| {
        let preview: String = object.chars().take(200).collect();
        CollaboratorError::Malformed(format!("{} in {:?}", e, preview))
    })
}

fn strip_fences(reply: &str) -> &str {
    for marker in ["```json", "```"] {
        if let Some(start) = reply.find(marker) {
            let inner = &reply[start + marker.len()..];
            if let Some(end) = inner.find("```") {
                return inner[..end].trim();
            }
        }
    }
    reply
}

/// Quotes bare object keys and drops commas before `}`/`]`, outside strings.
fn repair(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 16);
    let mut in_string = false;
    let mut i = 0;

    let next_non_ws = |from: usize| chars[from..].iter().copied().find(|c| !c.is_whitespace());

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 1;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' if matches!(next_non_ws(i + 1), Some('}') | Some(']')) => {}
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if next_non_ws(i) == Some(':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(&word);
                }
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// Number from a JSON value: numbers as-is, strings by their first numeric
/// token after dropping thousands separators ("$95,000.5 USDT" -> 95000.5).
pub fn loose_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => first_number(&s.replace(',', "")),
        _ => None,
    };
    parsed.filter(|x| x.is_finite())
}

fn first_number(s: &str) -> Option<f64> {
    let b = s.as_bytes();
    for start in 0..b.len() {
        let mut j = start;
        if b[j] == b'+' || b[j] == b'-' {
            j += 1;
        }
        let int_start = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        let mut has_digits = j > int_start;
        if j < b.len() && b[j] == b'.' {
            let mut k = j + 1;
            while k < b.len() && b[k].is_ascii_digit() {
                k += 1;
            }
            if k > j + 1 {
                j = k;
                has_digits = true;
            }
        }
        if has_digits {
            return s[start..j].parse().ok();
        }
    }
    None
}

/// Validates the reply object and turns it into a decision.
pub fn decision_from_json(v: &Value, now: DateTime<Utc>) -> Result<TradeDecision, CollaboratorError> {
    let obj: &Map<String, Value> = v
        .as_object()
        .ok_or_else(|| CollaboratorError::Malformed("reply is not an object".to_string()))?;

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| !obj.contains_key(*f))
        .collect();
    if !missing.is_empty() {
        return Err(CollaboratorError::Malformed(format!(
            "missing fields: {}",
            missing.join(", ")
        )));
    }

    let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or_default();

    let signal = Signal::from_str_loose(text("signal")).ok_or_else(|| {
        CollaboratorError::Malformed(format!("unknown signal {}", obj["signal"]))
    })?;
    let confidence = Confidence::from_str_loose(text("confidence")).unwrap_or(Confidence::Low);
    let strategy_tag = obj
        .get("strategy_tag")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(TradeDecision {
        signal,
        confidence,
        reason: text("reason").to_string(),
        stop_loss: loose_f64(&obj["stop_loss"]),
        take_profit: loose_f64(&obj["take_profit"]),
        strategy_tag,
        is_fallback: false,
        timestamp: now,
    })
}
