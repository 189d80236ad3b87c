use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

use crate::error::{LedgerError, StorageError};
use crate::models::{Confidence, RawNumber, TradeAction, TradeEvent};
use crate::trading::ledger::{validate, Ledger};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    symbol TEXT NOT NULL,
    timeframe TEXT,
    signal TEXT,
    action TEXT NOT NULL
        CHECK (action IN ('open_long', 'open_short', 'close_long', 'close_short')),
    amount,
    price,
    stop_loss,
    take_profit,
    confidence TEXT,
    reason TEXT
);
";

const SELECT_COLUMNS: &str = "SELECT id, timestamp, symbol, timeframe, action, amount, price, \
     stop_loss, take_profit, confidence, reason FROM trades";

/// Naive stamps written by older tooling, read as UTC.
const LEGACY_TS_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Offset-carrying stamps in `str(datetime)` form.
const OFFSET_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Stand-in timestamp for rows whose stored stamp is unreadable.
const UNREADABLE_TS: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

impl ToSql for RawNumber {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            RawNumber::Number(v) if v.is_finite() => ToSqlOutput::Owned(Value::Real(*v)),
            // SQLite stores NaN as NULL; keep it as text so it still reads as non-numeric.
            RawNumber::Number(v) => ToSqlOutput::Owned(Value::Text(v.to_string())),
            RawNumber::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            RawNumber::Missing => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl FromSql for RawNumber {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => RawNumber::Missing,
            ValueRef::Integer(i) => RawNumber::Number(i as f64),
            ValueRef::Real(f) => RawNumber::Number(f),
            ValueRef::Text(t) => RawNumber::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => RawNumber::Text(format!("<blob {} bytes>", b.len())),
        })
    }
}

/// SQLite-backed ledger. One connection behind a mutex: writers are
/// serialized and each append is its own transaction.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Rows whose stored timestamp cannot be read, as `(id, raw)`. They still
    /// replay, in id order, stamped at the Unix epoch.
    pub fn unreadable_timestamps(&self) -> Result<Vec<(i64, String)>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let mut stmt = conn.prepare("SELECT id, timestamp FROM trades ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            let raw = raw.unwrap_or_default();
            if parse_timestamp(&raw).is_none() {
                out.push((id, raw));
            }
        }
        Ok(out)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query(&self, sql: &str, limit: Option<usize>) -> Result<Vec<TradeEvent>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match limit {
            Some(n) => stmt.query_map(params![n as i64], read_row)?,
            None => stmt.query_map([], read_row)?,
        };

        let mut out = Vec::new();
        for row in rows {
            if let Some(event) = row?.into_event() {
                out.push(event);
            }
        }
        Ok(out)
    }
}

impl Ledger for SqliteLedger {
    fn append_batch(&self, events: Vec<TradeEvent>) -> Result<(), LedgerError> {
        for e in &events {
            validate(e)?;
        }
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let tx = conn.transaction().map_err(StorageError::from)?;
        for e in &events {
            tx.execute(
                "INSERT INTO trades (timestamp, symbol, timeframe, signal, action, amount, price, \
                 stop_loss, take_profit, confidence, reason) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    e.timestamp.to_rfc3339(),
                    e.symbol,
                    e.timeframe,
                    e.action.signal().as_str(),
                    e.action.as_str(),
                    e.amount,
                    e.price,
                    e.stop_loss,
                    e.take_profit,
                    e.confidence.as_str(),
                    e.reason,
                ],
            )
            .map_err(StorageError::from)?;
        }
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn all(&self) -> Result<Vec<TradeEvent>, StorageError> {
        self.query(&format!("{} ORDER BY id ASC", SELECT_COLUMNS), None)
    }

    fn recent(&self, n: usize) -> Result<Vec<TradeEvent>, StorageError> {
        self.query(&format!("{} ORDER BY id DESC LIMIT ?1", SELECT_COLUMNS), Some(n))
    }

    fn last_open(&self) -> Result<Option<TradeEvent>, StorageError> {
        let rows = self.query(
            &format!(
                "{} WHERE action IN ('open_long', 'open_short') ORDER BY id DESC LIMIT ?1",
                SELECT_COLUMNS
            ),
            Some(1),
        )?;
        Ok(rows.into_iter().next())
    }
}

struct StoredRow {
    id: i64,
    timestamp: Option<String>,
    symbol: Option<String>,
    timeframe: Option<String>,
    action: Option<String>,
    amount: RawNumber,
    price: RawNumber,
    stop_loss: RawNumber,
    take_profit: RawNumber,
    confidence: Option<String>,
    reason: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        symbol: row.get(2)?,
        timeframe: row.get(3)?,
        action: row.get(4)?,
        amount: row.get(5)?,
        price: row.get(6)?,
        stop_loss: row.get(7)?,
        take_profit: row.get(8)?,
        confidence: row.get(9)?,
        reason: row.get(10)?,
    })
}

impl StoredRow {
    /// `None` for rows whose action is not a ledger action (legacy `hold` rows).
    fn into_event(self) -> Option<TradeEvent> {
        let raw_action = self.action.unwrap_or_default();
        let action = match TradeAction::from_str_loose(&raw_action) {
            Some(a) => a,
            None => {
                warn!("Ledger row {} has unknown action {:?}, not replayed", self.id, raw_action);
                return None;
            }
        };

        let raw_ts = self.timestamp.unwrap_or_default();
        let timestamp = parse_timestamp(&raw_ts).unwrap_or_else(|| {
            warn!(
                "Ledger row {} has unreadable timestamp {:?}, replayed at {}",
                self.id, raw_ts, UNREADABLE_TS
            );
            UNREADABLE_TS
        });

        let confidence = self
            .confidence
            .as_deref()
            .and_then(Confidence::from_str_loose)
            .unwrap_or(Confidence::Low);

        Some(TradeEvent {
            timestamp,
            symbol: self.symbol.unwrap_or_default(),
            timeframe: self.timeframe.unwrap_or_default(),
            action,
            price: self.price,
            amount: self.amount,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            confidence,
            reason: self.reason.unwrap_or_default(),
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, OFFSET_TS_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }
    LEGACY_TS_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
        .map(|n| n.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkipReason;
    use crate::test_helpers::{close_long, open_long, open_short, ts};
    use crate::trading::PerformanceAggregator;

    #[test]
    fn appends_and_reads_back_in_order() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let e1 = open_long(100.0, 1.0).at(ts(0)).with_levels(95.0, 110.0);
        let e2 = close_long(110.0, 1.0).at(ts(5));
        ledger.append(e1.clone()).unwrap();
        ledger.append(e2.clone()).unwrap();

        assert_eq!(ledger.all().unwrap(), vec![e1.clone(), e2.clone()]);
        assert_eq!(ledger.recent(1).unwrap(), vec![e2]);
        assert_eq!(ledger.last_open().unwrap(), Some(e1));
    }

    #[test]
    fn malformed_numbers_survive_storage() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let mut e = open_short(0.0, 1.0).at(ts(0));
        e.amount = RawNumber::from("abc");
        ledger.append(e).unwrap();

        let back = ledger.all().unwrap();
        assert_eq!(back[0].price, RawNumber::Number(0.0));
        assert_eq!(back[0].amount, RawNumber::Text("abc".to_string()));
        assert!(back[0].stop_loss.is_missing());
    }

    #[test]
    fn legacy_rows_are_decoded() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        {
            let conn = ledger.conn.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO trades (timestamp, symbol, timeframe, signal, action, amount, price, confidence) \
                 VALUES ('2024-01-15 12:00:00', 'BTC/USDT', '15m', 'BUY', 'open_long', 0.01, 100.0, 'HIGH');
                 INSERT INTO trades (timestamp, symbol, timeframe, signal, action, amount, price, confidence) \
                 VALUES ('2024-01-15 12:15:00', 'BTC/USDT', '15m', 'SELL', 'close_long', 0.01, NULL, NULL);",
            )
            .unwrap();
        }

        let all = ledger.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].timestamp, ts(0));
        assert_eq!(all[0].confidence, Confidence::High);
        assert!(all[1].price.is_missing());
        assert_eq!(all[1].confidence, Confidence::Low);
    }

    #[test]
    fn fractional_and_iso_stamps_are_read() {
        let quarter = ts(0) + chrono::Duration::milliseconds(250);
        for (raw, expected) in [
            ("2024-01-15 12:00:00.250000", quarter),
            ("2024-01-15T12:00:00.25", quarter),
            ("2024-01-15T12:00:00", ts(0)),
            ("2024-01-15 12:00:00.25+00:00", quarter),
            ("2024-01-15 13:00:00+01:00", ts(0)),
            ("2024-01-15T12:00:00.25Z", quarter),
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_timestamp("not a time"), None);
    }

    #[test]
    fn unreadable_stamp_does_not_hide_history() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        {
            let conn = ledger.conn.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO trades (timestamp, symbol, action, amount, price) \
                 VALUES ('2024-01-15 12:00:00', 'BTCUSDT', 'open_long', 1, 100.0);
                 INSERT INTO trades (timestamp, symbol, action, amount, price) \
                 VALUES ('2024-01-15 12:15:00', 'BTCUSDT', 'close_long', 1, 110.0);
                 INSERT INTO trades (timestamp, symbol, action, amount, price) \
                 VALUES ('2024-01-16T09:00:00.123456', 'BTCUSDT', 'open_long', 1, 120.0);
                 INSERT INTO trades (timestamp, symbol, action, amount, price) \
                 VALUES ('yesterday-ish', 'BTCUSDT', 'close_long', 1, 125.0);",
            )
            .unwrap();
        }

        let all = ledger.all().unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].timestamp, UNREADABLE_TS);
        assert_eq!(
            ledger.unreadable_timestamps().unwrap(),
            vec![(4, "yesterday-ish".to_string())]
        );

        let report = PerformanceAggregator::from_ledger(&ledger).unwrap();
        assert_eq!(report.snapshot.total_trades, 2);
        assert_eq!(report.snapshot.total_profit, 15.0);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn numeric_text_and_nan_keep_their_shape() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let mut e = open_long(1.0, 1.0).at(ts(0));
        e.price = RawNumber::from("100");
        e.amount = RawNumber::Number(f64::NAN);
        ledger.append(e).unwrap();

        let back = ledger.all().unwrap();
        assert_eq!(back[0].price, RawNumber::Text("100".to_string()));
        assert!(matches!(back[0].amount, RawNumber::Text(_)));
        assert_eq!(
            back[0].valid_fill(),
            Err(SkipReason::NonNumericAmount { raw: "\"NaN\"".to_string() })
        );
    }

    #[test]
    fn reopening_a_file_keeps_history() {
        let path = std::env::temp_dir()
            .join(format!("paper_ledger_test_{}", std::process::id()))
            .join("trades.db");
        let _ = std::fs::remove_file(&path);

        {
            let ledger = SqliteLedger::open(&path).unwrap();
            ledger
                .append_batch(vec![open_long(100.0, 1.0).at(ts(0)), close_long(90.0, 1.0).at(ts(1))])
                .unwrap();
        }
        let ledger = SqliteLedger::open(&path).unwrap();
        assert_eq!(ledger.all().unwrap().len(), 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejected_batch_writes_nothing() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let mut bad = open_long(100.0, 1.0);
        bad.symbol.clear();
        assert!(ledger.append_batch(vec![open_long(100.0, 1.0), bad]).is_err());
        assert!(ledger.all().unwrap().is_empty());
    }
}
