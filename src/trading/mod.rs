pub mod dashboard;
pub mod execution_gate;
pub mod exit_monitor;
pub mod ledger;
pub mod paper_trader;
pub mod performance;
pub mod position_tracker;
pub mod sqlite_ledger;

pub use dashboard::{AiModelInfo, AiStatus, DashboardState, DashboardView};
pub use execution_gate::{ExecutionGate, GateDecision, GateRequest, RejectReason};
pub use exit_monitor::{ExitCheck, ExitMonitor, ExitTrigger};
pub use ledger::{Ledger, MemoryLedger};
pub use paper_trader::{ExecutionOutcome, PaperTrader};
pub use performance::{
    profit_series, PerformanceAggregator, PerformanceReport, PerformanceSnapshot,
    PerformanceStatus, PerformanceView, ProfitPoint,
};
pub use position_tracker::{DataQualityWarning, Position, PositionTracker, RoundTrip};
pub use sqlite_ledger::SqliteLedger;
