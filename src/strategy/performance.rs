//! Trade outcome aggregation
//!
//! The persistence collaborators and the backtest simulator both roll trade
//! outcomes into the same ledger so their summaries agree.

use serde::{Deserialize, Serialize};

/// Read-only performance feedback used to tune the engine
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
    pub total_trades: u64,
}

/// Running win/loss totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeLedger {
    pub wins: u64,
    pub losses: u64,
    /// Sum of winning PnL percentages
    pub gross_win_pct: f64,
    /// Sum of absolute losing PnL percentages
    pub gross_loss_pct: f64,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, is_win: bool, pnl_percent: f64) {
        if is_win {
            self.wins += 1;
            self.gross_win_pct += pnl_percent;
        } else {
            self.losses += 1;
            self.gross_loss_pct += pnl_percent.abs();
        }
    }

    pub fn merge(&mut self, other: &TradeLedger) {
        self.wins += other.wins;
        self.losses += other.losses;
        self.gross_win_pct += other.gross_win_pct;
        self.gross_loss_pct += other.gross_loss_pct;
    }

    pub fn total_trades(&self) -> u64 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> f64 {
        match self.total_trades() {
            0 => 0.0,
            n => self.wins as f64 / n as f64,
        }
    }

    /// Mean win over mean absolute loss
    pub fn profit_loss_ratio(&self) -> f64 {
        if self.wins == 0 {
            return 0.0;
        }
        let avg_win = self.gross_win_pct / self.wins as f64;
        if self.losses == 0 || self.gross_loss_pct == 0.0 {
            return avg_win;
        }
        avg_win / (self.gross_loss_pct / self.losses as f64)
    }

    pub fn summary(&self) -> PerformanceSummary {
        PerformanceSummary {
            win_rate: self.win_rate(),
            profit_loss_ratio: self.profit_loss_ratio(),
            total_trades: self.total_trades(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ledger() {
        let ledger = TradeLedger::new();
        assert_eq!(ledger.summary(), PerformanceSummary::default());
    }

    #[test]
    fn test_ratio_and_win_rate() {
        let mut ledger = TradeLedger::new();
        ledger.record(true, 4.0);
        ledger.record(true, 2.0);
        ledger.record(false, -1.0);
        ledger.record(false, -2.0);

        let summary = ledger.summary();
        assert_eq!(summary.total_trades, 4);
        assert_eq!(summary.win_rate, 0.5);
        // avg win 3.0 / avg loss 1.5
        assert!((summary.profit_loss_ratio - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_losses_reports_mean_win() {
        let mut ledger = TradeLedger::new();
        ledger.record(true, 3.0);
        assert_eq!(ledger.profit_loss_ratio(), 3.0);
    }

    #[test]
    fn test_merge() {
        let mut a = TradeLedger::new();
        a.record(true, 1.0);
        let mut b = TradeLedger::new();
        b.record(false, -1.0);
        a.merge(&b);
        assert_eq!(a.total_trades(), 2);
        assert_eq!(a.win_rate(), 0.5);
    }
}
