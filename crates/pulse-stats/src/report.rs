//! 보고용 텍스트 표 렌더링.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use pulse_core::DecimalExt;
use rust_decimal::Decimal;

use crate::store::{ChannelStats, GlobalStats};

/// 통계 보고서 렌더러.
///
/// 출처 ID를 표시 이름으로 바꿔 출력합니다. 이름이 없으면 ID를 그대로 씁니다.
#[derive(Debug, Clone, Default)]
pub struct StatsReport {
    names: HashMap<String, String>,
}

impl StatsReport {
    /// 출처 이름 매핑으로 생성합니다.
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    fn name_of<'a>(&'a self, origin: &'a str) -> &'a str {
        self.names.get(origin).map(String::as_str).unwrap_or(origin)
    }

    /// 출처별 손익 표. 마지막 줄은 합계입니다.
    pub fn render_channels(&self, channels: &BTreeMap<String, ChannelStats>) -> String {
        let rows: Vec<(&str, &ChannelStats)> = channels
            .iter()
            .map(|(origin, stats)| (self.name_of(origin), stats))
            .collect();

        let width = rows
            .iter()
            .map(|(name, _)| name.chars().count())
            .chain(std::iter::once("TOTAL".len()))
            .max()
            .unwrap_or(5)
            .max("Origin".len());

        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}  {:>14}  {:>6}", "Origin", "PnL (USDT)", "Trades");
        let _ = writeln!(out, "{}", "-".repeat(width + 24));

        let mut total_pnl = Decimal::ZERO;
        let mut total_trades = 0u64;
        for (name, stats) in rows {
            total_pnl += stats.cumulative_pnl;
            total_trades += stats.trade_count;
            let _ = writeln!(
                out,
                "{:<width$}  {:>14}  {:>6}",
                name,
                stats.cumulative_pnl.to_signed_string(2),
                stats.trade_count
            );
        }

        let _ = writeln!(out, "{}", "-".repeat(width + 24));
        let _ = writeln!(
            out,
            "{:<width$}  {:>14}  {:>6}",
            "TOTAL",
            total_pnl.to_signed_string(2),
            total_trades
        );
        out
    }

    /// 전체 통계 표.
    pub fn render_global(&self, global: &GlobalStats) -> String {
        let rows = [
            ("Total No. of Trades", global.trade_count.to_string()),
            ("Total PnL", global.total_pnl.to_signed_string(2)),
            ("Maximum Gain", global.max_gain.to_signed_string(2)),
            ("Maximum Drawdown", global.max_drawdown.to_signed_string(2)),
            ("Average Gain", global.average_gain.to_signed_string(2)),
            ("Winning Trades", global.winning_trades.to_string()),
            ("Losing Trades", global.losing_trades.to_string()),
            ("Win Rate", format!("{:.1}%", global.win_rate())),
        ];

        let mut out = String::new();
        for (label, value) in rows {
            let _ = writeln!(out, "{:<20} {:>14}", label, value);
        }
        out
    }
}
