//! Text rendering for the monitor node: memory bar and status panel.

use chrono::Local;

use crate::types::{Snapshot, Summary, Trend};

pub const BAR_LENGTH: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageLevel {
    Good,
    Warning,
    Critical,
}

impl UsageLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent < 30.0 {
            UsageLevel::Good
        } else if percent < 70.0 {
            UsageLevel::Warning
        } else {
            UsageLevel::Critical
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UsageLevel::Good => "GOOD",
            UsageLevel::Warning => "WARNING",
            UsageLevel::Critical => "CRITICAL",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            UsageLevel::Good => "✅",
            UsageLevel::Warning => "⚠️",
            UsageLevel::Critical => "🚨",
        }
    }

    fn cell(self) -> &'static str {
        match self {
            UsageLevel::Good => "🟢",
            UsageLevel::Warning => "🟡",
            UsageLevel::Critical => "🔴",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBar {
    pub bar: String,
    pub filled: usize,
    pub level: UsageLevel,
}

pub fn memory_bar(percent: f64, length: usize) -> MemoryBar {
    let pct = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
    let filled = ((length as f64 * pct / 100.0).round() as usize).min(length);
    let level = UsageLevel::from_percent(pct);
    let bar = level.cell().repeat(filled) + &"⬜".repeat(length - filled);
    MemoryBar { bar, filled, level }
}

pub fn clock() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// One-line status used as the node's first output.
pub fn status_line(percent: f64, used_mb: f64, total_mb: f64) -> String {
    format!("GPU: {percent:.1}% ({used_mb:.1}MB/{total_mb:.1}MB)")
}

const RULE: &str = "═══════════════════════════════════════════════════════════";
const BOX_TOP: &str = "┌─────────────────────────────────────────────────────────┐";
const BOX_BOTTOM: &str = "└─────────────────────────────────────────────────────────┘";

/// Multi-line panel rendered into the node's UI payload.
pub fn status_display(latest: Option<&Snapshot>, summary: &Summary, warning_threshold: f64) -> String {
    let (name, percent, used, total) = match latest {
        Some(s) => (s.device_name.as_str(), s.percent_used, s.used_mb, s.total_mb),
        None => ("Unknown", 0.0, 0.0, 0.0),
    };
    let bar = memory_bar(percent, BAR_LENGTH);

    let mut lines = vec![
        format!("🎮 {RULE}"),
        format!("🔥 GPU Real-time Monitoring [{}]", clock()),
        RULE.to_string(),
        String::new(),
        format!("📊 GPU: {name}"),
        BOX_TOP.to_string(),
        format!(
            "│ {} Usage: {percent:.1}% ({})",
            bar.level.emoji(),
            bar.level.label()
        ),
        format!("│ 📈 Memory: {used:.1}MB / {total:.1}MB"),
        format!("│ {} │", bar.bar),
        BOX_BOTTOM.to_string(),
        String::new(),
    ];

    if let Some(stats) = summary.stats {
        lines.push(format!(
            "📈 Recent Statistics (last {} samples)",
            summary.samples
        ));
        lines.push(BOX_TOP.to_string());
        lines.push(format!(
            "│ Average: {:.1}% | Max: {:.1}% | Min: {:.1}%",
            stats.average, stats.max, stats.min
        ));
        lines.push(format!("│ Warning threshold: {warning_threshold:.1}%"));
        lines.push(BOX_BOTTOM.to_string());
        lines.push(String::new());
    }

    if summary.trend != Trend::Unknown {
        lines.push(format!("📊 Trend: {}", summary.trend.label()));
        lines.push(String::new());
    }

    if percent > warning_threshold {
        lines.push("🚨 Warning: Memory usage exceeded threshold!".to_string());
        lines.push(String::new());
    }

    lines.push("Real-time monitoring active...".to_string());
    lines.join("\n")
}
