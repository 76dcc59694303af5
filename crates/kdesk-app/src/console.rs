//! Terminal output: notifications and tables.

use std::fmt::Write as _;

use kdesk_broker::{LogNotifier, Notifier, NotifyLevel, SessionStatus};
use kdesk_core::{Algorithm, Credentials};
use kdesk_store::DisplayRow;
use kdesk_workflow::PositionRow;

/// Prints each message to the terminal and logs it once.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        let line = format!("[{}] {message}", level.as_str().to_ascii_uppercase());
        match level {
            NotifyLevel::Warning | NotifyLevel::Error => eprintln!("{line}"),
            NotifyLevel::Info | NotifyLevel::Success => println!("{line}"),
        }
        LogNotifier.notify(level, message);
    }
}

fn mask(value: &str) -> String {
    let value = value.trim();
    match value.chars().count() {
        0 => "(not set)".to_string(),
        n if n <= 4 => "****".to_string(),
        _ => {
            let tail: String = value.chars().skip(value.chars().count() - 4).collect();
            format!("****{tail}")
        }
    }
}

/// Settings with secrets masked.
pub fn settings_summary(creds: &Credentials) -> String {
    let mut out = String::new();
    let api_key = if creds.has_api_key() {
        creds.api_key.trim()
    } else {
        "(not set)"
    };
    let redirect_url = if creds.redirect_url.trim().is_empty() {
        "(not set)"
    } else {
        creds.redirect_url.trim()
    };
    let _ = writeln!(out, "api_key        {api_key}");
    let _ = writeln!(out, "api_secret     {}", mask(&creds.api_secret));
    let _ = writeln!(out, "request_token  {}", mask(&creds.request_token));
    let _ = writeln!(out, "access_token   {}", mask(&creds.access_token));
    let _ = writeln!(out, "redirect_url   {redirect_url}");
    let _ = writeln!(out, "max_positions  {}", creds.max_positions);
    let _ = writeln!(out, "risk_per_trade {}", creds.risk_per_trade);
    let _ = writeln!(out, "auto_trade     {}", creds.auto_trade);
    out
}

pub fn session_line(status: &SessionStatus) -> String {
    if status.connected {
        format!("● Connected  {}", status.message)
    } else {
        format!("○ Disconnected  {}", status.message)
    }
}

pub fn algorithms_table(algorithms: &[Algorithm]) -> String {
    if algorithms.is_empty() {
        return "No algorithms saved\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<24} {:<28} {:<20}", "ID", "NAME", "UPDATED");
    for a in algorithms {
        let _ = writeln!(
            out,
            "{:<24} {:<28} {:<20}",
            a.id,
            a.name,
            a.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    out
}

pub fn deployments_table(rows: &[DisplayRow]) -> String {
    if rows.is_empty() {
        return "No active deployments\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24} {:<28} {:<8} {:>12} {:>6}  {:<19}",
        "ID", "ALGORITHM", "STATUS", "P&L", "TRADES", "STARTED"
    );
    for row in rows {
        let name = if row.source_missing {
            format!("{} (deleted)", row.algorithm_name)
        } else {
            row.algorithm_name.clone()
        };
        let _ = writeln!(
            out,
            "{:<24} {:<28} {:<8} {:>12} {:>6}  {:<19}",
            row.id, name, row.status.as_str(), row.profit, row.trades, row.started_at
        );
    }
    out
}

pub fn positions_table(rows: &[PositionRow]) -> String {
    if rows.is_empty() {
        return "No open positions\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20} {:>8} {:>12} {:>12} {:>12} {:>8}",
        "SYMBOL", "QTY", "AVG", "LTP", "P&L", "CHG%"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<20} {:>8} {:>12.2} {:>12.2} {:>12.2} {:>7.2}%",
            row.symbol,
            row.quantity,
            row.average_price,
            row.last_price,
            row.pnl,
            row.day_change_pct
        );
    }
    out
}
