//! Progress arithmetic and status texts for a running broadcast.

use super::report::BroadcastReport;

/// Percent complete after `index` of `total` users, rounded down.
#[must_use]
pub const fn percent(index: usize, total: usize) -> usize {
    if total == 0 {
        return 100;
    }
    index * 100 / total
}

/// Percent to publish after `index` of `total`, if any.
///
/// Only multiples of five that differ from the last published value are
/// published, which keeps edits to about twenty per run.
#[must_use]
pub fn next_publish(index: usize, total: usize, last: Option<usize>) -> Option<usize> {
    let percent = percent(index, total);
    (percent % 5 == 0 && last != Some(percent)).then_some(percent)
}

/// Text of the progress message right after it is created.
#[must_use]
pub fn started_text() -> String {
    "📢 Broadcast started...\n📊 0%".to_string()
}

/// Text of the progress message while running.
#[must_use]
pub fn running_text(index: usize, total: usize, percent: usize) -> String {
    format!("📢 Broadcast in progress...\n📊 {index} / {total} sent ({percent}%)")
}

/// Terminal text for a completed run.
#[must_use]
pub fn completed_text(report: &BroadcastReport) -> String {
    format!(
        "✅ Broadcast Completed\n\n📤 Sent: {}\n🚫 Blocked: {}\n📊 Total: {}",
        report.sent, report.blocked, report.total
    )
}

/// Terminal text for a cancelled run.
///
/// "Stopped at" is the 1-based position of the first user left out.
#[must_use]
pub fn cancelled_text(report: &BroadcastReport) -> String {
    let stopped_at = (report.processed + 1).min(report.total);
    format!(
        "❌ Broadcast Cancelled\n\n📤 Sent: {}\n🚫 Blocked: {}\n📊 Stopped at: {stopped_at}/{}",
        report.sent, report.blocked, report.total
    )
}
