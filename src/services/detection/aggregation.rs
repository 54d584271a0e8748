// Aggregation Logic
// Rolls per-sentence results up into document summary statistics

use crate::models::{Classification, OverallStats, SentenceResult};

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = count as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Count classifications; percentages are rounded to 2 decimals.
pub fn summarize<'a, I>(classifications: I) -> OverallStats
where
    I: IntoIterator<Item = &'a Classification>,
{
    let mut stats = OverallStats::default();
    for c in classifications {
        stats.total_sentences += 1;
        match c {
            Classification::Human => stats.human_count += 1,
            Classification::Suspicious => stats.suspicious_count += 1,
            Classification::Ai => stats.ai_count += 1,
        }
    }
    let total = stats.total_sentences;
    stats.human_percentage = percentage(stats.human_count, total);
    stats.suspicious_percentage = percentage(stats.suspicious_count, total);
    stats.ai_percentage = percentage(stats.ai_count, total);
    stats
}

pub fn summarize_results(results: &[SentenceResult]) -> OverallStats {
    summarize(results.iter().map(|r| &r.classification))
}
