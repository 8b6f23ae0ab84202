//! Table rendering for CLI output

use comfy_table::{Cell, Color, ContentArrangement, Table};
use research_core::{ProviderId, TaskType};
use research_fetch::{BatchSummary, FetchOutcome};
use research_router::{
    CircuitState, MetricsSnapshot, OrchestratorConfig, ProviderFailure, RouteResult, RoutingPolicy,
};
use std::time::Duration;

const PREVIEW_CHARS: usize = 60;

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(headers);
    table
}

fn millis(duration: Duration) -> String {
    format!("{} ms", duration.as_millis())
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

fn state_cell(state: CircuitState) -> Cell {
    let color = match state {
        CircuitState::Closed => Color::Green,
        CircuitState::HalfOpen => Color::Yellow,
        CircuitState::Open => Color::Red,
    };
    Cell::new(state).fg(color)
}

pub fn route_summary(result: &RouteResult) -> Table {
    let mut table = table(&["Provider", "Fallbacks", "Confidence", "Latency", "Cost"]);
    table.add_row(vec![
        result.provider_used.to_string(),
        result.fallback_count.to_string(),
        format!("{:.2}", result.confidence_score),
        millis(result.total_latency),
        format!("{:.6}", result.cost_estimate),
    ]);
    table
}

pub fn failures(failures: &[ProviderFailure]) -> Table {
    let mut table = table(&["#", "Provider", "Reason"]);
    for (i, failure) in failures.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            failure.provider.to_string(),
            failure.reason.to_string(),
        ]);
    }
    table
}

pub fn metrics(snapshot: &MetricsSnapshot) -> Table {
    let mut table = table(&[
        "Provider", "State", "Attempts", "Successes", "Failures", "Skipped", "Throttled", "Avg latency",
    ]);
    for (id, provider) in &snapshot.providers {
        let state = provider
            .breaker
            .as_ref()
            .map_or_else(|| Cell::new("-"), |breaker| state_cell(breaker.state));
        table.add_row(vec![
            Cell::new(id),
            state,
            Cell::new(provider.attempts),
            Cell::new(provider.successes),
            Cell::new(provider.failures),
            Cell::new(provider.skipped),
            Cell::new(provider.throttled),
            Cell::new(format!("{:.0} ms", provider.avg_latency_ms)),
        ]);
    }
    table
}

pub fn providers(config: &OrchestratorConfig) -> Table {
    let mut table = table(&[
        "Id", "Kind", "Model", "Capabilities", "Cost/1k", "Quality", "Speed", "Reliability", "Rate/min", "API key",
    ]);
    for entry in &config.providers {
        let capabilities = entry
            .capabilities
            .iter()
            .map(TaskType::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let rate = if entry.rate_limit_per_minute == 0 {
            "unlimited".to_string()
        } else {
            entry.rate_limit_per_minute.to_string()
        };
        let key = if std::env::var_os(entry.api_key_env()).is_some() {
            Cell::new("set").fg(Color::Green)
        } else {
            Cell::new(format!("missing ({})", entry.api_key_env())).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&entry.id),
            Cell::new(entry.kind.as_str()),
            Cell::new(&entry.model),
            Cell::new(capabilities),
            Cell::new(entry.cost_weight),
            Cell::new(entry.quality_rating),
            Cell::new(entry.speed_rating),
            Cell::new(entry.reliability),
            Cell::new(rate),
            key,
        ]);
    }
    table
}

pub fn chains(policy: &RoutingPolicy) -> Table {
    let mut table = table(&["Task type", "Fallback chain"]);
    for (task_type, chain) in policy.iter() {
        let chain = chain
            .iter()
            .map(ProviderId::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        table.add_row(vec![task_type.to_string(), chain]);
    }
    table
}

pub fn fetch_outcomes(outcomes: &[FetchOutcome]) -> Table {
    let mut table = table(&["Target", "Status", "Latency", "Result"]);
    for outcome in outcomes {
        let (status, detail) = match &outcome.result {
            Ok(payload) => (
                Cell::new("ok").fg(Color::Green),
                format!("{} bytes: {}", payload.len(), preview(payload)),
            ),
            Err(err) => (Cell::new(err.kind()).fg(Color::Red), err.to_string()),
        };
        table.add_row(vec![
            Cell::new(&outcome.job.target),
            status,
            Cell::new(millis(outcome.latency)),
            Cell::new(detail),
        ]);
    }
    table
}

pub fn batch_summary(summary: &BatchSummary) -> String {
    format!(
        "{} jobs: {} succeeded, {} failed, {} timed out, {} cancelled",
        summary.total, summary.succeeded, summary.failed, summary.timed_out, summary.cancelled
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_fetch::{FetchError, FetchJob};
    use research_llm::ProviderError;
    use research_router::FailureReason;

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b\tc"), "a b c");
        let long = "x".repeat(100);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_chains_table() {
        let policy = RoutingPolicy::new().with_chain(TaskType::Research, ["groq", "gemini"]);
        let rendered = chains(&policy).to_string();
        assert!(rendered.contains("research"));
        assert!(rendered.contains("groq -> gemini"));
    }

    #[test]
    fn test_failures_table() {
        let rows = [
            ProviderFailure::new(
                ProviderId::from("groq"),
                FailureReason::Provider(ProviderError::Transient("502".into())),
            ),
            ProviderFailure::new(ProviderId::from("gemini"), FailureReason::CircuitOpen(CircuitState::Open)),
        ];
        let rendered = failures(&rows).to_string();
        assert!(rendered.contains("groq"));
        assert!(rendered.contains("gemini"));
    }

    #[test]
    fn test_fetch_table_and_summary() {
        let outcomes = vec![
            FetchOutcome {
                job: FetchJob::new("https://example.com/a"),
                result: Ok("<html>hello</html>".into()),
                latency: Duration::from_millis(42),
            },
            FetchOutcome {
                job: FetchJob::new("https://example.com/b"),
                result: Err(FetchError::BatchDeadlineExceeded),
                latency: Duration::from_secs(5),
            },
        ];
        let rendered = fetch_outcomes(&outcomes).to_string();
        assert!(rendered.contains("42 ms"));
        assert!(rendered.contains("batch_deadline_exceeded"));

        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(
            batch_summary(&summary),
            "2 jobs: 1 succeeded, 0 failed, 0 timed out, 1 cancelled"
        );
    }
}
