use crate::analytics::AnalyticsSummary;
use crate::core::error::PromptgenError;
use crate::core::types::{GenerationResponse, Role};
use crate::dispatcher::ComparisonResult;
use crate::registry::ModelDescriptor;
use crate::session::{ChatMessage, Conversation};
use crate::usage::UsageAccumulator;
use crate::utils::text::{display_width, truncate, wrap_text};
use chrono::{DateTime, Utc};
use console::style;
use termimad::MadSkin;

fn box_width(max: usize) -> usize {
    let columns = console::Term::stdout().size().1 as usize;
    columns.saturating_sub(4).clamp(40, max)
}

/// Heuristic used to pick markdown rendering over the plain box.
pub fn looks_like_markdown(text: &str) -> bool {
    text.contains("```")
        || text.contains('`')
        || text.contains("**")
        || text.lines().any(|l| {
            let l = l.trim_start();
            l.starts_with('#') || l.starts_with("- ") || l.starts_with("* ")
        })
}

pub fn response_footer(response: &GenerationResponse) -> String {
    let mut parts = vec![
        response.model.clone(),
        format!("{} tokens", response.tokens()),
        format!("{} ms", response.latency_ms),
    ];
    if response.cost > 0.0 {
        parts.push(format!("${:.6}", response.cost));
    }
    parts.join(" · ")
}

/// Prints `text` in a bordered box, wrapping by display width.
pub fn display_boxed(title: &str, text: &str) {
    let max_width = box_width(120);
    let inner = max_width.saturating_sub(4);

    let lines: Vec<String> = text.lines().flat_map(|l| wrap_text(l, inner)).collect();
    let content_width = lines.iter().map(|l| display_width(l)).max().unwrap_or(0);
    let width = (content_width + 4).clamp(display_width(title) + 4, max_width);

    println!("\n{}", style(title).bold().blue());
    println!("{}", style(format!("┌{}┐", "─".repeat(width - 2))).dim().blue());
    for line in lines {
        let padding = width.saturating_sub(display_width(&line) + 3);
        println!("│ {}{}│", style(&line).bold().white(), " ".repeat(padding));
    }
    println!("{}", style(format!("└{}┘", "─".repeat(width - 2))).dim().blue());
}

pub fn display_markdown(text: &str) {
    let skin = MadSkin::default();
    println!();
    skin.print_text(text);
}

pub fn display_response(response: &GenerationResponse) {
    if looks_like_markdown(&response.content) {
        display_markdown(&response.content);
    } else {
        display_boxed("🤖 AI RESPONSE", &response.content);
    }
    println!("{}", style(response_footer(response)).dim());
}

pub fn message_footer(message: &ChatMessage) -> String {
    let model = message
        .metadata
        .as_ref()
        .and_then(|m| m.get("model"))
        .and_then(|m| m.as_str())
        .unwrap_or("assistant");
    let tokens = message.usage.map(|u| u.total_tokens).unwrap_or_default();
    format!("{} · {} tokens", model, tokens)
}

/// Footer printed after streamed output, which is already on screen.
pub fn display_stream_footer(response: &GenerationResponse) {
    if !response.content.ends_with('\n') {
        println!();
    }
    println!("{}", style(response_footer(response)).dim());
}

pub fn display_models(models: &[&ModelDescriptor], default_model: &str) {
    let id_width = models.iter().map(|m| m.id.len()).max().unwrap_or(2).max(2);
    let name_width = models.iter().map(|m| m.name.len()).max().unwrap_or(4).max(4);

    println!(
        "  {:<id_width$}  {:<name_width$}  {:<11}  {:>7}  {}",
        style("ID").bold(),
        style("NAME").bold(),
        style("PROVIDER").bold(),
        style("MAX").bold(),
        style("PRICE").bold(),
    );
    for model in models {
        let marker = if model.id == default_model { "*" } else { " " };
        let price = if model.is_free {
            style("free".to_string()).green()
        } else {
            style(format!("${}/token", model.cost_per_token)).yellow()
        };
        let id = if model.is_active() {
            style(model.id.clone()).cyan()
        } else {
            style(model.id.clone()).dim()
        };
        println!(
            "{} {:<id_width$}  {:<name_width$}  {:<11}  {:>7}  {}",
            marker,
            id,
            model.name,
            model.provider.as_str(),
            model.max_tokens,
            price,
        );
    }
}

pub fn display_comparison(results: &[ComparisonResult]) {
    for result in results {
        match &result.result {
            Ok(response) => {
                display_boxed(&format!("🤖 {}", result.model), &response.content);
                println!("{}", style(response_footer(response)).dim());
            }
            Err(e) => {
                println!("\n{}", style(format!("🤖 {}", result.model)).bold().blue());
                display_error(e);
            }
        }
    }
}

pub fn display_conversation(conversation: &Conversation) {
    println!(
        "\n{} {}",
        style(&conversation.title).bold().underlined(),
        style(format!("({})", conversation.model)).dim()
    );
    for message in &conversation.messages {
        let role = match message.role {
            Role::System => style("System").bold().yellow(),
            Role::User => style("User").bold().cyan(),
            Role::Assistant => style("Assistant").bold().green(),
        };
        println!("\n{}: {}", role, message.content);
    }
}

pub fn format_usage(usage: &UsageAccumulator, now: DateTime<Utc>) -> String {
    let lifetime = usage.lifetime();
    let month = usage.current_month(now);
    format!(
        "{}\n  this month: {} requests, {} tokens (${:.6})\n  all time:   {} requests, {} tokens (${:.6})",
        style("Usage").bold().underlined(),
        month.requests,
        month.total_tokens,
        month.cost,
        lifetime.requests,
        lifetime.total_tokens,
        lifetime.cost,
    )
}

pub fn display_analytics(summary: &AnalyticsSummary) {
    println!("{}", style("Activity").bold().underlined());
    println!("  events recorded: {}", summary.total_events);
    println!("  events today:    {}", summary.engagement.events_today);
    println!("  active days:     {}", summary.engagement.active_days);
    println!(
        "  sessions:        {} (avg {}s, {:.1} events each)",
        summary.engagement.sessions,
        summary.engagement.average_session_secs,
        summary.engagement.events_per_session
    );

    if !summary.popular_categories.is_empty() {
        println!("\n{}", style("Popular categories").bold());
        for entry in &summary.popular_categories {
            println!("  {:<24} {}", truncate(&entry.category, 24), entry.count);
        }
    }

    if !summary.events_by_kind.is_empty() {
        println!("\n{}", style("Events by kind").bold());
        for (kind, count) in &summary.events_by_kind {
            println!("  {:<24} {}", kind.as_str(), count);
        }
    }

    if let Some(peak) = summary.daily_counts.values().max().copied() {
        println!("\n{}", style("Last days").bold());
        for (day, count) in summary.daily_counts.iter().rev().take(7).rev() {
            let bar = "█".repeat(((*count * 30) / peak.max(1)) as usize);
            println!("  {}  {:>4} {}", day, count, style(bar).cyan());
        }
    }
}

pub fn display_error(error: &PromptgenError) {
    eprintln!("{} {}", style("✗").bold().red(), style(error).red());
}

pub fn display_cancelled() {
    println!("\n{}", style("🚫 Generation cancelled").bold().red());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TokenUsage;
    use serde_json::Value;

    fn response(cost: f64) -> GenerationResponse {
        GenerationResponse {
            content: "Hi".to_string(),
            model: "glm-4.5".to_string(),
            usage: TokenUsage::new(1, 2, None),
            cost,
            latency_ms: 42,
            timestamp: Utc::now(),
            raw: Value::Null,
        }
    }

    #[test]
    fn footer_omits_zero_cost() {
        assert_eq!(response_footer(&response(0.0)), "glm-4.5 · 3 tokens · 42 ms");
        assert!(response_footer(&response(0.5)).ends_with("$0.500000"));
    }

    #[test]
    fn markdown_detection() {
        assert!(looks_like_markdown("# Title\ntext"));
        assert!(looks_like_markdown("use `cargo`"));
        assert!(looks_like_markdown("- item"));
        assert!(!looks_like_markdown("Just a plain sentence."));
    }

    #[test]
    fn usage_lists_month_and_lifetime() {
        let mut usage = UsageAccumulator::default();
        let now = Utc::now();
        usage.record(&TokenUsage::new(10, 5, None), 0.0, now);

        let text = format_usage(&usage, now);

        assert!(text.contains("this month: 1 requests, 15 tokens"));
        assert!(text.contains("all time:   1 requests, 15 tokens"));
    }
}
