//! Display text for a completed answer: the answer followed by a two-line
//! footer with response time and cost.

use crate::llm::GenerationMetadata;

const TIME_LABEL: &str = "⏱ Время обработки: ";
const COST_LABEL: &str = "💰 Стоимость запроса: ";
const TIME_UNIT: &str = "с";
const CURRENCY: &str = "₽";

pub fn format_response(answer: &str, metadata: &GenerationMetadata) -> String {
    format!(
        "{}\n\n{}{:.2}{}\n{}{:.5}{}",
        answer, TIME_LABEL, metadata.response_time, TIME_UNIT, COST_LABEL, metadata.cost, CURRENCY
    )
}

/// Recovers `(response_time, cost)` from a formatted reply.
pub fn parse_footer(display: &str) -> Option<(f64, f64)> {
    let (_, footer) = split_footer(display)?;
    let mut lines = footer.lines();

    let time = lines
        .next()?
        .strip_prefix(TIME_LABEL)?
        .strip_suffix(TIME_UNIT)?
        .parse()
        .ok()?;
    let cost = lines
        .next()?
        .strip_prefix(COST_LABEL)?
        .strip_suffix(CURRENCY)?
        .parse()
        .ok()?;

    Some((time, cost))
}

/// Answer portion of a formatted reply; the input unchanged when it carries no footer.
pub fn strip_footer(display: &str) -> &str {
    split_footer(display).map_or(display, |(answer, _)| answer)
}

fn split_footer(display: &str) -> Option<(&str, &str)> {
    let marker = format!("\n\n{}", TIME_LABEL);
    let at = display.rfind(&marker)?;
    Some((&display[..at], &display[at + 2..]))
}
