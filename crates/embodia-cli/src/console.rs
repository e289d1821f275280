//! Terminal rendering of round outcomes.

use colored::Colorize;

use embodia_runtime::{Responder, RoundOutcome};
use embodia_types::{ActionResult, AgentError};

/// Prints each reply and its per-action results to stdout.
pub struct ConsoleResponder;

impl Responder for ConsoleResponder {
    fn on_reply(&mut self, outcome: &RoundOutcome) {
        println!();
        println!("  {} {}", "agent:".bold().green(), outcome.response);
        for result in &outcome.results {
            println!("    {}", render_result(result));
        }
        if let Some(fault) = &outcome.safety_fault {
            println!("  {} {}", "⚠".red().bold(), fault.to_string().red().bold());
        }
        println!();
    }

    fn on_error(&mut self, error: &AgentError) {
        println!();
        println!("  {} {}", "round failed:".red(), error);
        println!();
    }
}

/// One line per dispatched call, uncolored so it can be asserted on.
pub(crate) fn describe(result: &ActionResult) -> String {
    let mut line = format!("#{} {}", result.index, result.call);
    if let Some(out) = &result.output {
        line.push_str(&format!(" → {out}"));
    }
    if let Some(objects) = &result.observation {
        let labels: Vec<&str> = objects.iter().map(|o| o.label.as_str()).collect();
        line.push_str(&format!(" [sees: {}]", labels.join(", ")));
    }
    if let Some(err) = &result.error {
        line.push_str(&format!(" ({err})"));
    }
    line
}

fn render_result(result: &ActionResult) -> String {
    let mark = if result.succeeded { "✓".green() } else { "✗".red() };
    format!("{mark} {}", describe(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embodia_types::{ActionCall, ErrorKind, VisualObject};

    #[test]
    fn describe_includes_output_and_observation() {
        let call = ActionCall::new("top_view_shot", vec![]);
        let result = ActionResult::success(
            2,
            call,
            Some("ok".into()),
            Some(vec![VisualObject::new("red block")]),
        );
        assert_eq!(describe(&result), "#2 top_view_shot() → ok [sees: red block]");
    }

    #[test]
    fn describe_includes_error() {
        let call = ActionCall::new("pump_on", vec![]);
        let result = ActionResult::failure(0, call, ErrorKind::Halted);
        let line = describe(&result);
        assert!(line.starts_with("#0 pump_on()"));
        assert!(line.contains("session halting"));
    }
}
