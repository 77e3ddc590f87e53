//! Template rendering port (spec.md §1: "rendering of notification message
//! bodies ... treated as a template port", out of scope as a feature but the
//! dispatcher still needs *a* renderer to hand content to channel drivers).

use crate::domain::models::AlertEvent;

/// Minimal built-in renderer: plain key/value substitution. A production
/// deployment is expected to swap this for the real template engine;
/// nothing in the core depends on template syntax beyond this trait.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, event: &AlertEvent, is_recovered: bool) -> String;
}

/// Built-in plain-text renderer.
pub struct PlainTextRenderer;

impl TemplateRenderer for PlainTextRenderer {
    fn render(&self, event: &AlertEvent, is_recovered: bool) -> String {
        let state = if is_recovered { "RECOVERED" } else { "FIRING" };
        let labels = event
            .labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "[{state}] {} ({:?}) {{{labels}}}",
            event.rule_name, event.severity
        )
    }
}
