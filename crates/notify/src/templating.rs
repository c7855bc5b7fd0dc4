//! Minijinja template rendering for notification messages.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call. Any serializable
//! value can be used as the render context.

use serde::Serialize;

use crate::traits::NotifyError;

/// Renders notification templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    /// Create a new template renderer.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env.add_filter("abs", abs_filter);
        env.add_filter("pluralize", pluralize_filter);

        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<C: Serialize>(&self, template_str: &str, ctx: &C) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Validate that a template string parses without errors.
    ///
    /// This does not evaluate the template — it only checks syntax.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

fn abs_filter(value: i64) -> i64 {
    value.abs()
}

/// `{{ n }} day{{ n | pluralize }}` renders "1 day" / "3 days".
fn pluralize_filter(value: i64) -> &'static str {
    if value.abs() == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Ctx {
        audit: &'static str,
        location: &'static str,
        days: i64,
        due: Option<&'static str>,
    }

    fn sample() -> Ctx {
        Ctx {
            audit: "Medication Audit",
            location: "Oak House",
            days: -3,
            due: Some("2025-03-05"),
        }
    }

    #[test]
    fn render_basic_template() {
        let renderer = TemplateRenderer::new();
        let result = renderer
            .render("{{ audit }} at {{ location }}", &sample())
            .unwrap();
        assert_eq!(result, "Medication Audit at Oak House");
    }

    #[test]
    fn render_abs_and_pluralize() {
        let renderer = TemplateRenderer::new();
        let tpl = "{{ days | abs }} day{{ days | pluralize }} late";
        assert_eq!(renderer.render(tpl, &sample()).unwrap(), "3 days late");

        let one = Ctx { days: 1, ..sample() };
        assert_eq!(renderer.render(tpl, &one).unwrap(), "1 day late");
    }

    #[test]
    fn render_upper_lower_filters() {
        let renderer = TemplateRenderer::new();
        assert_eq!(
            renderer.render("{{ location | upper }}", &sample()).unwrap(),
            "OAK HOUSE"
        );
        assert_eq!(
            renderer.render("{{ location | lower }}", &sample()).unwrap(),
            "oak house"
        );
    }

    #[test]
    fn render_optional_fields() {
        let renderer = TemplateRenderer::new();
        let ctx = Ctx { due: None, ..sample() };
        let result = renderer
            .render("{% if due %}due {{ due }}{% else %}undated{% endif %}", &ctx)
            .unwrap();
        assert_eq!(result, "undated");
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        match renderer.render("{{ unclosed", &sample()) {
            Err(NotifyError::Template(msg)) => assert!(!msg.is_empty()),
            other => panic!("Expected Template error, got: {:?}", other),
        }
    }

    #[test]
    fn validate_valid_and_invalid_templates() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.validate("Hello {{ audit }}").is_ok());
        assert!(renderer.validate("{{ unclosed").is_err());
    }
}
