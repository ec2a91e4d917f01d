use minijinja::{Environment, UndefinedBehavior, Value};

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::TemplateRenderer;
use switchyard_core::ExecutionContext;

/// Renders `{{ path.to.value }}` references against the flattened context
/// view (`message`, `user`, `context`, `metadata`, ...).
///
/// Undefined references render as empty strings.
pub struct MiniJinjaRenderer {
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        Self { env }
    }

    /// Fail on undefined references instead of rendering them empty.
    pub fn strict() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(&self, template: &str, ctx: &ExecutionContext) -> Result<String> {
        // Plain strings skip the template engine.
        if !template.contains("{{") && !template.contains("{%") {
            return Ok(template.to_string());
        }
        let view = Value::from_serialize(ctx.view());
        self.env
            .render_str(template, view)
            .map_err(|e| SwitchyardError::Template(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_core::InboundMessage;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new("org_1")
            .with_message(InboundMessage::new("where is my order?"))
            .with_user(json!({"name": "Ada"}));
        ctx.set("intent", json!("shipping"));
        ctx
    }

    #[test]
    fn test_renders_context_paths() {
        let renderer = MiniJinjaRenderer::new();
        let out = renderer
            .render(
                "{{ user.name }} asked about {{ context.intent }}: {{ message.content }}",
                &ctx(),
            )
            .unwrap();
        assert_eq!(out, "Ada asked about shipping: where is my order?");
    }

    #[test]
    fn test_plain_text_passthrough() {
        let renderer = MiniJinjaRenderer::new();
        assert_eq!(renderer.render("no refs here", &ctx()).unwrap(), "no refs here");
    }

    #[test]
    fn test_undefined_behavior() {
        assert_eq!(
            MiniJinjaRenderer::new().render("[{{ context.missing }}]", &ctx()).unwrap(),
            "[]"
        );
        assert!(MiniJinjaRenderer::strict()
            .render("{{ context.missing }}", &ctx())
            .is_err());
    }

    #[test]
    fn test_syntax_error() {
        let err = MiniJinjaRenderer::new().render("{{ user.name", &ctx()).unwrap_err();
        assert!(matches!(err, SwitchyardError::Template(_)));
    }
}
