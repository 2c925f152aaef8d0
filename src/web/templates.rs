//! Page templates
//!
//! All templates are compiled into the binary with `include_str!` and
//! registered into a single Tera instance at startup. `base.html` is added
//! first so the inheritance chains resolve in one pass.

use anyhow::{Context as _, Result};
use axum::response::Html;
use tera::Tera;

use super::middleware::WebError;

/// Template names paired with their compiled-in sources, base first
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("password.html", include_str!("../../templates/password.html")),
    ("dashboard.html", include_str!("../../templates/dashboard.html")),
    ("vehicle_new.html", include_str!("../../templates/vehicle_new.html")),
    ("vehicle_detail.html", include_str!("../../templates/vehicle_detail.html")),
    ("vehicle_edit.html", include_str!("../../templates/vehicle_edit.html")),
    ("users.html", include_str!("../../templates/users.html")),
    ("user_new.html", include_str!("../../templates/user_new.html")),
    ("user_edit.html", include_str!("../../templates/user_edit.html")),
];

/// Build the template engine with every page template registered
pub fn build_templates() -> Result<Tera> {
    let mut tera = Tera::default();
    for (name, content) in TEMPLATES {
        tera.add_raw_template(name, content)
            .with_context(|| format!("Failed to add template {}", name))?;
    }
    tera.build_inheritance_chains()
        .context("Failed to build template inheritance chains")?;
    Ok(tera)
}

/// Render a template to an HTML response
pub fn render(
    templates: &Tera,
    name: &str,
    context: &tera::Context,
) -> Result<Html<String>, WebError> {
    let html = templates
        .render(name, context)
        .map_err(|e| anyhow::anyhow!("Failed to render template {}: {}", name, e))?;
    Ok(Html(html))
}
