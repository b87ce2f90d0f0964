//! Built-in templates
//!
//! Compiled into the binary; `RELAY_TEMPLATE_DIR` can add to or override them.

use relay_core::{Error, TemplateResolver};
use std::path::Path;
use tracing::info;

const BUILTIN: &[(&str, &str)] = &[
    ("jokes/prompt.j2", include_str!("../templates/jokes/prompt.j2")),
    ("jokes/response.j2", include_str!("../templates/jokes/response.j2")),
    ("text/prompt.j2", include_str!("../templates/text/prompt.j2")),
    ("text/line.j2", include_str!("../templates/text/line.j2")),
    ("chat/prompt.j2", include_str!("../templates/chat/prompt.j2")),
    ("chat/system.j2", include_str!("../templates/chat/system.j2")),
    ("chat/response.j2", include_str!("../templates/chat/response.j2")),
    ("chat/chunk.j2", include_str!("../templates/chat/chunk.j2")),
    ("documents/prompt.j2", include_str!("../templates/documents/prompt.j2")),
    ("documents/response.j2", include_str!("../templates/documents/response.j2")),
];

/// Resolver holding only the built-in templates
pub fn builtin() -> Result<TemplateResolver, Error> {
    let mut resolver = TemplateResolver::new();
    for (name, source) in BUILTIN {
        resolver.add(*name, *source)?;
    }
    Ok(resolver)
}

/// Built-in templates plus everything under `dir`, which wins on name clashes
pub fn load(dir: Option<&Path>) -> Result<TemplateResolver, Error> {
    let mut resolver = builtin()?;
    if let Some(dir) = dir {
        if !dir.is_dir() {
            return Err(Error::config(format!(
                "Template directory not found: {}",
                dir.display()
            )));
        }
        resolver.load_dir(dir)?;
    }
    info!("📄 {} templates available", resolver.names().count());
    Ok(resolver)
}
