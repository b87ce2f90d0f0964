//! Prompt Template Resolver
//!
//! Maps a template name plus variables to rendered text, both for the prompt
//! sent to a backend and for the message returned to the caller. Templates are
//! registered once at startup; the engine keeps them compiled, and they are
//! never reloaded.
//!
//! Undefined variables are an error rather than an empty string, so a route
//! that forgets to pass a value fails loudly instead of sending a broken prompt.

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, TemplateError};

/// Named template registry backed by a strict Jinja environment
#[derive(Debug)]
pub struct TemplateResolver {
    env: Environment<'static>,
    names: BTreeSet<String>,
}

impl TemplateResolver {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self {
            env,
            names: BTreeSet::new(),
        }
    }

    /// Register (or replace) a template from source text
    pub fn add(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.into())
            .map_err(|e| TemplateError::Invalid {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        debug!("Registered template: {}", name);
        self.names.insert(name);
        Ok(())
    }

    /// Load every file below `dir`. Names are relative paths with `/` separators
    /// (`jokes/prompt.j2`). Returns the number of templates loaded.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, Error> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        collect_files(dir, dir, &mut files)?;
        files.sort();

        for (name, path) in &files {
            let source = fs::read_to_string(path)?;
            self.add(name.clone(), source)?;
        }

        info!("Loaded {} templates from {}", files.len(), dir.display());
        Ok(files.len())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Registered template names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Render `name` with `vars`
    pub fn render<S: Serialize>(&self, name: &str, vars: S) -> Result<String, TemplateError> {
        let template = self.env.get_template(name).map_err(|e| {
            if e.kind() == ErrorKind::TemplateNotFound {
                TemplateError::NotFound(name.to_string())
            } else {
                TemplateError::Invalid {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        template.render(vars).map_err(|e| TemplateError::Render {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, std::path::PathBuf)>,
) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if path.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| Error::internal(format!("template path outside root: {}", e)))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((name, path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> TemplateResolver {
        let mut resolver = TemplateResolver::new();
        resolver
            .add("greet.j2", "Hello {{ name }}{% if excited %}!{% endif %}")
            .unwrap();
        resolver
    }

    #[test]
    fn test_render() {
        let out = resolver()
            .render("greet.j2", json!({"name": "Ada", "excited": true}))
            .unwrap();
        assert_eq!(out, "Hello Ada!");
    }

    #[test]
    fn test_render_is_deterministic() {
        let resolver = resolver();
        let vars = json!({"name": "Ada", "excited": false});
        let a = resolver.render("greet.j2", &vars).unwrap();
        let b = resolver.render("greet.j2", &vars).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_missing_template() {
        let err = resolver().render("nope.j2", json!({})).unwrap_err();
        assert_eq!(err, TemplateError::NotFound("nope.j2".to_string()));
    }

    #[test]
    fn test_missing_variable_is_render_error() {
        let err = resolver().render("greet.j2", json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Render { ref name, .. } if name == "greet.j2"));
    }

    #[test]
    fn test_invalid_source() {
        let mut resolver = TemplateResolver::new();
        let err = resolver.add("broken.j2", "{% if %}").unwrap_err();
        assert!(matches!(err, TemplateError::Invalid { .. }));
        assert!(!resolver.contains("broken.j2"));
    }

    #[test]
    fn test_load_dir_uses_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("jokes")).unwrap();
        fs::write(dir.path().join("jokes/prompt.j2"), "Joke about {{ query }}").unwrap();
        fs::write(dir.path().join("plain.txt"), "static").unwrap();

        let mut resolver = TemplateResolver::new();
        assert_eq!(resolver.load_dir(dir.path()).unwrap(), 2);
        assert_eq!(
            resolver.names().collect::<Vec<_>>(),
            vec!["jokes/prompt.j2", "plain.txt"]
        );
        assert_eq!(
            resolver
                .render("jokes/prompt.j2", json!({"query": "cats"}))
                .unwrap(),
            "Joke about cats"
        );
    }
}
