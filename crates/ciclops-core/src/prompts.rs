//! Prompt library for the AI classification fallback
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/ciclops/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Prompt files carry YAML frontmatter followed by `# System` and `# User`
//! sections. `{{var}}` placeholders are replaced at render time and
//! `{{#if var}}...{{/if}}` blocks are dropped when `var` is missing or empty.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

mod defaults {
    pub const CLASSIFY_DOCUMENT: &str = include_str!("../../../prompts/classify_document.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    ClassifyDocument,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassifyDocument => "classify_document",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::ClassifyDocument]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::ClassifyDocument => defaults::CLASSIFY_DOCUMENT,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// Body after the frontmatter (system + user sections)
    pub content: String,
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the user section (or the whole body if it has none)
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        render(self.user_section().unwrap_or(&self.content), vars)
    }
}

/// Prompt library with an override directory and a parse cache
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Embedded defaults only
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("prompt {}", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(path) = self.override_path(id) {
            if path.exists() {
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::InvalidData(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                    override_path: Some(path),
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    pub fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|d| d.join(format!("{}.md", id.as_str())))
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some_and(|p| p.exists())
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("ciclops").join("prompts").join("overrides"))
}

/// Split a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();
    let rest = content.strip_prefix("---").ok_or_else(|| {
        Error::InvalidData("Prompt must start with YAML frontmatter (---)".into())
    })?;
    let end = rest.find("---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let metadata: PromptMetadata = serde_yaml::from_str(rest[..end].trim())
        .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;
    Ok((metadata, rest[end + 3..].trim().to_string()))
}

fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];
    let end = after_header.find("\n# ").unwrap_or(after_header.len());
    Some(after_header[..end].trim())
}

fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = resolve_conditionals(template, vars);
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Keep `{{#if var}}` blocks whose variable is set, drop the rest
fn resolve_conditionals(content: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = content.to_string();
    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_len) = result[var_start..].find("}}") else {
            break;
        };
        let block_start = var_start + var_len + 2;
        let Some(block_len) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let var_name = result[var_start..var_start + var_len].trim();
        let keep = vars.get(var_name).is_some_and(|v| !v.is_empty());
        let block = if keep {
            result[block_start..block_start + block_len].to_string()
        } else {
            String::new()
        };
        result = format!(
            "{}{}{}",
            &result[..if_start],
            block,
            &result[block_start + block_len + 7..]
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_prompt_parses() {
        let mut library = PromptLibrary::embedded_only();
        let prompt = library.get(PromptId::ClassifyDocument).unwrap();
        assert_eq!(prompt.metadata.id, "classify_document");
        assert!(prompt.system_section().unwrap().contains("JSON"));
        assert!(prompt.user_section().unwrap().contains("{{document_text}}"));
        assert!(!prompt.is_override);
    }

    #[test]
    fn test_render_with_conditionals() {
        let mut library = PromptLibrary::embedded_only();
        let prompt = library.get(PromptId::ClassifyDocument).unwrap();

        let mut vars = HashMap::new();
        vars.insert("document_text", "ESTADO DE RESULTADOS");
        vars.insert("line_items", "NOMINAS: 45000");
        vars.insert("filename", "");
        let rendered = prompt.render_user(&vars);
        assert!(rendered.contains("ESTADO DE RESULTADOS"));
        assert!(!rendered.contains("Filename:"));
        assert!(!rendered.contains("Known stores"));
        assert!(!rendered.contains("{{#if"));

        vars.insert("filename", "er_p11.pdf");
        assert!(prompt.render_user(&vars).contains("Filename: er_p11.pdf"));
    }

    #[test]
    fn test_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("classify_document.md"),
            "---\nid: classify_document\nversion: 7\n---\n# System\nS\n# User\nU {{x}}",
        )
        .unwrap();
        let mut library = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(library.has_override(PromptId::ClassifyDocument));
        let prompt = library.get(PromptId::ClassifyDocument).unwrap();
        assert_eq!(prompt.metadata.version, 7);
        let mut vars = HashMap::new();
        vars.insert("x", "1");
        assert_eq!(prompt.render_user(&vars), "U 1");
    }

    #[test]
    fn test_parse_prompt_requires_frontmatter() {
        assert!(parse_prompt("# System\nhi").is_err());
        assert!(parse_prompt("---\nid: x\nversion: 1\n").is_err());
    }
}
