//! Prompt template engine.
//!
//! Templates are self-describing JSON files (name, version, system/user
//! texts, declared variables, sampling parameters). The store validates
//! them on load, caches them by `(name, version)`, serves the latest
//! non-deprecated version when no version is pinned, and hot-reloads by
//! publishing an immutable snapshot behind an atomically swapped `Arc` so
//! in-flight renders keep the snapshot they captured.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::TemplateConfig;
use crate::error::{Result, TemplateError};
use crate::llm::GenerationParams;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("static regex")
});

/// A versioned prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name.
    pub name: String,
    /// Monotonic version.
    pub version: u32,
    /// System prompt text with `{{var}}` placeholders.
    pub system: String,
    /// User prompt text with `{{var}}` placeholders.
    pub user: String,
    /// Declared variables; every placeholder must appear here.
    pub variables: Vec<String>,
    /// Sampling parameters for this template.
    #[serde(default)]
    pub params: GenerationParams,
    /// Whether responses from this template are exempt from the
    /// citation-marker check.
    #[serde(default)]
    pub no_citation: bool,
    /// Deprecated versions are skipped by latest-version lookup but stay
    /// addressable by pin.
    #[serde(default)]
    pub deprecated: bool,
}

/// A rendered prompt ready for the LLM gateway.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// Rendered system text.
    pub system: String,
    /// Rendered user text.
    pub user: String,
    /// Template sampling parameters.
    pub params: GenerationParams,
    /// Source template name.
    pub template_name: String,
    /// Source template version.
    pub template_version: u32,
    /// Citation-check exemption flag.
    pub no_citation: bool,
}

impl PromptTemplate {
    /// Variables referenced by the system and user texts.
    #[must_use]
    pub fn referenced_variables(&self) -> HashSet<String> {
        VARIABLE
            .captures_iter(&self.system)
            .chain(VARIABLE.captures_iter(&self.user))
            .map(|c| c[1].to_string())
            .collect()
    }

    /// Validates that every referenced variable is declared.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UndeclaredVariable`] naming the first
    /// offender.
    pub fn validate(&self) -> Result<()> {
        let declared: HashSet<&str> = self.variables.iter().map(String::as_str).collect();
        let mut referenced: Vec<String> = self.referenced_variables().into_iter().collect();
        referenced.sort();
        for variable in referenced {
            if !declared.contains(variable.as_str()) {
                return Err(TemplateError::UndeclaredVariable {
                    name: self.name.clone(),
                    version: self.version,
                    variable,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Strict substitution: every declared variable must be bound and no
    /// extraneous keys are accepted.
    ///
    /// # Errors
    ///
    /// [`TemplateError::VariableMissing`] or
    /// [`TemplateError::UnknownVariable`].
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<RenderedPrompt> {
        for declared in &self.variables {
            if !vars.contains_key(declared) {
                return Err(TemplateError::VariableMissing {
                    name: declared.clone(),
                }
                .into());
            }
        }
        let mut extraneous: Vec<&String> = vars
            .keys()
            .filter(|k| !self.variables.contains(k))
            .collect();
        extraneous.sort();
        if let Some(unknown) = extraneous.first() {
            return Err(TemplateError::UnknownVariable {
                name: (*unknown).clone(),
            }
            .into());
        }

        let substitute = |text: &str| {
            VARIABLE
                .replace_all(text, |caps: &regex::Captures<'_>| {
                    vars.get(&caps[1]).cloned().unwrap_or_default()
                })
                .into_owned()
        };

        Ok(RenderedPrompt {
            system: substitute(&self.system),
            user: substitute(&self.user),
            params: self.params,
            template_name: self.name.clone(),
            template_version: self.version,
            no_citation: self.no_citation,
        })
    }
}

/// The compiled-in default template, seeded when the template directory
/// lacks a `rag-default`.
#[must_use]
pub fn default_template() -> PromptTemplate {
    PromptTemplate {
        name: "rag-default".to_string(),
        version: 1,
        system: "You are a retrieval-augmented assistant. Answer the question \
using only the numbered sources provided. Cite every claim with its \
source marker, e.g. [Source 1]. If the sources do not contain the \
answer, say so plainly."
            .to_string(),
        user: "Sources:\n{{context}}\n\nQuestion: {{question}}".to_string(),
        variables: vec!["context".to_string(), "question".to_string()],
        params: GenerationParams {
            temperature: 0.2,
            max_tokens: 1024,
            top_p: 1.0,
        },
        no_citation: false,
        deprecated: false,
    }
}

#[derive(Default)]
struct Snapshot {
    by_key: HashMap<(String, u32), Arc<PromptTemplate>>,
    latest: HashMap<String, u32>,
}

impl Snapshot {
    fn insert(&mut self, template: PromptTemplate) -> Result<()> {
        template.validate()?;
        let key = (template.name.clone(), template.version);
        if self.by_key.contains_key(&key) {
            return Err(TemplateError::Duplicate {
                name: template.name,
                version: template.version,
            }
            .into());
        }
        if !template.deprecated {
            let entry = self.latest.entry(template.name.clone()).or_insert(0);
            *entry = (*entry).max(template.version);
        }
        self.by_key.insert(key, Arc::new(template));
        Ok(())
    }
}

/// Versioned template cache with snapshot hot-reload.
pub struct TemplateStore {
    directory: Option<PathBuf>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl TemplateStore {
    /// Loads templates from the configured directory (if any), seeding
    /// the compiled-in default when absent.
    ///
    /// # Errors
    ///
    /// Returns template errors for unreadable files, parse failures,
    /// duplicates, and undeclared variable references.
    pub fn load(config: &TemplateConfig) -> Result<Self> {
        let directory = config.directory.as_ref().map(PathBuf::from);
        let snapshot = Self::build_snapshot(directory.as_deref())?;
        Ok(Self {
            directory,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    fn build_snapshot(directory: Option<&Path>) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();

        if let Some(dir) = directory {
            let entries = std::fs::read_dir(dir).map_err(|e| TemplateError::Load {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            let mut paths: Vec<PathBuf> = entries
                .filter_map(std::result::Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            paths.sort();
            for path in paths {
                let raw = std::fs::read_to_string(&path).map_err(|e| TemplateError::Load {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                let template: PromptTemplate =
                    serde_json::from_str(&raw).map_err(|e| TemplateError::Load {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                snapshot.insert(template)?;
            }
        }

        let has_rag_default = snapshot.by_key.keys().any(|(name, _)| name == "rag-default");
        if !has_rag_default {
            snapshot.insert(default_template())?;
        }

        Ok(snapshot)
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    /// Re-reads the directory and atomically publishes a new snapshot.
    /// In-flight renders keep the snapshot they already captured.
    ///
    /// # Errors
    ///
    /// On any load error the previous snapshot stays in place.
    pub fn reload(&self) -> Result<()> {
        let fresh = Self::build_snapshot(self.directory.as_deref())?;
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = Arc::new(fresh);
        }
        tracing::info!("template snapshot reloaded");
        Ok(())
    }

    /// Fetches a template by name, either pinned or latest
    /// non-deprecated.
    ///
    /// # Errors
    ///
    /// [`TemplateError::NotFound`] when nothing matches.
    pub fn get(&self, name: &str, version: Option<u32>) -> Result<Arc<PromptTemplate>> {
        let snapshot = self.current();
        let resolved_version = match version {
            Some(v) => v,
            None => *snapshot.latest.get(name).ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
                version: "latest".to_string(),
            })?,
        };
        snapshot
            .by_key
            .get(&(name.to_string(), resolved_version))
            .cloned()
            .ok_or_else(|| {
                TemplateError::NotFound {
                    name: name.to_string(),
                    version: resolved_version.to_string(),
                }
                .into()
            })
    }

    /// Renders a template against the given variables.
    ///
    /// # Errors
    ///
    /// Lookup and render errors per [`TemplateStore::get`] and
    /// [`PromptTemplate::render`].
    pub fn render(
        &self,
        name: &str,
        version: Option<u32>,
        vars: &HashMap<String, String>,
    ) -> Result<RenderedPrompt> {
        self.get(name, version)?.render(vars)
    }

    /// Names of all loaded templates.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let snapshot = self.current();
        let mut names: Vec<String> = snapshot
            .by_key
            .keys()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
