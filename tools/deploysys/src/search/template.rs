//! The template module owns loading the search definition templates and filling in their
//! placeholder tokens.
//!
//! Templates are JSON documents containing literal tokens such as `{{index-name}}`.  Rendering is
//! a single pass of text substitution.  A token without a value is an error, and the result must
//! still parse as JSON.

use super::{error, ArtifactKind, Result};
use log::trace;
use snafu::{ensure, ResultExt};
use std::fs;
use std::path::Path;

/// The tokens a template may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Token {
    DataSourceName,
    SkillsetName,
    IndexName,
    IndexerName,
    StorageAccountName,
    StorageConnectionString,
    StorageContainer,
    CognitiveServicesKey,
}

impl Token {
    pub(crate) fn marker(&self) -> &'static str {
        match self {
            Token::DataSourceName => "{{datasource-name}}",
            Token::SkillsetName => "{{skillset-name}}",
            Token::IndexName => "{{index-name}}",
            Token::IndexerName => "{{indexer-name}}",
            Token::StorageAccountName => "{{storage-account-name}}",
            Token::StorageConnectionString => "{{storage-connection-string}}",
            Token::StorageContainer => "{{storage-container}}",
            Token::CognitiveServicesKey => "{{cognitive-services-key}}",
        }
    }
}

/// Token values for one run
#[derive(Default)]
pub(crate) struct Substitutions {
    values: Vec<(Token, String)>,
}

impl Substitutions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set<S: Into<String>>(&mut self, token: Token, value: S) -> &mut Self {
        let value = value.into();
        match self.values.iter_mut().find(|(t, _)| *t == token) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((token, value)),
        }
        self
    }
}

/// Fills every token in `template` in one pass, so text that comes in through a value is never
/// itself substituted.  Values are JSON-string escaped, since tokens sit inside JSON strings.
pub(crate) fn render(name: &str, template: &str, substitutions: &Substitutions) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match substitutions
            .values
            .iter()
            .find(|(token, _)| candidate.starts_with(token.marker()))
        {
            Some((token, value)) => {
                rendered.push_str(&json_escape(value));
                rest = &candidate[token.marker().len()..];
            }
            None => {
                if let Some(token) = token_at(candidate) {
                    return error::UnresolvedTokenSnafu {
                        template: name,
                        token,
                    }
                    .fail();
                }
                rendered.push('{');
                rest = &candidate[1..];
            }
        }
    }
    rendered.push_str(rest);

    serde_json::from_str::<serde_json::Value>(&rendered)
        .context(error::InvalidJsonSnafu { template: name })?;
    trace!("Rendered {} template: {} bytes", name, rendered.len());
    Ok(rendered)
}

fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Returns the `{{token-name}}` that `text` starts with, if any.  Only lowercase letters, digits
/// and hyphens count as a token name, so JSON like `{{"a":1}}` in a string isn't mistaken for one.
fn token_at(text: &str) -> Option<String> {
    let after = text.strip_prefix("{{")?;
    let end = after.find("}}")?;
    let name = &after[..end];
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        Some(format!("{{{{{}}}}}", name))
    } else {
        None
    }
}

#[cfg(test)]
fn find_token(text: &str) -> Option<String> {
    text.char_indices()
        .find_map(|(start, _)| token_at(&text[start..]))
}

/// The four templates, read once before anything is provisioned so a bad template fails fast.
#[derive(Debug, Clone)]
pub(crate) struct TemplateSet {
    data_source: String,
    skillset: String,
    index: String,
    indexer: String,
}

impl TemplateSet {
    pub(crate) fn load(dir: &Path) -> Result<Self> {
        let read = |kind: ArtifactKind| -> Result<String> {
            let path = dir.join(kind.template_file());
            let template = fs::read_to_string(&path).context(error::TemplateReadSnafu {
                path: &path,
            })?;
            ensure!(
                !template.trim().is_empty(),
                error::EmptyTemplateSnafu { path: &path }
            );
            Ok(template)
        };
        Ok(Self {
            data_source: read(ArtifactKind::DataSource)?,
            skillset: read(ArtifactKind::Skillset)?,
            index: read(ArtifactKind::Index)?,
            indexer: read(ArtifactKind::Indexer)?,
        })
    }

    pub(crate) fn get(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::DataSource => &self.data_source,
            ArtifactKind::Skillset => &self.skillset,
            ArtifactKind::Index => &self.index,
            ArtifactKind::Indexer => &self.indexer,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_strings(data_source: &str, skillset: &str, index: &str, indexer: &str) -> Self {
        Self {
            data_source: data_source.to_string(),
            skillset: skillset.to_string(),
            index: index.to_string(),
            indexer: indexer.to_string(),
        }
    }
}

/// Checks that the bundled templates only use tokens we know how to fill.
pub(crate) fn check_tokens(templates: &TemplateSet, substitutions: &Substitutions) -> Result<()> {
    for kind in ArtifactKind::ALL {
        render(kind.template_file(), templates.get(kind), substitutions)?;
    }
    Ok(())
}
