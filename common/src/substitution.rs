// Merge-field template rendering
//
// Templates use `{{ Person.NickName }}` output tags and `{% command args %}`
// command tags. Command tags are only honoured when the command is part of the
// template's EnabledCommands capability set.

pub mod merge_fields;

use crate::errors::RenderError;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Merge fields handed to a renderer, keyed by top-level name (`Person`, `Group`, ...)
pub type MergeFields = HashMap<String, Value>;

/// TemplateRenderer defines the interface for resolving merge fields in message text
pub trait TemplateRenderer: Send + Sync {
    /// Render `template` against `merge_fields`, honouring only `enabled` commands
    fn render(
        &self,
        template: &str,
        merge_fields: &MergeFields,
        enabled: &EnabledCommands,
    ) -> Result<String, RenderError>;

    /// Reject a template up-front when it can never render with `enabled`
    fn check(&self, _template: &str, _enabled: &EnabledCommands) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Capability set of template commands a template may use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledCommands {
    all: bool,
    names: BTreeSet<String>,
}

impl EnabledCommands {
    /// No commands allowed
    pub fn none() -> Self {
        Self::default()
    }

    /// Every command allowed
    pub fn all() -> Self {
        Self {
            all: true,
            names: BTreeSet::new(),
        }
    }

    /// Parse a comma separated list such as `"Execute,WebRequest"` or `"All"`
    pub fn parse(value: &str) -> Self {
        let mut enabled = Self::none();
        for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name.eq_ignore_ascii_case("all") {
                enabled.all = true;
            } else {
                enabled.names.insert(name.to_ascii_lowercase());
            }
        }
        enabled
    }

    pub fn allows(&self, command: &str) -> bool {
        self.all || self.names.contains(&command.to_ascii_lowercase())
    }
}

impl fmt::Display for EnabledCommands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all {
            return f.write_str("All");
        }
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// Handler for one template command tag
pub trait CommandTag: Send + Sync {
    fn render(&self, args: &str, merge_fields: &MergeFields) -> Result<String, RenderError>;
}

/// Default renderer: dotted-path output tags plus pluggable command tags
pub struct MergeTemplate {
    /// Compiled regex for `{{ Path.To.Value }}`
    output_regex: Regex,
    /// Compiled regex for `{% name args %}`
    command_regex: Regex,
    commands: HashMap<String, Arc<dyn CommandTag>>,
}

impl MergeTemplate {
    pub fn new() -> Result<Self, RenderError> {
        let output_regex =
            Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}")
                .map_err(|e| RenderError::RegexError(e.to_string()))?;
        let command_regex = Regex::new(r"\{%\s*([A-Za-z_][A-Za-z0-9_]*)\s*(.*?)\s*%\}")
            .map_err(|e| RenderError::RegexError(e.to_string()))?;

        Ok(Self {
            output_regex,
            command_regex,
            commands: HashMap::new(),
        })
    }

    /// Register a handler for `{% name ... %}`
    pub fn with_command(mut self, name: &str, handler: Arc<dyn CommandTag>) -> Self {
        self.commands.insert(name.to_ascii_lowercase(), handler);
        self
    }

    /// Command names used by a template, lowercased and de-duplicated
    pub fn commands_used(&self, template: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut commands = Vec::new();
        for cap in self.command_regex.captures_iter(template) {
            let name = cap[1].to_ascii_lowercase();
            if seen.insert(name.clone()) {
                commands.push(name);
            }
        }
        commands
    }

    /// Every `{{` must close with `}}` and every `{%` with `%}`
    fn check_terminated(template: &str) -> Result<(), RenderError> {
        for (open, close) in [("{{", "}}"), ("{%", "%}")] {
            let mut search_from = 0;
            while let Some(rel) = template[search_from..].find(open) {
                let start = search_from + rel;
                let body_start = start + open.len();
                match template[body_start..].find(close) {
                    Some(end_rel) => search_from = body_start + end_rel + close.len(),
                    None => return Err(RenderError::UnterminatedTag(start)),
                }
            }
        }
        Ok(())
    }

    /// Expand command tags and output tags in one pass. Output tags are only
    /// resolved in literal template text, never in what a command produced.
    fn render_segments(
        &self,
        template: &str,
        merge_fields: &MergeFields,
        enabled: &EnabledCommands,
    ) -> Result<String, RenderError> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for cap in self.command_regex.captures_iter(template) {
            let whole = match cap.get(0) {
                Some(m) => m,
                None => continue,
            };
            let name = cap[1].to_ascii_lowercase();
            if !enabled.allows(&name) {
                return Err(RenderError::CommandNotEnabled(name));
            }
            out.push_str(&self.render_outputs(&template[last..whole.start()], merge_fields));
            if let Some(handler) = self.commands.get(&name) {
                let args = cap.get(2).map(|m| m.as_str()).unwrap_or("");
                let rendered = handler.render(args, merge_fields).map_err(|e| match e {
                    RenderError::CommandFailed { .. } => e,
                    other => RenderError::CommandFailed {
                        command: name.clone(),
                        reason: other.to_string(),
                    },
                })?;
                out.push_str(&rendered);
            }
            last = whole.end();
        }
        out.push_str(&self.render_outputs(&template[last..], merge_fields));
        Ok(out)
    }

    fn render_outputs(&self, template: &str, merge_fields: &MergeFields) -> String {
        self.output_regex
            .replace_all(template, |cap: &regex::Captures<'_>| {
                lookup_path(merge_fields, &cap[1])
                    .map(value_to_text)
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

impl TemplateRenderer for MergeTemplate {
    #[instrument(skip(self, merge_fields), fields(template_len = template.len(), field_count = merge_fields.len()))]
    fn render(
        &self,
        template: &str,
        merge_fields: &MergeFields,
        enabled: &EnabledCommands,
    ) -> Result<String, RenderError> {
        Self::check_terminated(template)?;
        let rendered = self.render_segments(template, merge_fields, enabled)?;

        tracing::debug!(
            original_len = template.len(),
            result_len = rendered.len(),
            "Template rendered"
        );

        Ok(rendered)
    }

    fn check(&self, template: &str, enabled: &EnabledCommands) -> Result<(), RenderError> {
        Self::check_terminated(template)?;
        match self
            .commands_used(template)
            .into_iter()
            .find(|name| !enabled.allows(name))
        {
            Some(name) => Err(RenderError::CommandNotEnabled(name)),
            None => Ok(()),
        }
    }
}

/// Walk a dotted path (`Person.NickName`) through the merge fields
fn lookup_path<'a>(merge_fields: &'a MergeFields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = merge_fields.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Merge common and operation-specific fields; specific fields take precedence
pub fn merge_field_maps(common: MergeFields, specific: MergeFields) -> MergeFields {
    let mut merged = common;
    merged.extend(specific);
    merged
}
