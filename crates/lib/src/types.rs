use crate::{
    errors::SetupError,
    generator::SqlGenerator,
    providers::{
        ai::{AiProvider, GenerationOptions},
        db::storage::Storage,
    },
    rules::RuleSet,
    schema::SchemaDescriptor,
};
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default cap on rows returned by a single resolution.
pub const DEFAULT_MAX_ROWS: usize = 1000;
/// Default bound on one model call, including the wait for the model lock.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// A uniform scalar value. Serializes as the bare JSON value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

/// One result row. Columns keep the statement's order; serializes as a JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Scalar)>,
}

impl Row {
    /// Appends a column. A repeated column name keeps its first value.
    pub fn push(&mut self, name: &str, value: Scalar) {
        if self.get(name).is_none() {
            self.columns.push((name.to_string(), value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<const N: usize> From<[(&str, Scalar); N]> for Row {
    fn from(columns: [(&str, Scalar); N]) -> Self {
        let mut row = Row::default();
        for (name, value) in columns {
            row.push(name, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Where the executed statement came from. Callers branch on this for trust decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Method {
    #[serde(rename = "rule-based")]
    RuleBased,
    #[serde(rename = "model-generated")]
    ModelGenerated,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::RuleBased => f.write_str("rule-based"),
            Method::ModelGenerated => f.write_str("model-generated"),
        }
    }
}

/// The successful outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionResult {
    pub question: String,
    pub generated_sql: String,
    pub results: Vec<Row>,
    pub method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    pub truncated: bool,
}

/// The resolution engine: rule matcher, model generator, validator and executor
/// wired together over one schema.
pub struct Resolver {
    pub(crate) schema: Arc<SchemaDescriptor>,
    pub(crate) rules: RuleSet,
    pub(crate) generator: SqlGenerator,
    pub(crate) storage_provider: Box<dyn Storage>,
    pub(crate) max_rows: usize,
    pub(crate) prompt_template: Option<String>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("storage_provider", &self.storage_provider.name())
            .field("rules", &self.rules.rules().len())
            .field("max_rows", &self.max_rows)
            .finish_non_exhaustive()
    }
}

/// A builder for creating `Resolver` instances.
///
/// The AI and storage providers are required; everything else has a default
/// (the sales catalog schema, the built-in rules, standard decoding bounds).
pub struct ResolverBuilder {
    schema: Option<SchemaDescriptor>,
    rules: Option<RuleSet>,
    ai_provider: Option<Box<dyn AiProvider>>,
    storage_provider: Option<Box<dyn Storage>>,
    generation_options: GenerationOptions,
    generation_timeout: Duration,
    max_rows: usize,
    prompt_template: Option<String>,
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self {
            schema: None,
            rules: None,
            ai_provider: None,
            storage_provider: None,
            generation_options: GenerationOptions::default(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            max_rows: DEFAULT_MAX_ROWS,
            prompt_template: None,
        }
    }
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: SchemaDescriptor) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Sets the model handle. The resolver owns it for its whole lifetime.
    pub fn ai_provider(mut self, ai_provider: Box<dyn AiProvider>) -> Self {
        self.ai_provider = Some(ai_provider);
        self
    }

    pub fn storage_provider(mut self, storage_provider: Box<dyn Storage>) -> Self {
        self.storage_provider = Some(storage_provider);
        self
    }

    pub fn generation_options(mut self, options: GenerationOptions) -> Self {
        self.generation_options = options;
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Overrides the model prompt. Must contain `{question}`; `{schema}` is optional.
    pub fn prompt_template(mut self, template: Option<String>) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn build(self) -> Result<Resolver, SetupError> {
        let ai_provider = self
            .ai_provider
            .ok_or(SetupError::MissingComponent("AI provider"))?;
        let storage_provider = self
            .storage_provider
            .ok_or(SetupError::MissingComponent("storage provider"))?;

        if let Some(template) = &self.prompt_template {
            if !template.contains("{question}") {
                return Err(SetupError::InvalidPromptTemplate(
                    "the template must contain a {question} placeholder".to_string(),
                ));
            }
        }

        let rules = match self.rules {
            Some(rules) => rules,
            None => RuleSet::builtin()?,
        };

        let generator = SqlGenerator::new(ai_provider)
            .with_options(self.generation_options)
            .with_timeout(self.generation_timeout);

        Ok(Resolver {
            schema: Arc::new(self.schema.unwrap_or_else(SchemaDescriptor::sales)),
            rules,
            generator,
            storage_provider,
            max_rows: self.max_rows,
            prompt_template: self.prompt_template,
        })
    }
}
