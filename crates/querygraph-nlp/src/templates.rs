// ABOUTME: Ordered pattern rules that expand a question into a parameterized Cypher query
// ABOUTME: First structural match wins; execution failures fall through to the next matching rule

use querygraph_core::{GraphExecutor, Params, QueryGraphError, Record, Result};
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read-only Cypher shared by the template engine and the query synthesizer.
/// Nodes carry `name` and `type` properties.
pub mod cypher {
    pub const INGREDIENTS_OF: &str = "MATCH (n)-[r]-(i) \
        WHERE toLower(n.name) = toLower($name) \
        AND (toLower(i.type) = 'ingredient' OR 'Ingredient' IN labels(i)) \
        RETURN DISTINCT i.name AS ingredient, type(r) AS relation \
        ORDER BY ingredient";

    pub const ALL_INGREDIENTS: &str = "MATCH (i) \
        WHERE toLower(i.type) = 'ingredient' OR 'Ingredient' IN labels(i) \
        RETURN DISTINCT i.name AS ingredient \
        ORDER BY ingredient LIMIT 200";

    pub const RECIPES_WITH: &str = "MATCH (r)-[]-(i) \
        WHERE (toLower(r.type) = 'recipe' OR 'Recipe' IN labels(r)) \
        AND toLower(i.name) CONTAINS toLower($term) \
        RETURN DISTINCT r.name AS recipe \
        ORDER BY recipe LIMIT 50";

    pub const RELATIONSHIPS_OF: &str = "MATCH (n)-[r]-(m) \
        WHERE toLower(n.name) = toLower($name) \
        RETURN n.name AS source, type(r) AS relation, m.name AS target, m.type AS target_type \
        LIMIT 100";

    pub const COUNT_OF_TYPE: &str = "MATCH (n) \
        WHERE toLower(n.type) IN [toLower($type), toLower($singular)] \
        RETURN count(n) AS count";

    pub const COUNT_MATCHING_KEYWORDS: &str = "MATCH (n) \
        WHERE any(k IN $keywords WHERE toLower(n.type) CONTAINS k OR toLower(n.name) CONTAINS k) \
        RETURN count(n) AS count";

    pub const TYPES_WITH_COUNTS: &str = "MATCH (n) \
        RETURN n.type AS type, count(n) AS count \
        ORDER BY count DESC";

    pub const DESCRIBE_NODE: &str = "MATCH (n) \
        WHERE toLower(n.name) = toLower($name) \
        OPTIONAL MATCH (n)-[]-(m) \
        RETURN n.name AS name, n.type AS type, collect(DISTINCT m.name) AS related";

    pub const LIST_NODES: &str = "MATCH (n) \
        RETURN n.name AS name, n.type AS type \
        ORDER BY name LIMIT 25";
}

pub type ParamExtractor = fn(&Captures<'_>) -> Params;

/// A structural pattern plus the parameterized query it expands into
pub struct TemplateRule {
    pub name: &'static str,
    pub domain: &'static str,
    pub description: &'static str,
    pub template: &'static str,
    matcher: Regex,
    extract: ParamExtractor,
}

impl TemplateRule {
    pub fn new(
        name: &'static str,
        pattern: &str,
        domain: &'static str,
        description: &'static str,
        template: &'static str,
        extract: ParamExtractor,
    ) -> Result<Self> {
        let matcher = Regex::new(pattern)
            .map_err(|e| QueryGraphError::InvalidPattern(format!("{}: {}", name, e)))?;
        Ok(Self {
            name,
            domain,
            description,
            template,
            matcher,
            extract,
        })
    }

    pub fn is_match(&self, query: &str) -> bool {
        self.matcher.is_match(query)
    }

    /// Parameters for the template, or None when the rule does not match
    pub fn extract(&self, query: &str) -> Option<Params> {
        self.matcher.captures(query).map(|caps| (self.extract)(&caps))
    }
}

impl std::fmt::Debug for TemplateRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRule")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("pattern", &self.matcher.as_str())
            .finish()
    }
}

/// Successful template execution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMatch {
    pub rule: &'static str,
    pub domain: &'static str,
    pub template: &'static str,
    pub parameters: Params,
    pub rows: Vec<Record>,
    pub matched_description: &'static str,
}

/// No rule matched, or every matching rule failed to execute
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMiss {
    pub error: String,
    pub suggestion: String,
    /// Matching rules whose execution failed
    pub failed_rules: Vec<&'static str>,
    pub last_error: Option<String>,
}

pub type TemplateOutcome = std::result::Result<TemplateMatch, TemplateMiss>;

pub const NO_MATCHING_TEMPLATE: &str = "no matching template";

const GENERIC_SUGGESTION: &str = "Try a phrasing such as \"ingredients for <dish>\", \
    \"how many <type>\", \"relationships of <name>\" or \"show me all nodes\"";

pub struct PatternTemplateEngine {
    rules: Vec<TemplateRule>,
    graph: Arc<dyn GraphExecutor>,
}

impl PatternTemplateEngine {
    /// Engine with the built-in rule catalogue
    pub fn new(graph: Arc<dyn GraphExecutor>) -> Result<Self> {
        Ok(Self::with_rules(graph, default_rules()?))
    }

    /// Rules are tried in the given order
    pub fn with_rules(graph: Arc<dyn GraphExecutor>, rules: Vec<TemplateRule>) -> Self {
        Self { rules, graph }
    }

    pub fn rules(&self) -> &[TemplateRule] {
        &self.rules
    }

    pub fn descriptions(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.description).collect()
    }

    /// Distinct domains in declaration order
    pub fn domains(&self) -> Vec<&'static str> {
        let mut domains: Vec<&'static str> = Vec::new();
        for rule in &self.rules {
            if !domains.contains(&rule.domain) {
                domains.push(rule.domain);
            }
        }
        domains
    }

    /// First rule that structurally matches, without executing anything
    pub fn matching_rule(&self, query: &str) -> Option<&TemplateRule> {
        self.rules.iter().find(|rule| rule.is_match(query))
    }

    pub async fn process(&self, query: &str) -> TemplateOutcome {
        let mut failed_rules = Vec::new();
        let mut last_error = None;

        for rule in &self.rules {
            let Some(parameters) = rule.extract(query) else {
                continue;
            };
            debug!(rule = rule.name, ?parameters, "Template matched");

            match self.graph.execute_query(rule.template, &parameters).await {
                Ok(rows) => {
                    info!(
                        rule = rule.name,
                        domain = rule.domain,
                        rows = rows.len(),
                        "Template executed"
                    );
                    return Ok(TemplateMatch {
                        rule: rule.name,
                        domain: rule.domain,
                        template: rule.template,
                        parameters,
                        rows,
                        matched_description: rule.description,
                    });
                }
                Err(e) => {
                    warn!(
                        rule = rule.name,
                        executor = self.graph.name(),
                        error = %e,
                        "Template execution failed, trying next rule"
                    );
                    failed_rules.push(rule.name);
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(TemplateMiss {
            error: NO_MATCHING_TEMPLATE.to_string(),
            suggestion: GENERIC_SUGGESTION.to_string(),
            failed_rules,
            last_error,
        })
    }
}

/// Trim whitespace, a leading article, trailing punctuation and quotes
fn clean_subject(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_end_matches(|c: char| matches!(c, '?' | '!' | '.' | ','))
        .trim();
    let lower = trimmed.to_lowercase();
    let without_article = ["the ", "a ", "an "]
        .iter()
        .find(|article| lower.starts_with(**article))
        .map_or(trimmed, |article| &trimmed[article.len()..]);
    without_article
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”'))
        .trim()
        .to_string()
}

fn param(caps: &Captures<'_>, group: &str, key: &str) -> Params {
    let mut params = Params::new();
    if let Some(m) = caps.name(group) {
        params.insert(key.to_string(), Value::String(clean_subject(m.as_str())));
    }
    params
}

fn default_rules() -> Result<Vec<TemplateRule>> {
    Ok(vec![
        TemplateRule::new(
            "ingredients_for",
            r"(?i)\bingredients?\s+(?:are\s+)?(?:used\s+)?(?:for|of|in)\s+(?P<name>.+)",
            "recipes",
            "Ingredients of a dish, e.g. \"ingredients for Flammkuchen\"",
            cypher::INGREDIENTS_OF,
            |caps| param(caps, "name", "name"),
        )?,
        TemplateRule::new(
            "made_of",
            r"(?i)\bwhat\s+(?:is|are)\s+(?P<name>.+?)\s+made\s+(?:of|from|with)\b",
            "recipes",
            "What a dish is made of, e.g. \"what is Flammkuchen made of?\"",
            cypher::INGREDIENTS_OF,
            |caps| param(caps, "name", "name"),
        )?,
        TemplateRule::new(
            "all_ingredients",
            r"(?i)\b(?:list|show)(?:\s+me)?\s+(?:all\s+)?(?:the\s+)?ingredients\b|\ball\s+(?:the\s+)?ingredients\b",
            "recipes",
            "Every known ingredient, e.g. \"list all ingredients\"",
            cypher::ALL_INGREDIENTS,
            |_| Params::new(),
        )?,
        TemplateRule::new(
            "recipes_with",
            r"(?i)\brecipes?\s+(?:with|containing|using|that\s+use)\s+(?P<term>.+)",
            "recipes",
            "Recipes using an ingredient, e.g. \"recipes with Speck\"",
            cypher::RECIPES_WITH,
            |caps| param(caps, "term", "term"),
        )?,
        TemplateRule::new(
            "relationships_of",
            r"(?i)\b(?:relationships?|relations|connections?)\s+(?:of|for|with)\s+(?P<name>.+)",
            "graph",
            "Relationships of a node, e.g. \"relationships of Flammkuchen\"",
            cypher::RELATIONSHIPS_OF,
            |caps| param(caps, "name", "name"),
        )?,
        TemplateRule::new(
            "connected_to",
            r"(?i)\bwhat\s+is\s+(?P<name>.+?)\s+(?:connected|related|linked)\s+to\b",
            "graph",
            "Neighbours of a node, e.g. \"what is Speck connected to?\"",
            cypher::RELATIONSHIPS_OF,
            |caps| param(caps, "name", "name"),
        )?,
        TemplateRule::new(
            "count_of_type",
            r"(?i)\bhow\s+many\s+(?P<type>\p{L}+)",
            "graph",
            "Number of nodes of a type, e.g. \"how many recipes are there?\"",
            cypher::COUNT_OF_TYPE,
            |caps| {
                let mut params = param(caps, "type", "type");
                let plural = params
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let singular = plural.strip_suffix('s').unwrap_or(&plural).to_string();
                params.insert("singular".to_string(), Value::String(singular));
                params
            },
        )?,
        TemplateRule::new(
            "types_with_counts",
            r"(?i)\b(?:which|what)\s+(?:kinds?\s+of\s+)?(?:nodes|types|entities|categories)\b",
            "graph",
            "Node types with their counts, e.g. \"which nodes do you have?\"",
            cypher::TYPES_WITH_COUNTS,
            |_| Params::new(),
        )?,
        TemplateRule::new(
            "describe_node",
            r"(?i)\b(?:tell\s+me\s+about|describe|find|who\s+is|what\s+is)\s+(?P<name>.+)",
            "graph",
            "Details of a single node, e.g. \"tell me about Flammkuchen\"",
            cypher::DESCRIBE_NODE,
            |caps| param(caps, "name", "name"),
        )?,
        TemplateRule::new(
            "list_nodes",
            r"(?i)\b(?:show|list|display)(?:\s+me)?\s+(?:all\s+)?(?:the\s+)?(?:nodes|entities|everything|data)\b",
            "graph",
            "A sample of nodes, e.g. \"show me all nodes\"",
            cypher::LIST_NODES,
            |_| Params::new(),
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGraph;
    use serde_json::json;

    fn ingredient_rows() -> Vec<Value> {
        vec![
            json!({"ingredient": "Crème fraîche", "relation": "CONTAINS"}),
            json!({"ingredient": "Speck", "relation": "CONTAINS"}),
            json!({"ingredient": "Zwiebeln", "relation": "CONTAINS"}),
        ]
    }

    #[tokio::test]
    async fn test_ingredients_for_dish() {
        let graph = Arc::new(ScriptedGraph::new().rows("MATCH (n)-[r]-(i)", ingredient_rows()));
        let engine = PatternTemplateEngine::new(graph.clone()).unwrap();

        let matched = engine.process("ingredients for Flammkuchen").await.unwrap();
        assert_eq!(matched.rule, "ingredients_for");
        assert_eq!(matched.domain, "recipes");
        assert_eq!(matched.rows.len(), 3);
        assert_eq!(matched.parameters["name"], json!("Flammkuchen"));
        assert_eq!(graph.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_success() {
        let engine = PatternTemplateEngine::new(Arc::new(ScriptedGraph::new())).unwrap();
        let matched = engine.process("which nodes do you have?").await.unwrap();
        assert_eq!(matched.rule, "types_with_counts");
        assert!(matched.rows.is_empty());
    }

    #[tokio::test]
    async fn test_earlier_rule_wins_on_overlap() {
        let specific = || {
            TemplateRule::new(
                "specific",
                r"(?i)ingredients for (?P<name>.+)",
                "recipes",
                "specific",
                cypher::INGREDIENTS_OF,
                |caps| param(caps, "name", "name"),
            )
            .unwrap()
        };
        let generic = || {
            TemplateRule::new(
                "generic",
                r"(?i)for (?P<name>.+)",
                "graph",
                "generic",
                cypher::DESCRIBE_NODE,
                |caps| param(caps, "name", "name"),
            )
            .unwrap()
        };

        let graph: Arc<dyn GraphExecutor> = Arc::new(ScriptedGraph::new());
        let forward = PatternTemplateEngine::with_rules(graph.clone(), vec![specific(), generic()]);
        let reversed = PatternTemplateEngine::with_rules(graph, vec![generic(), specific()]);

        let query = "ingredients for Flammkuchen";
        assert_eq!(forward.process(query).await.unwrap().rule, "specific");
        assert_eq!(reversed.process(query).await.unwrap().rule, "generic");
    }

    #[test]
    fn test_builtin_order_prefers_specific_rules() {
        let engine = PatternTemplateEngine::new(Arc::new(ScriptedGraph::new())).unwrap();
        let cases = [
            ("find ingredients for Flammkuchen", "ingredients_for"),
            ("what is Flammkuchen made of?", "made_of"),
            ("show me all ingredients", "all_ingredients"),
            ("what is Speck connected to?", "connected_to"),
            ("how many recipes are there?", "count_of_type"),
            ("tell me about Flammkuchen", "describe_node"),
            ("show me all nodes", "list_nodes"),
        ];
        for (query, expected) in cases {
            let rule = engine.matching_rule(query).map(|r| r.name);
            assert_eq!(rule, Some(expected), "{}", query);
        }
    }

    #[test]
    fn test_parameter_cleanup() {
        let engine = PatternTemplateEngine::new(Arc::new(ScriptedGraph::new())).unwrap();

        let params = engine.rules()[0]
            .extract("ingredients for the \"Flammkuchen\"?")
            .unwrap();
        assert_eq!(params["name"], json!("Flammkuchen"));

        let count = engine
            .matching_rule("how many recipes")
            .and_then(|rule| rule.extract("how many recipes"))
            .unwrap();
        assert_eq!(count["type"], json!("recipes"));
        assert_eq!(count["singular"], json!("recipe"));
    }

    #[tokio::test]
    async fn test_execution_failure_falls_through_to_next_rule() {
        let graph = Arc::new(
            ScriptedGraph::new()
                .fails("MATCH (n)-[r]-(i)", "connection reset")
                .rows("OPTIONAL MATCH", vec![json!({"name": "Flammkuchen"})]),
        );
        let engine = PatternTemplateEngine::new(graph.clone()).unwrap();

        let matched = engine
            .process("find ingredients for Flammkuchen")
            .await
            .unwrap();
        assert_eq!(matched.rule, "describe_node");
        assert_eq!(graph.call_count(), 2);
    }

    #[test]
    fn test_execution_failure_is_logged() {
        let graph = Arc::new(ScriptedGraph::new().fails("MATCH (n)-[r]-(i)", "connection reset"));
        let engine = PatternTemplateEngine::new(graph).unwrap();

        let logs = capture_logs(|| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let miss = runtime
                .block_on(engine.process("ingredients for Flammkuchen"))
                .unwrap_err();
            assert_eq!(miss.failed_rules, vec!["ingredients_for"]);
            assert_eq!(miss.last_error.as_deref(), Some("Database error: connection reset"));
        });

        assert!(logs.contains("Template execution failed"));
        assert!(logs.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_no_match_returns_generic_guidance() {
        let graph = Arc::new(ScriptedGraph::new());
        let engine = PatternTemplateEngine::new(graph.clone()).unwrap();

        let miss = engine.process("zzz qqq").await.unwrap_err();
        assert_eq!(miss.error, NO_MATCHING_TEMPLATE);
        assert!(!miss.suggestion.is_empty());
        assert!(miss.failed_rules.is_empty());
        assert_eq!(graph.call_count(), 0);
    }

    #[test]
    fn test_catalogue_introspection() {
        let engine = PatternTemplateEngine::new(Arc::new(ScriptedGraph::new())).unwrap();
        assert_eq!(engine.descriptions().len(), engine.rules().len());
        assert_eq!(engine.domains(), vec!["recipes", "graph"]);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = TemplateRule::new("broken", "(", "graph", "", cypher::LIST_NODES, |_| {
            Params::new()
        })
        .unwrap_err();
        assert!(matches!(err, QueryGraphError::InvalidPattern(_)));
    }

    fn capture_logs<F>(f: F) -> String
    where
        F: FnOnce(),
    {
        use std::io::Write;
        use std::sync::Mutex;
        use tracing::subscriber::with_default;
        use tracing_subscriber::EnvFilter;

        #[derive(Clone)]
        struct BufferWriter {
            inner: Arc<Mutex<Vec<u8>>>,
        }

        impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for BufferWriter {
            type Writer = BufferGuard;

            fn make_writer(&'a self) -> Self::Writer {
                BufferGuard {
                    inner: self.inner.clone(),
                }
            }
        }

        struct BufferGuard {
            inner: Arc<Mutex<Vec<u8>>>,
        }

        impl Write for BufferGuard {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.inner.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let writer = BufferWriter {
            inner: Arc::new(Mutex::new(Vec::new())),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_ansi(false)
            .without_time()
            .with_writer(writer.clone())
            .finish();

        with_default(subscriber, f);

        let bytes = writer.inner.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }
}
