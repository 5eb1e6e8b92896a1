// ABOUTME: Maps an NLP result to a parameterized Cypher query through an intent dispatch table
// ABOUTME: Executes the synthesized query against the graph collaborator

use crate::nlp_processor::{EntityBucket, Intent, NlpResult};
use crate::templates::cypher;
use querygraph_core::{GraphExecutor, Params, QueryGraphError, Record};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedQuery {
    pub intent: Intent,
    pub query: &'static str,
    pub parameters: Params,
}

#[derive(Debug)]
pub enum SynthesisOutcome {
    Executed {
        query: SynthesizedQuery,
        rows: Vec<Record>,
    },
    /// No dispatch entry, or required parameters could not be derived
    NotSynthesized { reason: String },
    Failed {
        query: SynthesizedQuery,
        error: QueryGraphError,
    },
}

impl SynthesisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisOutcome::Executed { .. })
    }
}

/// Words that name the kind of thing asked for rather than a target
const GENERIC_NOUNS: &[&str] = &[
    "ingredient",
    "ingredients",
    "recipe",
    "recipes",
    "dish",
    "dishes",
    "node",
    "nodes",
    "relationship",
    "relationships",
    "connected",
    "related",
    "made",
    "many",
    "count",
    "number",
    "total",
];

pub struct QuerySynthesizer {
    graph: Arc<dyn GraphExecutor>,
}

impl QuerySynthesizer {
    pub fn new(graph: Arc<dyn GraphExecutor>) -> Self {
        Self { graph }
    }

    /// Resolve the dispatch table entry for this result without executing it
    pub fn synthesize(&self, nlp: &NlpResult) -> Option<SynthesizedQuery> {
        let intent = nlp.intent.intent;
        let (query, parameters) = match intent {
            Intent::FindIngredients => (cypher::INGREDIENTS_OF, name_param("name", target(nlp)?)),
            Intent::ListIngredients => (cypher::ALL_INGREDIENTS, Params::new()),
            Intent::FindRecipe => (cypher::RECIPES_WITH, name_param("term", target(nlp)?)),
            Intent::CountEntities => {
                if nlp.keywords.is_empty() {
                    return None;
                }
                let keywords = nlp
                    .keywords
                    .iter()
                    .map(|k| Value::String(k.clone()))
                    .collect();
                let mut params = Params::new();
                params.insert("keywords".to_string(), Value::Array(keywords));
                (cypher::COUNT_MATCHING_KEYWORDS, params)
            }
            Intent::FindRelationships => {
                (cypher::RELATIONSHIPS_OF, name_param("name", target(nlp)?))
            }
            Intent::ListEntities => (cypher::LIST_NODES, Params::new()),
            Intent::DescribeEntity => (cypher::DESCRIBE_NODE, name_param("name", target(nlp)?)),
            Intent::Unknown => return None,
        };

        Some(SynthesizedQuery {
            intent,
            query,
            parameters,
        })
    }

    pub async fn execute(&self, nlp: &NlpResult) -> SynthesisOutcome {
        let Some(query) = self.synthesize(nlp) else {
            return SynthesisOutcome::NotSynthesized {
                reason: format!(
                    "cannot synthesize a query for intent '{}'",
                    nlp.intent.intent
                ),
            };
        };
        debug!(intent = %query.intent, parameters = ?query.parameters, "Synthesized query");

        match self.graph.execute_query(query.query, &query.parameters).await {
            Ok(rows) => {
                info!(intent = %query.intent, rows = rows.len(), "Synthesized query executed");
                SynthesisOutcome::Executed { query, rows }
            }
            Err(error) => SynthesisOutcome::Failed { query, error },
        }
    }
}

/// First quoted term, proper noun, or non-generic candidate
fn target(nlp: &NlpResult) -> Option<String> {
    nlp.entity(EntityBucket::Quoted)
        .first()
        .or_else(|| nlp.entity(EntityBucket::ProperNouns).first())
        .or_else(|| {
            nlp.entity(EntityBucket::Candidates)
                .iter()
                .find(|c| !c.contains(' ') && !GENERIC_NOUNS.contains(&c.as_str()))
        })
        .cloned()
}

fn name_param(key: &str, value: String) -> Params {
    let mut params = Params::new();
    params.insert(key.to_string(), Value::String(value));
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp_processor::NlpProcessor;
    use crate::test_support::ScriptedGraph;
    use serde_json::json;

    fn synthesizer(graph: ScriptedGraph) -> (QuerySynthesizer, Arc<ScriptedGraph>) {
        let graph = Arc::new(graph);
        (QuerySynthesizer::new(graph.clone()), graph)
    }

    #[test]
    fn test_find_ingredients_targets_proper_noun() {
        let (synth, _) = synthesizer(ScriptedGraph::new());
        let nlp = NlpProcessor::new().process("Which ingredients go into Flammkuchen");

        let query = synth.synthesize(&nlp).unwrap();
        assert_eq!(query.intent, Intent::FindIngredients);
        assert_eq!(query.query, cypher::INGREDIENTS_OF);
        assert_eq!(query.parameters["name"], json!("Flammkuchen"));
    }

    #[test]
    fn test_target_falls_back_to_candidates() {
        let (synth, _) = synthesizer(ScriptedGraph::new());
        let nlp = NlpProcessor::new().process("ingredients of pizza");

        let query = synth.synthesize(&nlp).unwrap();
        assert_eq!(query.parameters["name"], json!("pizza"));
    }

    #[test]
    fn test_title_case_listing_needs_no_target() {
        let (synth, _) = synthesizer(ScriptedGraph::new());
        let nlp = NlpProcessor::new().process("List All Ingredients");

        let query = synth.synthesize(&nlp).unwrap();
        assert_eq!(query.intent, Intent::ListIngredients);
        assert_eq!(query.query, cypher::ALL_INGREDIENTS);
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn test_count_uses_full_keyword_list() {
        let (synth, _) = synthesizer(ScriptedGraph::new());
        let nlp = NlpProcessor::new().process("count total recipes");
        assert_eq!(nlp.intent.intent, Intent::CountEntities);

        let query = synth.synthesize(&nlp).unwrap();
        assert_eq!(
            query.parameters["keywords"],
            json!(["count", "total", "recipes"])
        );
    }

    #[tokio::test]
    async fn test_unknown_intent_is_not_executed() {
        let (synth, graph) = synthesizer(ScriptedGraph::new());
        let nlp = NlpProcessor::new().process("zzz qqq");

        let outcome = synth.execute(&nlp).await;
        assert!(matches!(outcome, SynthesisOutcome::NotSynthesized { .. }));
        assert_eq!(graph.call_count(), 0);
    }

    #[tokio::test]
    async fn test_execution_outcomes() {
        let (synth, _) = synthesizer(
            ScriptedGraph::new().rows("MATCH (i)", vec![json!({"ingredient": "Mehl"})]),
        );
        let nlp = NlpProcessor::new().process("list all ingredients");
        let outcome = synth.execute(&nlp).await;
        match outcome {
            SynthesisOutcome::Executed { query, rows } => {
                assert_eq!(query.intent, Intent::ListIngredients);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let (failing, _) = synthesizer(ScriptedGraph::new().fails("MATCH", "timeout"));
        let outcome = failing.execute(&nlp).await;
        assert!(matches!(outcome, SynthesisOutcome::Failed { .. }));
        assert!(!outcome.is_success());
    }
}
