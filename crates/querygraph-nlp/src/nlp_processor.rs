// ABOUTME: Heuristic intent classification, entity and keyword extraction
// ABOUTME: Produces an NlpResult with a weighted confidence, plus rephrasing suggestions

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Coarse classification of what the user is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FindIngredients,
    ListIngredients,
    FindRecipe,
    CountEntities,
    FindRelationships,
    ListEntities,
    DescribeEntity,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FindIngredients => "find_ingredients",
            Intent::ListIngredients => "list_ingredients",
            Intent::FindRecipe => "find_recipe",
            Intent::CountEntities => "count_entities",
            Intent::FindRelationships => "find_relationships",
            Intent::ListEntities => "list_entities",
            Intent::DescribeEntity => "describe_entity",
            Intent::Unknown => "unknown",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Intent::FindIngredients,
            Intent::ListIngredients,
            Intent::FindRecipe,
            Intent::CountEntities,
            Intent::FindRelationships,
            Intent::ListEntities,
            Intent::DescribeEntity,
            Intent::Unknown,
        ]
    }

    /// Keywords used by the generic scorer. Empty for intents that are only
    /// reachable through an override.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Intent::FindIngredients => &["ingredient", "contain", "made", "component"],
            Intent::ListIngredients => &[],
            Intent::FindRecipe => &["recipe", "dish", "cook", "prepare", "meal", "bake"],
            Intent::CountEntities => &["count", "many", "number", "total", "amount"],
            Intent::FindRelationships => &[
                "relationship",
                "related",
                "connected",
                "connection",
                "link",
                "between",
            ],
            Intent::ListEntities => &["list", "show", "all", "display", "nodes", "types"],
            Intent::DescribeEntity => &["what", "describe", "about", "tell", "explain", "who"],
            Intent::Unknown => &[],
        }
    }

    /// Example question for suggestion output
    pub fn example(&self) -> Option<&'static str> {
        match self {
            Intent::FindIngredients => Some("ingredients for Flammkuchen"),
            Intent::ListIngredients => Some("list all ingredients"),
            Intent::FindRecipe => Some("recipes with Speck"),
            Intent::CountEntities => Some("how many recipes are there?"),
            Intent::FindRelationships => Some("relationships of Flammkuchen"),
            Intent::ListEntities => Some("show me all nodes"),
            Intent::DescribeEntity => Some("tell me about Flammkuchen"),
            Intent::Unknown => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named entity buckets, populated only when non-empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityBucket {
    ProperNouns,
    Quoted,
    Quantities,
    Durations,
    Temperatures,
    Identifiers,
    Candidates,
}

impl EntityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityBucket::ProperNouns => "proper_nouns",
            EntityBucket::Quoted => "quoted",
            EntityBucket::Quantities => "quantities",
            EntityBucket::Durations => "durations",
            EntityBucket::Temperatures => "temperatures",
            EntityBucket::Identifiers => "identifiers",
            EntityBucket::Candidates => "candidates",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMatch {
    #[serde(rename = "name")]
    pub intent: Intent,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NlpResult {
    pub original_query: String,
    pub intent: IntentMatch,
    pub entities: BTreeMap<EntityBucket, Vec<String>>,
    pub keywords: Vec<String>,
    pub confidence: f32,
}

impl NlpResult {
    pub fn entity(&self, bucket: EntityBucket) -> &[String] {
        self.entities
            .get(&bucket)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "for", "in", "on", "at", "to", "by", "with",
    "from", "into", "about", "is", "are", "was", "were", "be", "been", "do", "does", "did",
    "have", "has", "had", "i", "you", "we", "they", "it", "me", "my", "your", "our", "this",
    "that", "these", "those", "what", "which", "who", "whom", "how", "where", "when", "why",
    "can", "could", "would", "should", "will", "please", "there", "all", "any", "some", "give",
    "tell", "show", "list", "find", "get",
];

const INGREDIENT_TERMS: &[&str] = &["ingredient", "zutat"];
const LISTING_TERMS: &[&str] = &["list", "show", "all", "every", "display"];
const TARGET_PREPOSITIONS: &[&str] = &["for", "in", "of"];

const FIND_INGREDIENTS_CONFIDENCE: f32 = 0.9;
const LIST_INGREDIENTS_CONFIDENCE: f32 = 0.85;

/// Intents tried by the generic scorer, in tie-breaking order
const SCORED_INTENTS: [Intent; 6] = [
    Intent::FindIngredients,
    Intent::FindRecipe,
    Intent::CountEntities,
    Intent::FindRelationships,
    Intent::ListEntities,
    Intent::DescribeEntity,
];

lazy_static! {
    static ref PROPER_NOUN: Regex = Regex::new(r"\b\p{Lu}\p{Ll}+(?:\s+\p{Lu}\p{Ll}+)*\b").unwrap();
    static ref QUOTED: Regex = Regex::new(r#""([^"]+)"|“([^”]+)”|(?:^|\s)'([^']+)'"#).unwrap();
    static ref QUANTITY: Regex = Regex::new(
        r"(?i)\b\d+(?:[.,]\d+)?\s*(?:kg|mg|g|ml|cl|dl|l|oz|lb|cups?|tbsp|tsp|pieces?|pcs)\b"
    )
    .unwrap();
    static ref DURATION: Regex = Regex::new(
        r"(?i)\b\d+(?:[.,]\d+)?\s*(?:seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?)\b"
    )
    .unwrap();
    static ref TEMPERATURE: Regex =
        Regex::new(r"(?i)\b\d{2,3}\s*°?\s*(?:celsius|fahrenheit|degrees|c|f)\b").unwrap();
    static ref IDENTIFIER: Regex =
        Regex::new(r"\b(?:\p{Lu}{2,}[\p{Lu}\d_-]*|\p{L}+\d+[\p{L}\d]*)\b").unwrap();
}

/// Stateless heuristic NLP processor
#[derive(Debug, Clone, Copy, Default)]
pub struct NlpProcessor;

impl NlpProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, query: &str) -> NlpResult {
        let intent = self.classify_intent(query);
        let entities = self.extract_entities(query);
        let keywords = self.extract_keywords(query);
        let confidence = score_confidence(intent.confidence, entities.len(), keywords.len());

        NlpResult {
            original_query: query.to_string(),
            intent,
            entities,
            keywords,
            confidence,
        }
    }

    pub fn classify_intent(&self, query: &str) -> IntentMatch {
        let tokens = tokenize(query);

        if let Some(forced) = ingredient_override(query, &tokens) {
            return forced;
        }

        let mut best = IntentMatch {
            intent: Intent::Unknown,
            confidence: 0.0,
        };
        for intent in SCORED_INTENTS {
            let keywords = intent.keywords();
            let hits = keywords
                .iter()
                .filter(|keyword| tokens.iter().any(|token| token_matches(token, keyword)))
                .count();
            let score = hits as f32 / keywords.len() as f32;
            // strictly greater keeps the first-seen intent on ties
            if score > best.confidence {
                best = IntentMatch {
                    intent,
                    confidence: score,
                };
            }
        }
        best
    }

    pub fn extract_entities(&self, query: &str) -> BTreeMap<EntityBucket, Vec<String>> {
        let mut entities = BTreeMap::new();

        let proper_nouns: Vec<String> = PROPER_NOUN
            .find_iter(query)
            .filter_map(|m| strip_leading_vocabulary(m.as_str()))
            .collect();
        insert_bucket(&mut entities, EntityBucket::ProperNouns, proper_nouns);

        let quoted: Vec<String> = QUOTED
            .captures_iter(query)
            .filter_map(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str().trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .collect();
        insert_bucket(&mut entities, EntityBucket::Quoted, quoted);

        for (bucket, pattern) in [
            (EntityBucket::Quantities, &*QUANTITY),
            (EntityBucket::Durations, &*DURATION),
            (EntityBucket::Temperatures, &*TEMPERATURE),
            (EntityBucket::Identifiers, &*IDENTIFIER),
        ] {
            let found = pattern
                .find_iter(query)
                .map(|m| m.as_str().to_string())
                .collect();
            insert_bucket(&mut entities, bucket, found);
        }

        let tokens = tokenize(query);
        let mut candidates = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if !is_candidate(token) {
                continue;
            }
            candidates.push(token.clone());
            if let Some(next) = tokens.get(i + 1).filter(|next| is_candidate(next)) {
                candidates.push(format!("{} {}", token, next));
            }
        }
        insert_bucket(&mut entities, EntityBucket::Candidates, candidates);

        entities
    }

    pub fn extract_keywords(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        tokenize(query)
            .into_iter()
            .filter(|token| {
                token.chars().count() > 2
                    && !is_stopword(token)
                    && !token.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
            })
            .filter(|token| seen.insert(token.clone()))
            .collect()
    }

    /// Plain-language hints for improving a question
    pub fn suggestions(&self, result: &NlpResult) -> Vec<String> {
        let mut suggestions = Vec::new();

        if result.confidence < 0.5 {
            suggestions.push("Try rephrasing the question with more specific terms".to_string());
        }
        if result.intent.intent == Intent::Unknown {
            suggestions.push(
                "Say what you are looking for, e.g. ingredients, recipes, counts or relationships"
                    .to_string(),
            );
        }
        let named = result
            .entities
            .keys()
            .any(|bucket| *bucket != EntityBucket::Candidates);
        if !named {
            suggestions.push(
                "Mention a specific item by name (capitalized) or in quotes".to_string(),
            );
        }
        if result.keywords.len() < 2 {
            suggestions.push("Add a few more descriptive words".to_string());
        }

        suggestions.extend(
            Intent::all()
                .iter()
                .filter_map(|intent| intent.example())
                .map(|example| format!("Example: \"{}\"", example)),
        );
        suggestions
    }
}

/// Weighted confidence: intent 40%, entity buckets up to 30%, keywords up to 30%
pub fn score_confidence(intent_confidence: f32, populated_buckets: usize, keyword_count: usize) -> f32 {
    let intent_part = intent_confidence.clamp(0.0, 1.0) * 0.4;
    let entity_part = (0.1 * populated_buckets as f32).min(0.3);
    let keyword_part = (0.05 * keyword_count as f32).min(0.3);
    (intent_part + entity_part + keyword_part).min(1.0)
}

fn ingredient_override(query: &str, tokens: &[String]) -> Option<IntentMatch> {
    let mentions_ingredient = tokens
        .iter()
        .any(|t| INGREDIENT_TERMS.iter().any(|term| t.contains(term)));
    if !mentions_ingredient {
        return None;
    }

    // title-cased vocabulary ("List All Ingredients") is not a target
    let has_capitalized_target = query
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .any(|word| word.chars().next().is_some_and(char::is_uppercase) && !is_vocabulary(word));
    let has_prepositional_target = tokens.windows(2).any(|pair| {
        TARGET_PREPOSITIONS.contains(&pair[0].as_str()) && !is_stopword(&pair[1])
    });
    if has_capitalized_target || has_prepositional_target {
        return Some(IntentMatch {
            intent: Intent::FindIngredients,
            confidence: FIND_INGREDIENTS_CONFIDENCE,
        });
    }

    if tokens.iter().any(|t| LISTING_TERMS.contains(&t.as_str())) {
        return Some(IntentMatch {
            intent: Intent::ListIngredients,
            confidence: LIST_INGREDIENTS_CONFIDENCE,
        });
    }
    None
}

/// Lowercased whitespace tokens with surrounding punctuation removed
fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Substring match in either direction; the reverse direction only for
/// tokens long enough to be meaningful
fn token_matches(token: &str, keyword: &str) -> bool {
    token.contains(keyword) || (token.chars().count() > 2 && keyword.contains(token))
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

fn is_candidate(token: &str) -> bool {
    token.chars().count() > 2 && !is_stopword(token)
}

fn is_vocabulary(word: &str) -> bool {
    let lower = word.to_lowercase();
    is_stopword(&lower)
        || INGREDIENT_TERMS.iter().any(|term| lower.contains(term))
        || SCORED_INTENTS
            .iter()
            .any(|intent| {
                intent
                    .keywords()
                    .iter()
                    .any(|k| lower == *k || lower.strip_suffix('s') == Some(*k))
            })
}

/// Drops sentence-initial capitalized words such as "Which" or "Ingredients"
fn strip_leading_vocabulary(sequence: &str) -> Option<String> {
    let words: Vec<&str> = sequence
        .split_whitespace()
        .skip_while(|word| is_vocabulary(word))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn insert_bucket(
    entities: &mut BTreeMap<EntityBucket, Vec<String>>,
    bucket: EntityBucket,
    values: Vec<String>,
) {
    let mut seen = HashSet::new();
    let values: Vec<String> = values.into_iter().filter(|v| seen.insert(v.clone())).collect();
    if !values.is_empty() {
        entities.insert(bucket, values);
    }
}
