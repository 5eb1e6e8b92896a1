// ABOUTME: Local (non-LLM) translation techniques for natural-language graph questions
// ABOUTME: Complexity analyzer, NLP processor, pattern template engine and query synthesizer

pub mod complexity;
pub mod nlp_processor;
pub mod synthesizer;
pub mod templates;

#[cfg(test)]
pub(crate) mod test_support;

pub use complexity::{ComplexityAnalyzer, ComplexityScore};
pub use nlp_processor::{EntityBucket, Intent, IntentMatch, NlpProcessor, NlpResult};
pub use synthesizer::{QuerySynthesizer, SynthesisOutcome, SynthesizedQuery};
pub use templates::{PatternTemplateEngine, TemplateMatch, TemplateOutcome, TemplateRule};
