use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```[ \t]*(?:cypher|sql)?[ \t]*\r?\n(.*?)```").unwrap();
    static ref CYPHER_START: Regex =
        Regex::new(r"(?i)^\s*(?:MATCH|OPTIONAL\s+MATCH|WITH|UNWIND|CALL|RETURN)\b").unwrap();
}

/// Pull a Cypher statement out of free-form model output.
///
/// Prefers a fenced code block; otherwise takes the first line that starts
/// with a Cypher clause keyword plus the lines that follow it up to the next
/// blank line. A trailing semicolon is dropped.
pub fn extract_cypher(text: &str) -> Option<String> {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        let body = caps.get(1).map_or("", |m| m.as_str());
        return normalize(body);
    }

    let mut lines = text.lines().skip_while(|line| !CYPHER_START.is_match(line));
    let first = lines.next()?;
    let statement: Vec<&str> = std::iter::once(first)
        .chain(lines.take_while(|line| !line.trim().is_empty()))
        .collect();
    normalize(&statement.join("\n"))
}

fn normalize(statement: &str) -> Option<String> {
    let cleaned = statement.trim().trim_end_matches(';').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block() {
        let text = "Here you go:\n```cypher\nMATCH (n {name: 'Speck'})\nRETURN n;\n```\nDone.";
        assert_eq!(
            extract_cypher(text).as_deref(),
            Some("MATCH (n {name: 'Speck'})\nRETURN n")
        );
    }

    #[test]
    fn test_bare_statement_after_prose() {
        let text = "The query is:\nMATCH (n) WHERE n.type = 'recipe'\nRETURN count(n)\n\nThis counts recipes.";
        assert_eq!(
            extract_cypher(text).as_deref(),
            Some("MATCH (n) WHERE n.type = 'recipe'\nRETURN count(n)")
        );
    }

    #[test]
    fn test_no_statement() {
        assert_eq!(extract_cypher("I cannot answer that."), None);
        assert_eq!(extract_cypher("```\n\n```"), None);
    }
}
