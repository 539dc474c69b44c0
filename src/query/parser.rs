// Query parser (spec §4.12, P10): splits free text into a positive FTS
// projection and a set of negated terms, preserving quoted phrases as a
// single run so `"a b"` stays an exact-match unit rather than two tokens.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub positive_text: String,
    pub negative_terms: Vec<String>,
    pub has_quoted_phrase: bool,
    pub raw: String,
}

impl ParsedQuery {
    /// `positive_text` followed by a `NOT term` clause per negative, the
    /// shape `fts_search` expects as its MATCH argument.
    pub fn to_fts_query(&self) -> String {
        let mut parts = Vec::new();
        if !self.positive_text.is_empty() {
            parts.push(self.positive_text.clone());
        }
        for term in &self.negative_terms {
            parts.push(format!("NOT {term}"));
        }
        parts.join(" ")
    }
}

pub struct QueryParser;

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for ch in text.chars() {
        if ch == '"' {
            current.push(ch);
            in_quote = !in_quote;
            if !in_quote {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        if ch.is_whitespace() && !in_quote {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn strip_quotes(token: &str) -> String {
    token.trim_matches('"').to_string()
}

impl QueryParser {
    pub fn parse(text: &str) -> ParsedQuery {
        let tokens = tokenize(text);
        let has_quoted_phrase = tokens.iter().any(|t| t.starts_with('"'));

        let mut positive_tokens = Vec::new();
        let mut negative_terms = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            if token == "NOT" && i + 1 < tokens.len() {
                negative_terms.push(strip_quotes(&tokens[i + 1]));
                i += 2;
                continue;
            }
            if token.len() > 1 && token.starts_with('-') && !token.starts_with("\"") {
                negative_terms.push(strip_quotes(&token[1..]));
                i += 1;
                continue;
            }
            positive_tokens.push(token.clone());
            i += 1;
        }

        ParsedQuery {
            positive_text: positive_tokens.join(" "),
            negative_terms,
            has_quoted_phrase,
            raw: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negatives_and_quoted_phrase_are_separated_from_positive_text() {
        let parsed = QueryParser::parse("-x NOT y \"a b\" c");
        assert_eq!(parsed.positive_text, "\"a b\" c");
        assert_eq!(parsed.negative_terms, vec!["x".to_string(), "y".to_string()]);
        assert!(parsed.has_quoted_phrase);
    }

    #[test]
    fn plain_query_has_no_negatives() {
        let parsed = QueryParser::parse("sunset beach");
        assert_eq!(parsed.positive_text, "sunset beach");
        assert!(parsed.negative_terms.is_empty());
        assert!(!parsed.has_quoted_phrase);
    }

    #[test]
    fn to_fts_query_appends_not_clauses() {
        let parsed = QueryParser::parse("beach -rain");
        assert_eq!(parsed.to_fts_query(), "beach NOT rain");
    }

    #[test]
    fn lone_hyphen_is_not_treated_as_negative() {
        let parsed = QueryParser::parse("well-known -x");
        assert_eq!(parsed.positive_text, "well-known");
        assert_eq!(parsed.negative_terms, vec!["x".to_string()]);
    }
}
