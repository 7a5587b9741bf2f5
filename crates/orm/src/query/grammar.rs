//! Identifier quoting

/// Grammar-level identifier quoting for one SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar {
    quote: char,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::postgres()
    }
}

impl Grammar {
    /// Double-quoted identifiers
    pub fn postgres() -> Self {
        Self { quote: '"' }
    }

    /// Grammar with a custom quote character
    pub fn with_quote(quote: char) -> Self {
        Self { quote }
    }

    /// Quote an identifier such as `users.id` or `posts as p`
    pub fn wrap(&self, identifier: &str) -> String {
        let lower = identifier.to_ascii_lowercase();
        if let Some(pos) = lower.find(" as ") {
            let (name, alias) = (&identifier[..pos], &identifier[pos + 4..]);
            return format!("{} as {}", self.wrap(name), self.wrap_segment(alias.trim()));
        }

        identifier
            .trim()
            .split('.')
            .map(|segment| self.wrap_segment(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn wrap_segment(&self, segment: &str) -> String {
        if segment == "*" {
            return segment.to_string();
        }
        let q = self.quote;
        let escaped = segment.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_dotted_and_star() {
        let grammar = Grammar::postgres();
        assert_eq!(grammar.wrap("users.id"), "\"users\".\"id\"");
        assert_eq!(grammar.wrap("users.*"), "\"users\".*");
    }

    #[test]
    fn test_wrap_alias() {
        let grammar = Grammar::with_quote('`');
        assert_eq!(grammar.wrap("posts as self_1"), "`posts` as `self_1`");
        assert_eq!(grammar.wrap("weird`name"), "`weird``name`");
    }

    #[test]
    fn test_wrap_alias_after_multibyte_name() {
        let grammar = Grammar::postgres();
        assert_eq!(grammar.wrap("İİ as x"), "\"İİ\" as \"x\"");
        assert_eq!(grammar.wrap("posts AS p"), "\"posts\" as \"p\"");
    }
}
