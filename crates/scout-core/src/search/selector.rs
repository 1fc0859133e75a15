//! Capability selection strategies.

use crate::mcp::Capability;

/// Picks the capability that answers a search, if the backend exposes one.
pub trait CapabilitySelector: Send + Sync {
    fn select<'a>(&self, capabilities: &'a [Capability]) -> Option<&'a Capability>;
}

/// First capability whose name contains one of the tokens, ignoring case.
#[derive(Debug, Clone)]
pub struct KeywordSelector {
    tokens: Vec<String>,
}

impl KeywordSelector {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|token| token.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordSelector {
    fn default() -> Self {
        Self::new(["search", "find"])
    }
}

impl CapabilitySelector for KeywordSelector {
    fn select<'a>(&self, capabilities: &'a [Capability]) -> Option<&'a Capability> {
        capabilities.iter().find(|capability| {
            let name = capability.name.to_lowercase();
            self.tokens.iter().any(|token| name.contains(token.as_str()))
        })
    }
}

/// Exact capability name, for backends whose search tool is known.
#[derive(Debug, Clone)]
pub struct ExactSelector {
    name: String,
}

impl ExactSelector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CapabilitySelector for ExactSelector {
    fn select<'a>(&self, capabilities: &'a [Capability]) -> Option<&'a Capability> {
        capabilities
            .iter()
            .find(|capability| capability.name == self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn capabilities(names: &[&str]) -> Vec<Capability> {
        names.iter().map(|name| Capability::new(*name)).collect()
    }

    #[rstest]
    #[case(&["fetch", "notion-search", "find-pages"], Some("notion-search"))]
    #[case(&["FindIssues", "search"], Some("FindIssues"))]
    #[case(&["SEARCH_ALL"], Some("SEARCH_ALL"))]
    #[case(&["fetch", "create-page"], None)]
    #[case(&[], None)]
    fn keyword_selector_takes_first_match(
        #[case] names: &[&str],
        #[case] expected: Option<&str>,
    ) {
        let available = capabilities(names);
        let selected = KeywordSelector::default().select(&available);
        assert_eq!(selected.map(|c| c.name.as_str()), expected);
    }

    #[test]
    fn exact_selector_ignores_near_misses() {
        let available = capabilities(&["search-pages", "search"]);
        let selected = ExactSelector::new("search").select(&available);
        assert_eq!(selected.map(|c| c.name.as_str()), Some("search"));
        assert!(ExactSelector::new("Search").select(&available).is_none());
    }
}
