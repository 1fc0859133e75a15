//! The fixed tool set declared to the model.

use serde_json::{Value, json};
use std::fmt;

use crate::api::ToolDeclaration;
use crate::config::ServiceId;

pub const SEARCH_ALL_TOOL: &str = "searchAll";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchTool {
    /// Search one backend.
    Service(ServiceId),
    /// Fan out to every configured backend.
    All,
}

impl SearchTool {
    /// One tool per configured backend, then the aggregate tool.
    pub fn for_services(services: &[ServiceId]) -> Vec<SearchTool> {
        services
            .iter()
            .copied()
            .map(SearchTool::Service)
            .chain(std::iter::once(SearchTool::All))
            .collect()
    }

    pub fn name(&self) -> String {
        match self {
            SearchTool::Service(service) => format!("search{}", service.display_name()),
            SearchTool::All => SEARCH_ALL_TOOL.to_string(),
        }
    }

    /// Resolve a tool name requested by the model against the configured
    /// services.
    pub fn parse(name: &str, services: &[ServiceId]) -> Option<SearchTool> {
        if name == SEARCH_ALL_TOOL {
            return Some(SearchTool::All);
        }
        services
            .iter()
            .copied()
            .map(SearchTool::Service)
            .find(|tool| tool.name() == name)
    }

    pub fn declaration(&self) -> ToolDeclaration {
        let description = match self {
            SearchTool::Service(service) => format!(
                "Search {} for documents, pages and issues matching a query.",
                service.display_name()
            ),
            SearchTool::All => {
                "Search every connected knowledge source at once and return merged results, newest first."
                    .to_string()
            }
        };

        ToolDeclaration {
            name: self.name(),
            description,
            input_schema: query_schema(),
        }
    }

    pub fn declarations(services: &[ServiceId]) -> Vec<ToolDeclaration> {
        Self::for_services(services)
            .iter()
            .map(SearchTool::declaration)
            .collect()
    }
}

impl fmt::Display for SearchTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn query_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to search for"
            }
        },
        "required": ["query"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn declares_one_tool_per_service_plus_aggregate() {
        let names: Vec<_> = SearchTool::declarations(&ServiceId::all())
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["searchNotion", "searchAtlassian", "searchAll"]);
    }

    #[rstest]
    #[case("searchNotion", Some(SearchTool::Service(ServiceId::Notion)))]
    #[case("searchAtlassian", None)]
    #[case("searchAll", Some(SearchTool::All))]
    #[case("searchnotion", None)]
    fn parse_respects_configured_services(
        #[case] name: &str,
        #[case] expected: Option<SearchTool>,
    ) {
        assert_eq!(SearchTool::parse(name, &[ServiceId::Notion]), expected);
    }

    #[test]
    fn schema_requires_query() {
        let declaration = SearchTool::All.declaration();
        assert_eq!(declaration.input_schema["required"][0], "query");
    }
}
