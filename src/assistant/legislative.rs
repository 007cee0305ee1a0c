//! Tools the assistant may call against the legislative backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::assistant::backend::Backend;
use crate::assistant::tools::{
    ToolDefinition, ToolFunction, ToolHandler, ToolParam, ToolParamType, ToolRegistry,
    optional_str, required_str,
};
use crate::error::ToolError;

pub const SEARCH_PROPOSITIONS: &str = "searchPropositions";
pub const GET_PROPOSITION_DETAILS: &str = "getPropositionDetails";
pub const SEARCH_AUTHORS: &str = "searchAuthors";

/// Semantic (vector) search over legislative propositions.
pub struct SearchPropositions;

#[async_trait]
impl ToolHandler for SearchPropositions {
    async fn call(&self, args: Value, backend: &dyn Backend) -> Result<Value, ToolError> {
        let query = required_str(&args, "searchParam")?;
        let path = format!(
            "/proposition/vetorial?searchParam={}",
            urlencoding::encode(query)
        );
        Ok(backend.get(&path, true).await?.into_success(&path)?)
    }
}

/// Processing history and details of one proposition.
pub struct GetPropositionDetails;

#[async_trait]
impl ToolHandler for GetPropositionDetails {
    async fn call(&self, args: Value, backend: &dyn Backend) -> Result<Value, ToolError> {
        let id = optional_str(&args, "id").ok_or(ToolError::MissingArgument("id"))?;
        let path = format!("/proposition-process/{}", urlencoding::encode(&id));
        Ok(backend.get(&path, true).await?.into_success(&path)?)
    }
}

/// Politician (proposition author) search.
pub struct SearchAuthors;

#[async_trait]
impl ToolHandler for SearchAuthors {
    async fn call(&self, args: Value, backend: &dyn Backend) -> Result<Value, ToolError> {
        let query = required_str(&args, "query")?;
        let mut path = format!("/politician?query={}", urlencoding::encode(query));
        if let Some(house) = optional_str(&args, "house") {
            path.push_str("&house=");
            path.push_str(&urlencoding::encode(&house));
        }
        Ok(backend.get(&path, true).await?.into_success(&path)?)
    }
}

fn describe(text: &str) -> Option<String> {
    Some(text.to_string())
}

/// Registry holding every legislative tool.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDefinition::from_function(
            ToolFunction::new(
                SEARCH_PROPOSITIONS,
                "Busca proposições legislativas (projetos de lei, PECs, MPs) por similaridade de texto.",
            )
            .with_param(ToolParam::new(
                "searchParam",
                ToolParamType::String,
                true,
                describe("Tema, número ou ementa da proposição, ex.: \"PL 123/2020\"."),
            )),
        ),
        SearchPropositions,
    )?;

    registry.register(
        ToolDefinition::from_function(
            ToolFunction::new(
                GET_PROPOSITION_DETAILS,
                "Obtém a tramitação e os detalhes de uma proposição pelo seu identificador.",
            )
            .with_param(ToolParam::new(
                "id",
                ToolParamType::String,
                true,
                describe("Identificador da proposição retornado pela busca."),
            )),
        ),
        GetPropositionDetails,
    )?;

    registry.register(
        ToolDefinition::from_function(
            ToolFunction::new(
                SEARCH_AUTHORS,
                "Busca parlamentares autores de proposições pelo nome.",
            )
            .with_param(ToolParam::new(
                "query",
                ToolParamType::String,
                true,
                describe("Nome ou parte do nome do parlamentar."),
            ))
            .with_param(
                ToolParam::new(
                    "house",
                    ToolParamType::String,
                    false,
                    describe("Casa legislativa."),
                )
                .with_enum(["camara", "senado"]),
            ),
        ),
        SearchAuthors,
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::backend::testing::FakeBackend;
    use crate::assistant::tools::ToolCall;
    use serde_json::json;

    #[test]
    fn registry_exposes_three_tools() {
        let registry = default_registry().unwrap();
        let names: Vec<_> = registry
            .schemas()
            .iter()
            .map(|schema| schema["function"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            [SEARCH_PROPOSITIONS, GET_PROPOSITION_DETAILS, SEARCH_AUTHORS]
        );
    }

    #[tokio::test]
    async fn proposition_search_encodes_query_and_uses_auth() {
        let registry = default_registry().unwrap();
        let backend = FakeBackend::default().respond(
            "GET",
            "/proposition/vetorial",
            200,
            json!([{ "id": 42, "title": "PL 123/2020" }]),
        );
        let calls = [ToolCall::new(
            "c1",
            SEARCH_PROPOSITIONS,
            r#"{"searchParam":"PL 123/2020"}"#,
        )];

        let outputs = registry.execute(&calls, &backend).await;

        assert_eq!(outputs[0].output, Some(json!([{ "id": 42, "title": "PL 123/2020" }])));
        let recorded = backend.calls();
        assert_eq!(
            recorded[0].path,
            "/proposition/vetorial?searchParam=PL%20123%2F2020"
        );
        assert!(recorded[0].auth);
    }

    #[tokio::test]
    async fn numeric_ids_are_accepted() {
        let registry = default_registry().unwrap();
        let backend =
            FakeBackend::default().respond("GET", "/proposition-process/42", 200, json!({ "id": 42 }));
        let calls = [ToolCall::new("c1", GET_PROPOSITION_DETAILS, r#"{"id":42}"#)];

        let outputs = registry.execute(&calls, &backend).await;

        assert_eq!(outputs[0].output, Some(json!({ "id": 42 })));
    }

    #[tokio::test]
    async fn backend_status_errors_become_tool_errors() {
        let registry = default_registry().unwrap();
        let backend = FakeBackend::default().respond("GET", "/politician", 500, Value::Null);
        let calls = [ToolCall::new(
            "c1",
            SEARCH_AUTHORS,
            r#"{"query":"Silva","house":"senado"}"#,
        )];

        let outputs = registry.execute(&calls, &backend).await;

        assert_eq!(
            outputs[0].error.as_deref(),
            Some("backend returned status 500 for /politician?query=Silva&house=senado")
        );
    }

    #[tokio::test]
    async fn missing_argument_is_reported() {
        let registry = default_registry().unwrap();
        let backend = FakeBackend::default();
        let calls = [ToolCall::new("c1", SEARCH_AUTHORS, "{}")];

        let outputs = registry.execute(&calls, &backend).await;

        assert_eq!(
            outputs[0].error.as_deref(),
            Some("missing required argument 'query'")
        );
        assert!(backend.calls().is_empty());
    }
}
