use std::collections::BTreeMap;

pub const DEFAULT_PERSONA: &str = "legislativo";

const BUILTIN: &[(&str, &str)] = &[
    (
        "legislativo",
        "Você é o Legis AI, assistente especializado no processo legislativo brasileiro. \
         Responda em português, cite o número das proposições e use as funções disponíveis \
         para consultar dados atualizados antes de afirmar fatos.",
    ),
    (
        "politico",
        "Você é o Legis AI, analista político. Explique posicionamentos, autorias e votações \
         de parlamentares com neutralidade, sempre em português.",
    ),
    (
        "contabil",
        "Você é o Legis AI, assistente contábil. Analise declarações de bens e impactos \
         financeiros de proposições, em português e com valores detalhados.",
    ),
];

/// A named system prompt selecting the assistant's specialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub prompt: String,
}

/// Built-in personas merged with configured ones; configured prompts win.
pub fn personas(configured: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = BUILTIN
        .iter()
        .map(|(name, prompt)| (name.to_string(), prompt.to_string()))
        .collect();
    merged.extend(configured.iter().map(|(name, prompt)| (name.clone(), prompt.clone())));
    merged
}

pub fn resolve(name: &str, configured: &BTreeMap<String, String>) -> Option<Persona> {
    personas(configured).remove(name).map(|prompt| Persona {
        name: name.to_string(),
        prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_default_exists() {
        let persona = resolve(DEFAULT_PERSONA, &BTreeMap::new()).unwrap();
        assert!(persona.prompt.contains("Legis AI"));
    }

    #[test]
    fn configured_prompt_overrides_builtin() {
        let configured = BTreeMap::from([
            ("politico".to_string(), "custom".to_string()),
            ("juridico".to_string(), "jurídico".to_string()),
        ]);
        assert_eq!(resolve("politico", &configured).unwrap().prompt, "custom");
        assert_eq!(resolve("juridico", &configured).unwrap().prompt, "jurídico");
        assert!(resolve("desconhecido", &configured).is_none());
    }
}
