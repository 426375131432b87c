//! Embedded markdown workflow files served over the optional `prompts/*`
//! methods (spec §6 "Embedded assets"; supplemental per SPEC_FULL §10.7).

use serde_json::{json, Value as Json};

const PROMPTS: &[(&str, &str, &str)] = &[
    ("using_ingest", "How to ingest findings, structured or raw", include_str!("../assets/using_ingest.md")),
    ("using_search", "How full-text search and its context fan-out works", include_str!("../assets/using_search.md")),
    ("using_topology", "How the bounded topology traversal behaves", include_str!("../assets/using_topology.md")),
];

pub fn list() -> Json {
    let prompts: Vec<Json> = PROMPTS
        .iter()
        .map(|(name, description, _)| json!({"name": name, "description": description}))
        .collect();
    json!({ "prompts": prompts })
}

pub fn get(name: &str) -> Option<Json> {
    PROMPTS.iter().find(|(n, _, _)| *n == name).map(|(_, _, body)| {
        json!({
            "messages": [
                {"role": "assistant", "content": {"type": "text", "text": body}}
            ]
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_prompt_resolves() {
        let listed = list();
        let names: Vec<String> = listed["prompts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        for name in names {
            assert!(get(&name).is_some());
        }
    }

    #[test]
    fn unknown_prompt_returns_none() {
        assert!(get("does_not_exist").is_none());
    }
}
