//! Log Template Miner (C3): a fixed-depth prefix tree (indexed by token
//! count, then first-token literal) whose leaves carry clusters. New lines
//! either merge into an existing cluster (generalizing diverging positions
//! to `<*>`) or start a new one.

use std::collections::HashMap;

const WILDCARD: &str = "<*>";
const SIMILARITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone)]
struct Cluster {
    id: usize,
    template: Vec<String>,
}

impl Cluster {
    fn template_string(&self) -> String {
        self.template.join(" ")
    }
}

#[derive(Debug, Default)]
pub struct TemplateMiner {
    next_id: usize,
    // token_count -> first_token -> candidate cluster ids, the fixed-depth
    // prefix index.
    index: HashMap<usize, HashMap<String, Vec<usize>>>,
    clusters: HashMap<usize, Cluster>,
}

/// Result of mining one line: its cluster id (`"C<n>"`), the cluster's
/// current template, and the concrete tokens that aligned with `<*>`
/// positions, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct MinedLine {
    pub cluster_id: String,
    pub template: String,
    pub variables: Vec<String>,
}

impl TemplateMiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, line: &str) -> MinedLine {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let token_count = tokens.len();
        let first_token = tokens.first().copied().unwrap_or("").to_string();

        let candidates = self
            .index
            .get(&token_count)
            .and_then(|by_first| by_first.get(&first_token))
            .cloned()
            .unwrap_or_default();

        for cluster_id in candidates {
            let template = self.clusters[&cluster_id].template.clone();
            if template.len() != token_count {
                continue;
            }
            let matches = template
                .iter()
                .zip(tokens.iter())
                .filter(|(t, tok)| t.as_str() == WILDCARD || t.as_str() == **tok)
                .count();
            let similarity = matches as f64 / token_count.max(1) as f64;
            if similarity >= SIMILARITY_THRESHOLD {
                return self.merge(cluster_id, &tokens);
            }
        }

        self.create_cluster(token_count, first_token, &tokens)
    }

    fn merge(&mut self, cluster_id: usize, tokens: &[&str]) -> MinedLine {
        let cluster = self.clusters.get_mut(&cluster_id).expect("cluster exists");
        let mut variables = Vec::new();
        for (slot, tok) in cluster.template.iter_mut().zip(tokens.iter()) {
            if slot != WILDCARD && slot != tok {
                *slot = WILDCARD.to_string();
            }
            if slot == WILDCARD {
                variables.push((*tok).to_string());
            }
        }
        MinedLine {
            cluster_id: format!("C{cluster_id}"),
            template: cluster.template_string(),
            variables,
        }
    }

    fn create_cluster(&mut self, token_count: usize, first_token: String, tokens: &[&str]) -> MinedLine {
        let id = self.next_id + 1;
        self.next_id = id;
        let template: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        let template_string = template.join(" ");
        self.clusters.insert(id, Cluster { id, template });
        self.index
            .entry(token_count)
            .or_default()
            .entry(first_token)
            .or_default()
            .push(id);
        MinedLine {
            cluster_id: format!("C{id}"),
            template: template_string,
            variables: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_creates_cluster_c1() {
        let mut miner = TemplateMiner::new();
        let mined = miner.parse("Connection to db:mysql failed");
        assert_eq!(mined.cluster_id, "C1");
        assert_eq!(mined.template, "Connection to db:mysql failed");
        assert!(mined.variables.is_empty());
    }

    #[test]
    fn second_similar_line_merges_and_generalizes() {
        let mut miner = TemplateMiner::new();
        miner.parse("Connection to db:mysql failed");
        let mined = miner.parse("Connection to cache:redis failed");
        assert_eq!(mined.cluster_id, "C1");
        assert_eq!(mined.template, "Connection to <*> failed");
        assert_eq!(mined.variables, vec!["cache:redis".to_string()]);
    }

    #[test]
    fn dissimilar_line_starts_a_new_cluster() {
        let mut miner = TemplateMiner::new();
        miner.parse("Connection to db:mysql failed");
        let mined = miner.parse("Disk usage at 92 percent");
        assert_eq!(mined.cluster_id, "C2");
    }

    #[test]
    fn repeated_merges_keep_widening_the_wildcard_set() {
        let mut miner = TemplateMiner::new();
        miner.parse("User alice logged in");
        miner.parse("User bob logged in");
        let mined = miner.parse("User carol logged in");
        assert_eq!(mined.template, "User <*> logged in");
        assert_eq!(mined.variables, vec!["carol".to_string()]);
    }
}
