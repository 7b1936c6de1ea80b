//! In-memory prefix/fuzzy token index.
//!
//! A trie of lowercased tokens extracted from indexed chunk text. Each
//! terminal node carries a posting set of source file ids with per-file
//! frequencies. Single writer, many readers (one `RwLock` around the
//! whole structure); updates land after the chunk transaction commits,
//! and the entire index is rebuilt from the chunk catalog on startup - it
//! is a cache, never authoritative.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::Serialize;

use store::TenantScope;

use crate::tokenize::{tokenize, TokenizerConfig};

/// Hard cap on fuzzy edit distance.
pub const MAX_FUZZY_EDITS: u32 = 2;

#[derive(Default)]
struct Postings {
    /// file id -> occurrences of this token in that file's chunks.
    files: HashMap<String, u32>,
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    postings: Option<Postings>,
}

#[derive(Default)]
struct Inner {
    root: TrieNode,
    /// file id -> owning tenant, for scope filtering at query time.
    file_tenants: HashMap<String, String>,
    /// file id -> distinct tokens it contributed, for removal.
    file_tokens: HashMap<String, Vec<String>>,
}

/// Autocomplete hit: a token and its tenant-scoped frequency.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenHit {
    pub token: String,
    pub frequency: u64,
    pub source_file_ids: Vec<String>,
}

/// Fuzzy hit: a token and its edit distance from the query.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FuzzyHit {
    pub token: String,
    pub distance: u32,
}

/// The prefix/fuzzy index.
pub struct PrefixIndex {
    inner: RwLock<Inner>,
    tokenizer: TokenizerConfig,
}

impl PrefixIndex {
    pub fn new(tokenizer: TokenizerConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            tokenizer,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// (Re)index one file's text. Prior postings of the file are retired
    /// first, so calling this after every chunk rewrite keeps the index
    /// consistent with the catalog.
    pub fn index_text(&self, tenant_id: &str, file_id: &str, text: &str) {
        let tokens = tokenize(text, &self.tokenizer);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *counts.entry(token).or_insert(0) += 1;
        }

        let mut inner = self.write();
        Self::remove_file_locked(&mut inner, file_id);
        let mut distinct = Vec::with_capacity(counts.len());
        for (token, count) in counts {
            let mut node = &mut inner.root;
            for ch in token.chars() {
                node = node.children.entry(ch).or_default();
            }
            node.postings
                .get_or_insert_with(Postings::default)
                .files
                .insert(file_id.to_string(), count);
            distinct.push(token);
        }
        inner
            .file_tenants
            .insert(file_id.to_string(), tenant_id.to_string());
        inner.file_tokens.insert(file_id.to_string(), distinct);
    }

    /// Drop every posting of a file (delete or re-index).
    pub fn remove_file(&self, file_id: &str) {
        let mut inner = self.write();
        Self::remove_file_locked(&mut inner, file_id);
    }

    fn remove_file_locked(inner: &mut Inner, file_id: &str) {
        let tokens = inner.file_tokens.remove(file_id).unwrap_or_default();
        inner.file_tenants.remove(file_id);
        for token in tokens {
            let mut node = &mut inner.root;
            let mut found = true;
            for ch in token.chars() {
                match node.children.get_mut(&ch) {
                    Some(next) => node = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found {
                if let Some(postings) = node.postings.as_mut() {
                    postings.files.remove(file_id);
                    if postings.files.is_empty() {
                        node.postings = None;
                    }
                }
            }
        }
    }

    fn scoped_hit(inner: &Inner, token: String, postings: &Postings, tenant: &str) -> Option<TokenHit> {
        let mut frequency: u64 = 0;
        let mut source_file_ids = Vec::new();
        for (file_id, count) in &postings.files {
            if inner.file_tenants.get(file_id).map(String::as_str) == Some(tenant) {
                frequency += u64::from(*count);
                source_file_ids.push(file_id.clone());
            }
        }
        if frequency == 0 {
            return None;
        }
        source_file_ids.sort();
        Some(TokenHit {
            token,
            frequency,
            source_file_ids,
        })
    }

    /// Top-`k` completions of `prefix` by tenant-scoped frequency, ties
    /// broken lexicographically.
    pub fn autocomplete(&self, scope: &TenantScope, prefix: &str, k: usize) -> Vec<TokenHit> {
        let prefix = prefix.to_lowercase();
        let inner = self.read();
        let mut node = &inner.root;
        for ch in prefix.chars() {
            match node.children.get(&ch) {
                Some(next) => node = next,
                None => return Vec::new(),
            }
        }

        let mut hits = Vec::new();
        let mut stack = vec![(node, prefix.clone())];
        while let Some((node, token)) = stack.pop() {
            if let Some(postings) = &node.postings {
                if let Some(hit) =
                    Self::scoped_hit(&inner, token.clone(), postings, scope.tenant_id())
                {
                    hits.push(hit);
                }
            }
            for (ch, child) in &node.children {
                let mut next = token.clone();
                next.push(*ch);
                stack.push((child, next));
            }
        }

        hits.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.token.cmp(&b.token))
        });
        hits.truncate(k);
        hits
    }

    /// Combined lookup for a free-text query: exact postings for every
    /// query token, plus completions of the trailing term, ranked by
    /// tenant-scoped frequency.
    pub fn query_hits(&self, scope: &TenantScope, query: &str, k: usize) -> Vec<TokenHit> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut hits = Vec::new();

        for token in tokenize(query, &self.tokenizer) {
            if !seen.insert(token.clone()) {
                continue;
            }
            if let Some(hit) = self.token_hit(scope, &token) {
                hits.push(hit);
            }
        }

        let trailing = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .last();
        if let Some(prefix) = trailing {
            for hit in self.autocomplete(scope, prefix, k) {
                if seen.insert(hit.token.clone()) {
                    hits.push(hit);
                }
            }
        }

        hits.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.token.cmp(&b.token))
        });
        hits.truncate(k);
        hits
    }

    fn token_hit(&self, scope: &TenantScope, token: &str) -> Option<TokenHit> {
        let token = token.to_lowercase();
        let inner = self.read();
        let mut node = &inner.root;
        for ch in token.chars() {
            node = node.children.get(&ch)?;
        }
        let postings = node.postings.as_ref()?;
        Self::scoped_hit(&inner, token, postings, scope.tenant_id())
    }

    /// Source files containing `token`, under the tenant scope.
    pub fn exact(&self, scope: &TenantScope, token: &str) -> HashSet<String> {
        let token = token.to_lowercase();
        let inner = self.read();
        let mut node = &inner.root;
        for ch in token.chars() {
            match node.children.get(&ch) {
                Some(next) => node = next,
                None => return HashSet::new(),
            }
        }
        match &node.postings {
            Some(postings) => postings
                .files
                .keys()
                .filter(|file_id| {
                    inner.file_tenants.get(*file_id).map(String::as_str)
                        == Some(scope.tenant_id())
                })
                .cloned()
                .collect(),
            None => HashSet::new(),
        }
    }

    /// Tokens within `max_edits` Levenshtein distance of `token`,
    /// restricted to the tenant scope and capped at [`MAX_FUZZY_EDITS`].
    /// The DFS carries one DP row per node and prunes any branch whose
    /// minimum row value already exceeds the budget.
    pub fn fuzzy(&self, scope: &TenantScope, token: &str, max_edits: u32) -> Vec<FuzzyHit> {
        let max_edits = max_edits.min(MAX_FUZZY_EDITS);
        let query: Vec<char> = token.to_lowercase().chars().collect();
        if query.is_empty() {
            return Vec::new();
        }

        let inner = self.read();
        let first_row: Vec<u32> = (0..=query.len() as u32).collect();
        let mut hits = Vec::new();
        for (ch, child) in &inner.root.children {
            Self::fuzzy_walk(
                &inner,
                child,
                *ch,
                &query,
                &first_row,
                &mut String::new(),
                max_edits,
                scope.tenant_id(),
                &mut hits,
            );
        }
        hits.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.token.cmp(&b.token)));
        hits
    }

    #[allow(clippy::too_many_arguments)]
    fn fuzzy_walk(
        inner: &Inner,
        node: &TrieNode,
        ch: char,
        query: &[char],
        prev_row: &[u32],
        token: &mut String,
        max_edits: u32,
        tenant: &str,
        hits: &mut Vec<FuzzyHit>,
    ) {
        token.push(ch);

        // Incremental Levenshtein row for the token so far.
        let mut row = Vec::with_capacity(query.len() + 1);
        row.push(prev_row[0] + 1);
        for (i, &qc) in query.iter().enumerate() {
            let insert = row[i] + 1;
            let delete = prev_row[i + 1] + 1;
            let replace = prev_row[i] + u32::from(qc != ch);
            row.push(insert.min(delete).min(replace));
        }

        let last = *row.last().unwrap_or(&u32::MAX);
        if last <= max_edits {
            if let Some(postings) = &node.postings {
                let visible = postings.files.keys().any(|file_id| {
                    inner.file_tenants.get(file_id).map(String::as_str) == Some(tenant)
                });
                if visible {
                    hits.push(FuzzyHit {
                        token: token.clone(),
                        distance: last,
                    });
                }
            }
        }

        if row.iter().min().copied().unwrap_or(u32::MAX) <= max_edits {
            for (next_ch, child) in &node.children {
                Self::fuzzy_walk(
                    inner, child, *next_ch, query, &row, token, max_edits, tenant, hits,
                );
            }
        }
        token.pop();
    }

    /// Number of files currently contributing postings.
    pub fn indexed_files(&self) -> usize {
        self.read().file_tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(tenant: &str) -> TenantScope {
        TenantScope::for_tests(tenant)
    }

    fn index_with_files() -> PrefixIndex {
        let index = PrefixIndex::new(TokenizerConfig::default());
        index.index_text("t1", "f1", "neural network training. training networks daily");
        index.index_text("t1", "f2", "sourdough baking network");
        index.index_text("t2", "f3", "neural seeds");
        index
    }

    #[test]
    fn autocomplete_orders_by_frequency_then_lexicographic() {
        let index = index_with_files();
        let hits = index.autocomplete(&scope("t1"), "ne", 10);
        let tokens: Vec<&str> = hits.iter().map(|h| h.token.as_str()).collect();
        // "network" appears in f1 and f2; "networks" sorts before
        // "neural" on the frequency tie.
        assert_eq!(tokens, vec!["network", "networks", "neural"]);
        assert_eq!(hits[0].frequency, 2);
        assert_eq!(hits[0].source_file_ids, vec!["f1".to_string(), "f2".to_string()]);
    }

    #[test]
    fn autocomplete_respects_k_and_unknown_prefix() {
        let index = index_with_files();
        assert_eq!(index.autocomplete(&scope("t1"), "ne", 1).len(), 1);
        assert!(index.autocomplete(&scope("t1"), "zz", 5).is_empty());
    }

    #[test]
    fn autocomplete_is_tenant_scoped() {
        let index = index_with_files();
        let hits = index.autocomplete(&scope("t2"), "ne", 10);
        let tokens: Vec<&str> = hits.iter().map(|h| h.token.as_str()).collect();
        assert_eq!(tokens, vec!["neural"]);
        assert_eq!(hits[0].source_file_ids, vec!["f3".to_string()]);
    }

    #[test]
    fn exact_lookup_returns_owning_files() {
        let index = index_with_files();
        let files = index.exact(&scope("t1"), "network");
        assert_eq!(files.len(), 2);
        assert!(files.contains("f1") && files.contains("f2"));
        assert!(index.exact(&scope("t1"), "seeds").is_empty());
        assert!(index.exact(&scope("t2"), "seeds").contains("f3"));
    }

    #[test]
    fn fuzzy_finds_tokens_within_edit_budget() {
        let index = index_with_files();
        let hits = index.fuzzy(&scope("t1"), "netwrk", 2);
        let tokens: Vec<&str> = hits.iter().map(|h| h.token.as_str()).collect();
        assert!(tokens.contains(&"network"));
        let network = hits.iter().find(|h| h.token == "network").unwrap();
        assert_eq!(network.distance, 1);
    }

    #[test]
    fn fuzzy_distance_cap_is_two() {
        let index = index_with_files();
        // Requesting a larger budget still caps at 2 edits.
        let hits = index.fuzzy(&scope("t1"), "nxtwxrk", 10);
        assert!(hits.iter().all(|h| h.distance <= 2));
    }

    #[test]
    fn fuzzy_exact_match_has_distance_zero() {
        let index = index_with_files();
        let hits = index.fuzzy(&scope("t1"), "network", 2);
        assert_eq!(hits[0].token, "network");
        assert_eq!(hits[0].distance, 0);
    }

    #[test]
    fn query_hits_mixes_exact_tokens_and_trailing_completions() {
        let index = index_with_files();
        // "training" matches exactly; "netw" only as a prefix.
        let hits = index.query_hits(&scope("t1"), "training netw", 10);
        let tokens: Vec<&str> = hits.iter().map(|h| h.token.as_str()).collect();
        assert!(tokens.contains(&"training"));
        assert!(tokens.contains(&"network"));
        assert!(tokens.contains(&"networks"));
        // "network" (f1+f2) and "training" (twice in f1) tie at two
        // occurrences and sort lexicographically.
        assert_eq!(hits[0].token, "network");
        assert_eq!(hits[0].frequency, 2);
        assert_eq!(hits[1].token, "training");
        assert_eq!(hits[1].frequency, 2);
    }

    #[test]
    fn query_hits_respects_k_and_scope() {
        let index = index_with_files();
        assert_eq!(index.query_hits(&scope("t1"), "training netw", 1).len(), 1);
        assert!(index.query_hits(&scope("t2"), "sourdough", 5).is_empty());
    }

    #[test]
    fn removing_a_file_retires_its_postings() {
        let index = index_with_files();
        index.remove_file("f1");
        let hits = index.autocomplete(&scope("t1"), "ne", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].token, "network");
        assert_eq!(hits[0].frequency, 1);
        assert!(index.exact(&scope("t1"), "training").is_empty());
        assert_eq!(index.indexed_files(), 2);
    }

    #[test]
    fn reindex_replaces_prior_postings() {
        let index = index_with_files();
        index.index_text("t1", "f1", "completely different content");
        assert!(index.exact(&scope("t1"), "neural").is_empty());
        assert!(index.exact(&scope("t1"), "different").contains("f1"));
    }

    #[test]
    fn stop_words_never_enter_the_index() {
        let index = index_with_files();
        assert!(index.exact(&scope("t1"), "the").is_empty());
    }
}
