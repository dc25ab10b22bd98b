use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use candle_core::Tensor;
use serde::Serialize;

use crate::{
    doc_id::DocumentId,
    embedding_db::EmbeddingDb,
    error::Result,
    index::DocumentIndex,
    model_manager::ModelManager,
    reranker::{self, Candidate, RankedDocument},
    tantivy_index::SearchResult,
    text_util,
};

/// Number of hits returned when no count is given.
pub const DEFAULT_COUNT: usize = 5;

/// Maximum number of BM25 hits retrieved by the keyword stage.
pub const DEFAULT_CANDIDATES: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Hits in the response.
    pub count: usize,
    /// Skip the ColBERT stage even if the index has embeddings.
    pub bm25_only: bool,
    /// BM25 hits retrieved by the keyword stage.
    pub candidates: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            bm25_only: false,
            candidates: DEFAULT_CANDIDATES,
        }
    }
}

/// Answers free-text queries against one index.
///
/// 1. BM25 + fuzzy retrieval via tantivy
/// 2. When the index has embeddings, ColBERT MaxSim over every embedded
///    document, followed by keyword hits that have no embeddings
/// 3. Snippet extraction for the top hits
#[derive(Debug)]
pub struct QueryEngine<'a> {
    index: &'a DocumentIndex,
    model: Option<ModelManager>,
    options: QueryOptions,
}

/// One ranked document in a [`Response`].
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub rank: usize,
    pub score: f32,
    pub doc_id: String,
    pub path: String,
    pub title: String,
    /// Modification time of the source file, in seconds since the Unix epoch.
    pub mtime: u64,
    pub snippet: Option<String>,
    /// 1-indexed line the snippet starts at.
    pub line: Option<usize>,
}

/// The answer to a query: the best matching documents and passages.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub query: String,
    pub reranked: bool,
    pub hits: Vec<Hit>,
}

impl<'a> QueryEngine<'a> {
    pub(crate) fn new(
        index: &'a DocumentIndex,
        model: Option<ModelManager>,
        options: QueryOptions,
    ) -> Self {
        Self {
            index,
            model,
            options,
        }
    }

    /// Whether queries go through the ColBERT stage.
    pub fn reranks(&self) -> bool {
        self.model.is_some()
    }

    /// Run `text` against the index. The text is used as given; an empty
    /// query yields an empty response.
    ///
    /// With embeddings every embedded document is scored by MaxSim, so
    /// documents sharing no words with the query can still be found.
    pub fn query(&mut self, text: &str) -> Result<Response> {
        let search_index = self.index.search_index();
        let bm25 = search_index.search(text, self.options.candidates)?;
        tracing::debug!(query = text, candidates = bm25.len(), "keyword stage");

        let mut reranked = false;
        let mut ordered = bm25.clone();

        if let (Some(model), Some(db)) =
            (self.model.as_mut(), self.index.embeddings())
            && !text.trim().is_empty()
        {
            let query_embedding = model.encode_query(text)?;
            let documents = search_index.all_documents()?;
            match rank_semantic(&query_embedding, documents, &bm25, db)? {
                Some(ranked) => {
                    ordered = ranked;
                    reranked = true;
                }
                None => {
                    tracing::warn!("no stored embeddings, using BM25 order");
                }
            }
        }

        let mut hits = Vec::with_capacity(self.options.count);
        for (i, result) in
            ordered.into_iter().take(self.options.count).enumerate()
        {
            let snippet = search_index
                .body(&result.doc_id)?
                .and_then(|body| text_util::extract_snippet(&body, text));
            hits.push(Hit {
                rank: i + 1,
                score: result.score,
                doc_id: DocumentId::from_numeric(result.doc_num_id).short,
                path: result.path,
                title: result.title,
                mtime: result.mtime,
                line: snippet.as_ref().map(|(_, line)| *line),
                snippet: snippet.map(|(text, _)| text),
            });
        }

        Ok(Response {
            query: text.to_string(),
            reranked,
            hits,
        })
    }
}

/// Score every embedded document in `documents` against the query.
///
/// Returns `None` when no document has stored embeddings.
fn rank_semantic(
    query_embedding: &Tensor,
    documents: Vec<SearchResult>,
    bm25: &[SearchResult],
    db: &EmbeddingDb,
) -> Result<Option<Vec<SearchResult>>> {
    let candidates: Vec<Candidate> = documents
        .iter()
        .filter(|d| d.chunks > 0)
        .map(|d| Candidate {
            doc_num_id: d.doc_num_id,
            chunks: d.chunks,
        })
        .collect();
    tracing::debug!(candidates = candidates.len(), "semantic stage");

    let ranked = reranker::rerank(query_embedding, &candidates, db)?;
    if ranked.is_empty() {
        return Ok(None);
    }
    Ok(Some(merge_ranked(documents, bm25, ranked)))
}

/// Documents in MaxSim order, followed by the BM25 hits that were not
/// scored (no stored embeddings) in their BM25 order.
fn merge_ranked(
    documents: Vec<SearchResult>,
    bm25: &[SearchResult],
    ranked: Vec<RankedDocument>,
) -> Vec<SearchResult> {
    let mut by_id: HashMap<u64, SearchResult> =
        documents.into_iter().map(|d| (d.doc_num_id, d)).collect();

    let mut merged = Vec::with_capacity(ranked.len() + bm25.len());
    for RankedDocument { doc_num_id, score } in ranked {
        if let Some(mut result) = by_id.remove(&doc_num_id) {
            result.score = score;
            merged.push(result);
        }
    }

    let scored: HashSet<u64> = merged.iter().map(|r| r.doc_num_id).collect();
    merged.extend(
        bm25.iter()
            .filter(|r| !scored.contains(&r.doc_num_id))
            .cloned(),
    );
    merged
}

impl Response {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits.is_empty() {
            return writeln!(f, "No results found.");
        }

        for hit in &self.hits {
            writeln!(
                f,
                "{:>3}. [{:.3}] {} #{}",
                hit.rank, hit.score, hit.path, hit.doc_id
            )?;
            if !hit.title.is_empty() {
                writeln!(f, "     {}", hit.title)?;
            }
            if let Some(snippet) = &hit.snippet {
                for line in snippet.lines() {
                    writeln!(f, "       | {line}")?;
                }
            }
        }
        write!(f, "\n{} result(s)", self.hits.len())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        documents::DocumentSet,
        embedding_db::EmbeddingMatrix,
        index::build_index,
        walker::Excludes,
    };

    fn write(root: &Path, rel: &str, content: &str) {
        std::fs::write(root.join(rel), content).unwrap();
    }

    /// A BM25-only index over a handful of topical documents.
    fn setup() -> (tempfile::TempDir, DocumentIndex) {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        write(
            &src,
            "rust-guide.md",
            "# The Rust Programming Language\n\n\
             Rust is a systems programming language focused on safety,\n\
             concurrency, and performance.\n",
        );
        write(
            &src,
            "python-intro.md",
            "# Introduction to Python\n\n\
             Python is a high-level interpreted programming language\n\
             known for its readability.\n",
        );
        write(
            &src,
            "cooking-pasta.md",
            "# How to Cook Pasta\n\nBoil water in a large pot. Add salt.\n",
        );
        write(
            &src,
            "gardening.txt",
            "Water your plants regularly.\nUse compost for healthy soil.\n",
        );

        let docs = DocumentSet::load(&src, &Excludes::default()).unwrap();
        let index = build_index(&docs, &tmp.path().join("idx"), None).unwrap();
        (tmp, index)
    }

    #[test]
    fn returns_relevant_results() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions::default());
        let response = engine.query("rust programming").unwrap();

        assert!(!response.is_empty());
        assert_eq!(response.hits[0].path, "rust-guide.md");
        assert_eq!(response.hits[0].title, "The Rust Programming Language");
        assert!(!response.reranked);
    }

    #[test]
    fn ranks_are_sequential_and_scores_descending() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions::default());
        let response = engine.query("programming language").unwrap();

        for (i, hit) in response.hits.iter().enumerate() {
            assert_eq!(hit.rank, i + 1);
        }
        for pair in response.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn respects_count() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions {
            count: 1,
            ..QueryOptions::default()
        });
        let response = engine.query("programming water").unwrap();
        assert_eq!(response.hits.len(), 1);
    }

    #[test]
    fn empty_query_is_passed_through() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions::default());
        let response = engine.query("").unwrap();

        assert_eq!(response.query, "");
        assert!(response.is_empty());
        assert_eq!(response.to_string(), "No results found.\n");
    }

    #[test]
    fn fuzzy_matching_finds_typos() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions::default());
        let response = engine.query("gardenning compst").unwrap();
        assert!(response.hits.iter().any(|h| h.path == "gardening.txt"));
    }

    #[test]
    fn hits_carry_snippets() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions::default());
        let response = engine.query("compost").unwrap();

        let hit = &response.hits[0];
        assert_eq!(hit.path, "gardening.txt");
        assert!(hit.snippet.as_deref().unwrap().contains("compost"));
        assert_eq!(hit.line, Some(1));
    }

    #[test]
    fn display_lists_hits() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions::default());
        let rendered = engine.query("pasta").unwrap().to_string();

        assert!(rendered.contains("  1. ["));
        assert!(rendered.contains("cooking-pasta.md"));
        assert!(rendered.contains("How to Cook Pasta"));
        assert!(rendered.ends_with("result(s)"));
    }

    #[test]
    fn response_serializes_to_json() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions::default());
        let response = engine.query("pasta").unwrap();

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["query"], "pasta");
        assert_eq!(json["hits"][0]["path"], "cooking-pasta.md");
        assert_eq!(json["hits"][0]["rank"], 1);
    }

    fn result(doc_num_id: u64, path: &str, chunks: u64, score: f32) -> SearchResult {
        SearchResult {
            score,
            doc_id: DocumentId::from_numeric(doc_num_id).hex(),
            doc_num_id,
            path: path.to_string(),
            title: String::new(),
            chunks,
            mtime: 0,
        }
    }

    fn embeddings(entries: &[(u64, &[f32])]) -> (tempfile::TempDir, EmbeddingDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = EmbeddingDb::open(&tmp.path().join("emb.redb")).unwrap();
        let entries: Vec<_> = entries
            .iter()
            .map(|(id, data)| {
                let m = EmbeddingMatrix::new(1, data.len() as u32, data.to_vec())
                    .unwrap();
                (*id, m)
            })
            .collect();
        db.batch_store(&entries).unwrap();
        (tmp, db)
    }

    fn query_tensor(data: &[f32]) -> Tensor {
        Tensor::from_vec(data.to_vec(), (1, data.len()), &candle_core::Device::Cpu)
            .unwrap()
    }

    #[test]
    fn semantic_stage_finds_documents_without_shared_words() {
        let (_tmp, db) = embeddings(&[(1, &[0.1, 0.9]), (2, &[0.95, 0.05])]);
        let documents = vec![result(1, "boats.md", 1, 0.0), result(2, "cars.md", 1, 0.0)];

        // No keyword hits at all.
        let ranked =
            rank_semantic(&query_tensor(&[1.0, 0.0]), documents, &[], &db)
                .unwrap()
                .unwrap();

        let paths: Vec<&str> = ranked.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["cars.md", "boats.md"]);
        assert!((ranked[0].score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn semantic_stage_reorders_keyword_hits() {
        let (_tmp, db) = embeddings(&[(1, &[0.0, 1.0]), (2, &[1.0, 0.0])]);
        let bm25 = vec![result(1, "first.md", 1, 9.0), result(2, "second.md", 1, 3.0)];

        let ranked =
            rank_semantic(&query_tensor(&[1.0, 0.0]), bm25.clone(), &bm25, &db)
                .unwrap()
                .unwrap();

        assert_eq!(ranked[0].path, "second.md");
        assert_eq!(ranked[1].path, "first.md");
    }

    #[test]
    fn semantic_stage_without_embeddings_is_none() {
        let (_tmp, db) = embeddings(&[]);
        let documents = vec![result(1, "a.md", 0, 0.0), result(2, "b.md", 1, 0.0)];

        let ranked =
            rank_semantic(&query_tensor(&[1.0, 0.0]), documents, &[], &db).unwrap();
        assert!(ranked.is_none());
    }

    #[test]
    fn unembedded_keyword_hits_follow_in_bm25_order() {
        let documents = vec![
            result(1, "embedded.md", 1, 0.0),
            result(2, "title-only.md", 0, 0.0),
            result(3, "also-plain.md", 0, 0.0),
        ];
        let bm25 = vec![
            result(3, "also-plain.md", 0, 4.0),
            result(1, "embedded.md", 1, 2.0),
            result(2, "title-only.md", 0, 1.0),
        ];
        let ranked = vec![RankedDocument {
            doc_num_id: 1,
            score: 0.7,
        }];

        let merged = merge_ranked(documents, &bm25, ranked);
        let order: Vec<(&str, f32)> =
            merged.iter().map(|r| (r.path.as_str(), r.score)).collect();
        assert_eq!(
            order,
            vec![("embedded.md", 0.7), ("also-plain.md", 4.0), ("title-only.md", 1.0)]
        );
    }

    #[test]
    fn unmatched_unembedded_documents_are_left_out() {
        let documents = vec![result(1, "a.md", 1, 0.0), result(2, "b.md", 0, 0.0)];
        let ranked = vec![RankedDocument {
            doc_num_id: 1,
            score: 0.5,
        }];

        let merged = merge_ranked(documents, &[], ranked);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].path, "a.md");
    }

    #[test]
    fn hits_use_short_ids() {
        let (_tmp, index) = setup();
        let mut engine = index.query_engine(QueryOptions::default());
        let response = engine.query("pasta").unwrap();
        let hit = &response.hits[0];
        assert_eq!(hit.doc_id, DocumentId::new("cooking-pasta.md").short);
        assert!(hit.mtime > 0);
    }
}
