use std::{collections::HashSet, path::Path};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::TopDocs,
    doc,
    query::{
        AllQuery,
        BooleanQuery,
        FuzzyTermQuery,
        Occur,
        Query,
        QueryParser,
        TermQuery,
    },
    schema::*,
    tokenizer::{
        Language,
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::{doc_id::DocumentId, error::Result};

/// Field names used in the schema.
pub mod fields {
    pub const DOC_ID: &str = "doc_id";
    pub const DOC_NUM_ID: &str = "doc_num_id";
    pub const PATH: &str = "path";
    pub const TITLE: &str = "title";
    pub const BODY: &str = "body";
    pub const CHUNKS: &str = "chunks";
    pub const MTIME: &str = "mtime";
}

const TOKENIZER: &str = "en_stem";

/// Weight of title matches relative to body matches.
const TITLE_BOOST: f32 = 2.0;

/// Query terms shorter than this are not fuzzy-matched.
const MIN_FUZZY_TERM_LEN: usize = 3;

/// Full-text index over the documents of one build.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub doc_id: Field,
    pub doc_num_id: Field,
    pub path: Field,
    pub title: Field,
    pub body: Field,
    pub chunks: Field,
    pub mtime: Field,
}

impl SchemaFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            doc_id: schema.get_field(fields::DOC_ID)?,
            doc_num_id: schema.get_field(fields::DOC_NUM_ID)?,
            path: schema.get_field(fields::PATH)?,
            title: schema.get_field(fields::TITLE)?,
            body: schema.get_field(fields::BODY)?,
            chunks: schema.get_field(fields::CHUNKS)?,
            mtime: schema.get_field(fields::MTIME)?,
        })
    }
}

/// One document as written to the index.
#[derive(Debug, Clone, Copy)]
pub struct IndexedDocument<'a> {
    pub id: &'a DocumentId,
    pub path: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    /// Number of embedded chunks (0 when the build had no embeddings).
    pub chunks: u64,
    pub mtime: u64,
}

/// A search hit from the index.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub score: f32,
    pub doc_id: String,
    pub doc_num_id: u64,
    pub path: String,
    pub title: String,
    pub chunks: u64,
    pub mtime: u64,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(fields::DOC_ID, STRING | STORED);
    builder.add_u64_field(fields::DOC_NUM_ID, STORED | FAST);
    builder.add_text_field(fields::PATH, STRING | STORED);

    let stemmed = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    builder.add_text_field(
        fields::TITLE,
        TextOptions::default()
            .set_indexing_options(stemmed.clone())
            .set_stored(),
    );
    builder.add_text_field(
        fields::BODY,
        TextOptions::default()
            .set_indexing_options(stemmed)
            .set_stored(),
    );

    builder.add_u64_field(fields::CHUNKS, STORED);
    builder.add_u64_field(fields::MTIME, STORED | FAST);

    builder.build()
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::English))
        .build();
    index.tokenizers().register(TOKENIZER, en_stem);
}

impl SearchIndex {
    /// Create a new, empty index in `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let index = Index::create_in_dir(dir, build_schema())?;
        Self::from_index(index)
    }

    /// Open the index previously created in `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let index = Index::open_in_dir(dir)?;
        Self::from_index(index)
    }

    /// Create an in-memory search index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema()))
    }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizers(&index);
        let fields = SchemaFields::resolve(&index.schema())?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// Add a document via the given writer, replacing any with the same ID.
    pub fn add_document(
        &self,
        writer: &IndexWriter,
        document: &IndexedDocument<'_>,
    ) -> Result<()> {
        let f = self.fields;
        let doc_id = document.id.hex();

        writer.delete_term(Term::from_field_text(f.doc_id, &doc_id));
        writer.add_document(doc!(
            f.doc_id => doc_id,
            f.doc_num_id => document.id.numeric,
            f.path => document.path,
            f.title => document.title,
            f.body => document.body,
            f.chunks => document.chunks,
            f.mtime => document.mtime,
        ))?;

        Ok(())
    }

    /// Number of searchable documents.
    pub fn num_docs(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// BM25 search over title (boosted) and body, ORed with Levenshtein-1
    /// fuzzy matches of each query term against the body.
    ///
    /// Query syntax errors are tolerated; an empty query matches nothing.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let f = self.fields;
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let mut parser =
            QueryParser::for_index(&self.index, vec![f.title, f.body]);
        parser.set_field_boost(f.title, TITLE_BOOST);
        let (bm25_query, errors) = parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            tracing::debug!(?errors, "query parsed leniently");
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> =
            vec![(Occur::Should, bm25_query)];
        for term_str in query_str.split_whitespace() {
            if term_str.chars().count() >= MIN_FUZZY_TERM_LEN {
                let term =
                    Term::from_field_text(f.body, &term_str.to_lowercase());
                clauses.push((
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new(term, 1, true)),
                ));
            }
        }
        let query = BooleanQuery::new(clauses);

        let top_docs =
            searcher.search(&query, &TopDocs::with_limit(limit.max(1)))?;

        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let result = self.to_result(&doc, score);
            if seen.insert(result.doc_id.clone()) {
                results.push(result);
            }
        }

        Ok(results)
    }

    /// Every indexed document, with a score of zero.
    pub fn all_documents(&self) -> Result<Vec<SearchResult>> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let limit = (searcher.num_docs() as usize).max(1);

        let top_docs = searcher.search(&AllQuery, &TopDocs::with_limit(limit))?;
        top_docs
            .into_iter()
            .map(|(_, address)| {
                let doc: TantivyDocument = searcher.doc(address)?;
                Ok(self.to_result(&doc, 0.0))
            })
            .collect()
    }

    fn to_result(&self, doc: &TantivyDocument, score: f32) -> SearchResult {
        let f = self.fields;
        SearchResult {
            score,
            doc_id: extract_text(doc, f.doc_id),
            doc_num_id: extract_u64(doc, f.doc_num_id),
            path: extract_text(doc, f.path),
            title: extract_text(doc, f.title),
            chunks: extract_u64(doc, f.chunks),
            mtime: extract_u64(doc, f.mtime),
        }
    }

    /// Stored body text of a document, looked up by its hex ID.
    pub fn body(&self, doc_id: &str) -> Result<Option<String>> {
        let f = self.fields;
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(f.doc_id, doc_id),
            IndexRecordOption::Basic,
        );

        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        let Some((_, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(Some(extract_text(&doc, f.body)))
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
