use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::error::{Error, Result};

const EMBEDDINGS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("embeddings");

/// Header size: 4 bytes token count + 4 bytes dimension.
const HEADER_SIZE: usize = 8;

/// Per-chunk ColBERT embedding matrices keyed by chunk ID.
///
/// Binary format per entry:
/// - 4 bytes: token count T (u32 LE)
/// - 4 bytes: embedding dimension D (u32 LE)
/// - T * D * 4 bytes: f32 LE values in row-major order
pub struct EmbeddingDb {
    db: Database,
}

impl EmbeddingDb {
    /// Open or create an embeddings database at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use doc_search::EmbeddingDb;
    ///
    /// let db = EmbeddingDb::open(&tmp.path().join("embeddings.redb")).unwrap();
    /// assert_eq!(db.len().unwrap(), 0);
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(EMBEDDINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Open an existing database without creating it.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let db = Database::open(path)?;
        Ok(Self { db })
    }

    /// Store several matrices in one transaction.
    ///
    /// Uses `insert_reserve` to write straight into the page.
    pub fn batch_store(&self, entries: &[(u64, EmbeddingMatrix)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            for (id, matrix) in entries {
                matrix.check_shape()?;

                let byte_len =
                    HEADER_SIZE + std::mem::size_of_val(matrix.data.as_slice());
                let mut guard = table.insert_reserve(*id, byte_len)?;
                let dest = guard.as_mut();

                dest[0..4].copy_from_slice(&matrix.num_tokens.to_le_bytes());
                dest[4..8].copy_from_slice(&matrix.dimension.to_le_bytes());
                dest[HEADER_SIZE..]
                    .copy_from_slice(bytemuck::cast_slice(&matrix.data));
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Load several matrices in one read transaction, preserving input order.
    ///
    /// Missing or malformed entries come back as `None`.
    pub fn batch_load(
        &self,
        ids: &[u64],
    ) -> Result<Vec<(u64, Option<EmbeddingMatrix>)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let matrix = table.get(id)?.and_then(|guard| decode(guard.value()));
            results.push((id, matrix));
        }
        Ok(results)
    }

    /// Number of stored matrices.
    pub fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for EmbeddingDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingDb").finish_non_exhaustive()
    }
}

fn decode(bytes: &[u8]) -> Option<EmbeddingMatrix> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }

    let num_tokens = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
    let dimension = u32::from_le_bytes(bytes[4..8].try_into().ok()?);

    let expected_len =
        HEADER_SIZE + (num_tokens as usize) * (dimension as usize) * 4;
    if bytes.len() != expected_len {
        return None;
    }

    // The value slice is not guaranteed to be 4-byte aligned.
    let data = bytes[HEADER_SIZE..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Some(EmbeddingMatrix {
        num_tokens,
        dimension,
        data,
    })
}

/// A ColBERT embedding matrix: one row per token.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    pub num_tokens: u32,
    pub dimension: u32,
    /// Row-major values: `data[token_idx * dimension + dim_idx]`.
    pub data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(num_tokens: u32, dimension: u32, data: Vec<f32>) -> Result<Self> {
        let matrix = Self {
            num_tokens,
            dimension,
            data,
        };
        matrix.check_shape()?;
        Ok(matrix)
    }

    fn check_shape(&self) -> Result<()> {
        let expected = (self.num_tokens as usize) * (self.dimension as usize);
        if self.data.len() != expected {
            return Err(Error::Config(format!(
                "embedding has {} values, expected {} tokens x {} dims",
                self.data.len(),
                self.num_tokens,
                self.dimension
            )));
        }
        Ok(())
    }
}
