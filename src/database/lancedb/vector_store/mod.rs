
use super::{ChunkMetadata, ChunkRecord};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the LanceDB table holding the chunks
pub const TABLE_NAME: &str = "chunks";

/// Vector index over document chunks
pub struct VectorStore {
    connection: Connection,
    path: PathBuf,
    vector_dimension: usize,
}

/// A chunk returned by similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: ChunkMetadata,
    /// L2 distance to the query vector, smaller is closer
    pub distance: f32,
}

impl VectorStore {
    /// Open an existing index for querying.
    ///
    /// Fails with [`RagError::IndexNotBuilt`] when the directory or the chunk table is missing.
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(RagError::IndexNotBuilt(path.to_path_buf()));
        }

        let connection = connect(path).await?;
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        if !table_names.iter().any(|name| name == TABLE_NAME) {
            return Err(RagError::IndexNotBuilt(path.to_path_buf()));
        }

        let table = open_table(&connection).await?;
        let vector_dimension = detect_vector_dimension(&table).await?;
        debug!(
            "Opened vector index at {} ({} dimensions)",
            path.display(),
            vector_dimension
        );

        Ok(Self {
            connection,
            path: path.to_path_buf(),
            vector_dimension,
        })
    }

    /// Create an empty index at `path`, replacing any chunk table already there
    #[inline]
    pub async fn create(path: &Path, vector_dimension: usize) -> Result<Self> {
        if vector_dimension == 0 {
            return Err(RagError::Database(
                "Vector dimension must be greater than 0".to_string(),
            ));
        }

        std::fs::create_dir_all(path).map_err(|e| {
            RagError::Database(format!(
                "Failed to create vector index directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let connection = connect(path).await?;
        let store = Self {
            connection,
            path: path.to_path_buf(),
            vector_dimension,
        };

        store.drop_table_if_exists().await?;
        store
            .connection
            .create_empty_table(TABLE_NAME, chunk_schema(vector_dimension))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Created empty vector index at {} with {} dimensions",
            path.display(),
            vector_dimension
        );
        Ok(store)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Append chunk rows to the index
    #[inline]
    pub async fn store_chunks_batch(&mut self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No chunks to store");
            return Ok(());
        }

        if let Some(bad) = records
            .iter()
            .find(|record| record.vector.len() != self.vector_dimension)
        {
            return Err(RagError::Database(format!(
                "Embedding for chunk {} has {} dimensions, index expects {}",
                bad.metadata.chunk_index,
                bad.vector.len(),
                self.vector_dimension
            )));
        }

        let record_batch = self.create_record_batch(records)?;
        let table = open_table(&self.connection).await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert chunks: {}", e)))?;

        debug!("Stored {} chunks", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[ChunkRecord]) -> Result<RecordBatch> {
        let dim = self.vector_dimension;
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * dim);
        let mut sources = Vec::with_capacity(len);
        let mut pages = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            sources.push(record.metadata.source.as_str());
            pages.push(record.metadata.page);
            chunk_indices.push(record.metadata.chunk_index);
            contents.push(record.metadata.content.as_str());
            created_ats.push(record.metadata.created_at.as_str());
        }

        let item_field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            item_field,
            dimension_as_i32(dim)?,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(pages)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(chunk_schema(dim), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Exact nearest-neighbour search.
    ///
    /// Results are ordered by ascending L2 distance, ties broken by chunk index,
    /// so the same query against the same index always returns the same list.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.vector_dimension {
            return Err(RagError::Database(format!(
                "Query vector has {} dimensions, index expects {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        let table = open_table(&self.connection).await?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        if rows == 0 {
            warn!("Vector index at {} is empty", self.path.display());
            return Ok(Vec::new());
        }

        // Fetch past `limit` until the cut falls between two different distances, so
        // chunks tied at the boundary are chosen by chunk index rather than scan order
        let total = usize::try_from(rows).unwrap_or(usize::MAX);
        let mut fetch = limit.saturating_add(1).min(total);
        let mut results = loop {
            let candidates = nearest(&table, query_vector, fetch).await?;
            if fetch >= total || boundary_is_settled(&candidates, limit) {
                break candidates;
            }
            fetch = fetch.saturating_mul(2).min(total);
        };
        results.truncate(limit);

        debug!("Search returned {} chunks", results.len());
        Ok(results)
    }

    /// Number of chunks in the index
    #[inline]
    pub async fn count_chunks(&self) -> Result<u64> {
        let table = open_table(&self.connection).await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Compact the table after a bulk load
    #[inline]
    pub async fn optimize(&mut self) -> Result<()> {
        debug!("Optimizing vector index");

        let table = open_table(&self.connection).await?;
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::Database(format!("Failed to optimize table: {}", e)))?;

        info!("Vector index optimization completed");
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        let table_names =
            self.connection.table_names().execute().await.map_err(|e| {
                RagError::Database(format!("Failed to list tables for drop: {}", e))
            })?;

        if table_names.iter().any(|name| name == TABLE_NAME) {
            info!("Dropping existing chunk table");
            self.connection
                .drop_table(TABLE_NAME)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}

async fn connect(path: &Path) -> Result<Connection> {
    let uri = path.to_string_lossy();
    lancedb::connect(&uri).execute().await.map_err(|e| {
        RagError::Database(format!(
            "Failed to connect to LanceDB at {}: {}",
            path.display(),
            e
        ))
    })
}

async fn open_table(connection: &Connection) -> Result<Table> {
    connection
        .open_table(TABLE_NAME)
        .execute()
        .await
        .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

    match schema.field_with_name("vector").map(Field::data_type) {
        Ok(DataType::FixedSizeList(_, size)) => usize::try_from(*size)
            .map_err(|_| RagError::Database(format!("Invalid vector dimension: {}", size))),
        _ => Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        )),
    }
}

fn dimension_as_i32(dim: usize) -> Result<i32> {
    i32::try_from(dim).map_err(|_| RagError::Database(format!("Vector dimension too large: {}", dim)))
}

/// The `fetch` closest rows by exact L2 distance, sorted by `(distance, chunk_index)`
async fn nearest(table: &Table, query_vector: &[f32], fetch: usize) -> Result<Vec<SearchResult>> {
    let mut stream = table
        .vector_search(query_vector)
        .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
        .column("vector")
        .distance_type(DistanceType::L2)
        .bypass_vector_index()
        .limit(fetch)
        .execute()
        .await
        .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

    let mut results = Vec::new();
    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
    {
        results.extend(parse_search_batch(&batch)?);
    }

    sort_results(&mut results);
    Ok(results)
}

fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}

/// True when the row after the first `limit` is strictly farther than the last one kept
fn boundary_is_settled(sorted: &[SearchResult], limit: usize) -> bool {
    match (limit.checked_sub(1).and_then(|i| sorted.get(i)), sorted.get(limit)) {
        (Some(last_kept), Some(next)) => next.distance > last_kept.distance,
        _ => true,
    }
}

fn chunk_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                i32::try_from(vector_dim).unwrap_or(i32::MAX),
            ),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let sources = column::<StringArray>(batch, "source")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
    let contents = column::<StringArray>(batch, "content")?;
    let created_ats = column::<StringArray>(batch, "created_at")?;
    let distances = column::<Float32Array>(batch, "_distance")?;

    Ok((0..batch.num_rows())
        .map(|row| SearchResult {
            chunk: ChunkMetadata {
                source: sources.value(row).to_string(),
                page: pages.value(row),
                chunk_index: chunk_indices.value(row),
                content: contents.value(row).to_string(),
                created_at: created_ats.value(row).to_string(),
            },
            distance: if distances.is_null(row) {
                f32::INFINITY
            } else {
                distances.value(row)
            },
        })
        .collect())
}
