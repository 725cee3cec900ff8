use std::collections::HashMap;
use std::sync::Arc;

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use parking_lot::RwLock;
use sage_store::{DocumentId, DocumentRecord, Namespace};

use crate::error::IndexError;

/// ANN graph parameters, fixed process-wide.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Embedding dimension; must match the embedding client's output size.
    pub dimension: usize,
    pub max_items: usize,
    pub n_neighbor: usize,
    pub n_neighbor0: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            max_items: 16384,
            n_neighbor: 16,
            n_neighbor0: 32,
        }
    }
}

/// Counters returned by [`IndexRegistry::rebuild_all`].
#[derive(Debug, Default, Clone)]
pub struct RebuildStats {
    pub namespaces: usize,
    pub vectors: usize,
    pub skipped: usize,
}

/// One namespace's index/id-map pair.
///
/// Invariant: the ordinal at which a vector sits in `hnsw` equals the
/// position of the corresponding document id in `ids`. The ordinal is the
/// index's only way back to a document id, so the two are only ever mutated
/// together under the enclosing write lock.
struct NamespaceIndex {
    hnsw: HNSWIndex<f32, usize>,
    ids: Vec<DocumentId>,
}

impl NamespaceIndex {
    fn new(config: &IndexConfig) -> Result<Self, IndexError> {
        let params = HNSWParams::<f32>::default()
            .max_item(config.max_items)
            .n_neighbor(config.n_neighbor)
            .n_neighbor0(config.n_neighbor0);
        let mut hnsw = HNSWIndex::new(config.dimension, &params);
        // Sets the metric before any insertion; construction is incremental
        // from here on.
        hnsw.build(Metric::Euclidean).map_err(IndexError::Ann)?;
        Ok(Self {
            hnsw,
            ids: Vec::new(),
        })
    }

    fn push(&mut self, id: DocumentId, vector: &[f32]) -> Result<(), IndexError> {
        let ordinal = self.ids.len();
        self.hnsw.add(vector, ordinal).map_err(IndexError::Ann)?;
        self.hnsw.build(Metric::Euclidean).map_err(IndexError::Ann)?;
        self.ids.push(id);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<DocumentId> {
        let mut hits: Vec<(f32, usize)> = self
            .hnsw
            .search_nodes(query, k)
            .into_iter()
            .filter_map(|(node, distance)| (*node.idx()).map(|ordinal| (distance, ordinal)))
            .collect();
        // Ascending distance; equal distances resolve to the earlier-inserted
        // document.
        hits.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        hits.truncate(k);
        hits.into_iter()
            .filter_map(|(_, ordinal)| self.ids.get(ordinal).copied())
            .collect()
    }
}

/// Owns one ANN index per namespace, lazily created and rebuildable from a
/// full store scan. Namespaces are fully independent: the outer map lock is
/// held only for entry lookup or insertion, never across an index operation.
pub struct IndexRegistry {
    config: IndexConfig,
    namespaces: RwLock<HashMap<Namespace, Arc<RwLock<NamespaceIndex>>>>,
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("config", &self.config)
            .field("namespaces", &self.namespaces.read().len())
            .finish()
    }
}

impl IndexRegistry {
    #[must_use]
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Ensure an index exists for the namespace, creating an empty one if
    /// needed. Safe under concurrent first access: exactly one index instance
    /// is created per namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying ANN structure cannot be built.
    pub fn get_or_create(&self, namespace: &Namespace) -> Result<(), IndexError> {
        self.entry(namespace).map(|_| ())
    }

    fn entry(&self, namespace: &Namespace) -> Result<Arc<RwLock<NamespaceIndex>>, IndexError> {
        if let Some(existing) = self.namespaces.read().get(namespace) {
            return Ok(existing.clone());
        }
        let mut map = self.namespaces.write();
        if let Some(existing) = map.get(namespace) {
            return Ok(existing.clone());
        }
        let index = Arc::new(RwLock::new(NamespaceIndex::new(&self.config)?));
        map.insert(namespace.clone(), index.clone());
        Ok(index)
    }

    #[must_use]
    pub fn contains(&self, namespace: &Namespace) -> bool {
        self.namespaces.read().contains_key(namespace)
    }

    /// Number of vectors indexed for a namespace; `None` if no index exists.
    #[must_use]
    pub fn vector_count(&self, namespace: &Namespace) -> Option<usize> {
        let entry = self.namespaces.read().get(namespace).cloned()?;
        let guard = entry.read();
        Some(guard.ids.len())
    }

    #[must_use]
    pub fn namespace_count(&self) -> usize {
        self.namespaces.read().len()
    }

    /// Append a vector and its document id to the namespace's pair, creating
    /// the index if absent. Holds the namespace write lock across both
    /// appends so the positional invariant is never observable half-applied.
    ///
    /// # Errors
    ///
    /// Returns an error on dimension mismatch or ANN insertion failure; the
    /// id map is untouched in either case.
    pub fn append(
        &self,
        namespace: &Namespace,
        id: DocumentId,
        vector: &[f32],
    ) -> Result<(), IndexError> {
        if vector.len() != self.config.dimension {
            return Err(IndexError::Dimension {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        let entry = self.entry(namespace)?;
        let mut guard = entry.write();
        guard.push(id, vector)
    }

    /// Search a namespace's index, returning at most `k` document ids by
    /// ascending distance.
    ///
    /// An existing-but-empty index yields an empty list, distinct from
    /// [`IndexError::NamespaceNotFound`].
    ///
    /// # Errors
    ///
    /// Returns an error for `k == 0`, a query of the wrong dimension, or an
    /// unknown namespace.
    pub fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentId>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidLimit);
        }
        if query.len() != self.config.dimension {
            return Err(IndexError::Dimension {
                expected: self.config.dimension,
                actual: query.len(),
            });
        }
        let entry = self
            .namespaces
            .read()
            .get(namespace)
            .cloned()
            .ok_or(IndexError::NamespaceNotFound)?;
        let guard = entry.read();
        Ok(guard.search(query, k))
    }

    /// Replace one namespace's pair with a fresh empty one. Used when a
    /// caller purges a namespace's corpus before re-ingesting.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement ANN structure cannot be built.
    pub fn reset(&self, namespace: &Namespace) -> Result<(), IndexError> {
        let index = Arc::new(RwLock::new(NamespaceIndex::new(&self.config)?));
        self.namespaces.write().insert(namespace.clone(), index);
        Ok(())
    }

    /// Rebuild every namespace's index/id-map pair from a full store scan,
    /// then atomically replace the registry contents. Records must arrive in
    /// store id order so the rebuilt ordinals match a subsequent rebuild.
    ///
    /// Idempotent: rebuilding replaces in-memory state, never merges with
    /// stale state. Records whose stored embedding does not match the
    /// configured dimension are skipped (counted in the stats) rather than
    /// corrupting the ordinal correspondence.
    ///
    /// # Errors
    ///
    /// Returns an error if an ANN structure cannot be built or an insertion
    /// fails.
    pub fn rebuild_all(&self, records: &[DocumentRecord]) -> Result<RebuildStats, IndexError> {
        let mut fresh: HashMap<Namespace, NamespaceIndex> = HashMap::new();
        let mut stats = RebuildStats::default();

        for record in records {
            if record.embedding.len() != self.config.dimension {
                tracing::warn!(
                    document = %record.id,
                    namespace = %record.namespace,
                    expected = self.config.dimension,
                    actual = record.embedding.len(),
                    "skipping record with mismatched embedding dimension"
                );
                stats.skipped += 1;
                continue;
            }
            if !fresh.contains_key(&record.namespace) {
                fresh.insert(record.namespace.clone(), NamespaceIndex::new(&self.config)?);
            }
            if let Some(index) = fresh.get_mut(&record.namespace) {
                index.push(record.id, &record.embedding)?;
                stats.vectors += 1;
            }
        }

        stats.namespaces = fresh.len();

        let replacement: HashMap<_, _> = fresh
            .into_iter()
            .map(|(ns, index)| (ns, Arc::new(RwLock::new(index))))
            .collect();
        *self.namespaces.write() = replacement;

        Ok(stats)
    }
}
