use std::sync::Arc;
use once_cell::sync::OnceCell;




/**
 * A non-empty block: a payload and the composite index it was stored under.
 */
#[derive(Debug)]
pub struct Block<G> {
    pub index: usize,
    pub grid: Arc<G>,
}

impl<G> Clone for Block<G> {
    fn clone(&self) -> Self {
        Self { index: self.index, grid: Arc::clone(&self.grid) }
    }
}




/**
 * Sparse storage for the non-empty blocks of an AMR hierarchy. Only blocks
 * holding a payload are stored, in insertion order. Lookups by composite
 * index go through an index from composite index to storage slot, which is
 * rebuilt on the first lookup after an insertion rather than on every
 * insertion, so bulk construction stays linear.
 *
 * Payloads are shared: cloning a store, or a block, clones `Arc` handles and
 * never the grid data.
 */
#[derive(Debug)]
pub struct BlockStore<G> {
    blocks: Vec<Block<G>>,
    index: OnceCell<Vec<Option<usize>>>,
}




// ============================================================================
impl<G> BlockStore<G> {

    pub fn new() -> Self {
        Self { blocks: Vec::new(), index: OnceCell::new() }
    }

    /// Remove every block.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.index = OnceCell::new();
    }

    /**
     * Store a payload under the given composite index. If that index already
     * holds a payload and the lookup index is current, the payload is
     * replaced in place. Otherwise the block is appended and the lookup
     * index invalidated; a later insertion under the same composite index
     * shadows an earlier one.
     */
    pub fn insert(&mut self, index: usize, grid: Arc<G>) {
        if let Some(slot) = self.index.get().and_then(|map| map.get(index).copied().flatten()) {
            self.blocks[slot].grid = grid;
            return;
        }
        self.blocks.push(Block { index, grid });
        self.index = OnceCell::new();
    }

    /**
     * Return the payload stored under a composite index, or `None` if that
     * block is empty.
     */
    pub fn get(&self, index: usize) -> Option<&Arc<G>> {
        self.lookup()
            .get(index)
            .copied()
            .flatten()
            .map(|slot| &self.blocks[slot].grid)
    }

    /**
     * Return the payload handle stored under a composite index for
     * replacement or copy-on-write modification.
     */
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Arc<G>> {
        let slot = self.lookup().get(index).copied().flatten()?;
        Some(&mut self.blocks[slot].grid)
    }

    /// Return the number of non-empty blocks.
    pub fn len(&self) -> usize {
        self.lookup().iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /**
     * Iterate over the non-empty blocks in insertion order, skipping any
     * that were shadowed by a later insertion.
     */
    pub fn iter(&self) -> impl Iterator<Item = &Block<G>> + '_ {
        let map = self.lookup();
        self.blocks
            .iter()
            .enumerate()
            .filter(move |(slot, block)| map[block.index] == Some(*slot))
            .map(|(_, block)| block)
    }

    fn lookup(&self) -> &Vec<Option<usize>> {
        self.index.get_or_init(|| {
            let size = self.blocks.iter().map(|b| b.index + 1).max().unwrap_or(0);
            let mut map = vec![None; size];
            for (slot, block) in self.blocks.iter().enumerate() {
                map[block.index] = Some(slot);
            }
            map
        })
    }
}




// ============================================================================
impl<G> Default for BlockStore<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> Clone for BlockStore<G> {
    fn clone(&self) -> Self {
        Self { blocks: self.blocks.clone(), index: OnceCell::new() }
    }
}
