
//! Allocation of the fixed-size blocks that store non-uniform tiles.
//!
//! The file keeps one index per direction: each tile records the block it
//! lives in, and each block records the tile living in it. Both directions
//! are owned by [`BlockMap`] and only mutated through it, so they cannot
//! drift apart. The block region never needs more blocks than tiles.

use crate::error::{Error, ErrorKind, Result};

/// The mutual tile ↔ block indices of an open image.
///
/// Invariant: `tile_of_block(k) == Some(t)` exactly when
/// `block_of_tile(t) == Some(k)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMap {
    tile_to_block: Vec<Option<usize>>,
    block_to_tile: Vec<Option<usize>>,
}

impl BlockMap {
    /// A map with no blocks allocated.
    pub fn new(tile_count: usize) -> Self {
        BlockMap {
            tile_to_block: vec![None; tile_count],
            block_to_tile: vec![None; tile_count],
        }
    }

    /// Rebuild the map from the block numbers stored in the tile records,
    /// as found when opening a file.
    pub fn from_tile_blocks(tile_to_block: Vec<Option<usize>>) -> Result<Self> {
        let tile_count = tile_to_block.len();
        let mut block_to_tile = vec![None; tile_count];

        for (tile, block) in tile_to_block.iter().enumerate() {
            if let Some(block) = *block {
                if block >= tile_count {
                    return Err(Error::detailed(ErrorKind::InvalidBlockNumber, "tile record references a block beyond the block region"));
                }

                if block_to_tile[block].is_some() {
                    return Err(Error::detailed(ErrorKind::InvalidBlockNumber, "two tile records claim the same block"));
                }

                block_to_tile[block] = Some(tile);
            }
        }

        Ok(BlockMap { tile_to_block, block_to_tile })
    }

    /// Number of tiles (which is also the block capacity).
    pub fn tile_count(&self) -> usize {
        self.tile_to_block.len()
    }

    /// The block the tile lives in, if it has one.
    pub fn block_of_tile(&self, tile: usize) -> Option<usize> {
        self.tile_to_block[tile]
    }

    /// The tile living in the block, if any.
    pub fn tile_of_block(&self, block: usize) -> Option<usize> {
        self.block_to_tile[block]
    }

    /// Give the tile the lowest-numbered free block and return it.
    /// The tile must not already have a block.
    pub fn allocate(&mut self, tile: usize) -> Result<usize> {
        debug_assert!(self.tile_to_block[tile].is_none(), "tile already has a block");

        let block = self
            .block_to_tile
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| Error::detailed(ErrorKind::InvalidBlockNumber, "no free block available"))?;

        self.tile_to_block[tile] = Some(block);
        self.block_to_tile[block] = Some(tile);
        self.debug_validate();
        Ok(block)
    }

    /// Take the tile's block away, returning the freed block.
    pub fn release(&mut self, tile: usize) -> Option<usize> {
        let block = self.tile_to_block[tile].take();

        if let Some(block) = block {
            self.block_to_tile[block] = None;
        }

        self.debug_validate();
        block
    }

    /// Point the tile at the given block, in both directions, without
    /// freeing previous occupants. Used by defragmentation, which restores
    /// the bijection itself over a sequence of assignments.
    pub fn assign(&mut self, tile: usize, block: usize) {
        self.tile_to_block[tile] = Some(block);
        self.block_to_tile[block] = Some(tile);
    }

    /// Mark a block as holding no tile. Used by defragmentation.
    pub fn clear_block(&mut self, block: usize) {
        self.block_to_tile[block] = None;
    }

    /// The highest block index in use.
    pub fn last_used_block(&self) -> Option<usize> {
        self.block_to_tile.iter().rposition(Option::is_some)
    }

    /// Number of blocks in use.
    pub fn used_block_count(&self) -> usize {
        self.block_to_tile.iter().filter(|tile| tile.is_some()).count()
    }

    /// Whether the two directions agree everywhere.
    pub fn is_consistent(&self) -> bool {
        let forward = self.tile_to_block.iter().enumerate().all(|(tile, block)| {
            block.map_or(true, |block| self.block_to_tile.get(block).copied().flatten() == Some(tile))
        });

        let backward = self.block_to_tile.iter().enumerate().all(|(block, tile)| {
            tile.map_or(true, |tile| self.tile_to_block.get(tile).copied().flatten() == Some(block))
        });

        forward && backward
    }

    fn debug_validate(&self) {
        debug_assert!(self.is_consistent(), "tile and block indices disagree");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allocates_lowest_free_block() {
        let mut blocks = BlockMap::new(4);

        assert_eq!(blocks.allocate(2).unwrap(), 0);
        assert_eq!(blocks.allocate(0).unwrap(), 1);
        assert_eq!(blocks.tile_of_block(0), Some(2));
        assert_eq!(blocks.block_of_tile(0), Some(1));
        assert!(blocks.is_consistent());

        // freeing block zero makes it the next allocation again
        assert_eq!(blocks.release(2), Some(0));
        assert_eq!(blocks.allocate(3).unwrap(), 0);
        assert!(blocks.is_consistent());
    }

    #[test]
    fn never_exceeds_one_block_per_tile() {
        let mut blocks = BlockMap::new(2);
        blocks.allocate(0).unwrap();
        blocks.allocate(1).unwrap();
        assert_eq!(blocks.last_used_block(), Some(1));
        assert_eq!(blocks.used_block_count(), 2);
    }

    #[test]
    fn release_without_block_is_harmless() {
        let mut blocks = BlockMap::new(2);
        assert_eq!(blocks.release(1), None);
        assert_eq!(blocks.last_used_block(), None);
    }

    #[test]
    fn rebuild_from_tile_records() {
        let blocks = BlockMap::from_tile_blocks(vec![Some(1), None, Some(0)]).unwrap();
        assert_eq!(blocks.tile_of_block(0), Some(2));
        assert_eq!(blocks.tile_of_block(1), Some(0));
        assert!(blocks.is_consistent());

        assert!(BlockMap::from_tile_blocks(vec![Some(5), None]).is_err());
        assert!(BlockMap::from_tile_blocks(vec![Some(0), Some(0)]).is_err());
    }
}
