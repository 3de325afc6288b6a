use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use cid::Cid;

use crate::block::Block;

/// Block storage used by the want manager.
#[async_trait]
pub trait Blockstore: Clone + Send + Sync + 'static {
    /// Returns a block from the blockstore.
    async fn get(&self, cid: &Cid) -> Result<Option<Block>>;
    /// Inserts a block in the blockstore, returns `false` if it was already present.
    async fn put(&self, block: Block) -> Result<bool>;
}

/// A [`Blockstore`] keeping everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemBlockStore {
    blocks: Arc<Mutex<HashMap<Cid, Block>>>,
}

impl MemBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Blockstore for MemBlockStore {
    async fn get(&self, cid: &Cid) -> Result<Option<Block>> {
        Ok(self.blocks.lock().unwrap().get(cid).cloned())
    }

    async fn put(&self, block: Block) -> Result<bool> {
        let mut blocks = self.blocks.lock().unwrap();
        if blocks.contains_key(block.cid()) {
            return Ok(false);
        }
        blocks.insert(block.cid, block);
        Ok(true)
    }
}
