//! Item pipelines and the [`Processor`] that chains them.

use async_trait::async_trait;

use crate::error::ScavengeError;
use crate::item::Item;

/// A single item transform. Pipelines run in registration order, each
/// receiving the item produced by the previous one.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn handle_item(&self, item: Item) -> Result<Item, ScavengeError>;
}

/// An ordered list of [`Pipeline`]s.
#[derive(Default)]
pub struct Processor {
    pipelines: Vec<Box<dyn Pipeline>>,
}

impl Processor {
    pub fn new(pipelines: Vec<Box<dyn Pipeline>>) -> Self {
        Self { pipelines }
    }

    /// Runs the item through every pipeline. The first error aborts the
    /// chain.
    pub async fn process(&self, mut item: Item) -> Result<Item, ScavengeError> {
        for pipeline in &self.pipelines {
            item = pipeline
                .handle_item(item)
                .await
                .map_err(|err| ScavengeError::Pipeline(Box::new(err)))?;
        }
        Ok(item)
    }
}
