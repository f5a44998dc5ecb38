//! Identifier allocation for slide ids, master/layout ids and relationship ids.
//!
//! Every scope keeps a watermark raised from the ids seen at load time.
//! Allocation is monotonic: an id handed out once is never handed out again
//! during the lifetime of the in-memory package, even after the slide or
//! relationship that used it is gone.

use crate::error::{Error, Result};
use crate::graph::PartRef;
use crate::types::RelId;
use std::collections::HashMap;

/// Smallest valid slide id.
pub const MIN_SLIDE_ID: u32 = 256;
/// Largest valid slide id.
pub const MAX_SLIDE_ID: u32 = 2_147_483_647;
/// Smallest valid master or layout id.
pub const MIN_LAYOUT_ID: u32 = 2_147_483_648;
/// Largest valid master or layout id.
pub const MAX_LAYOUT_ID: u32 = u32::MAX;

/// Counters run one past the top of their range once it is used up.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next_slide: u64,
    next_layout: u64,
    next_relationship: HashMap<PartRef, u32>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next_slide: MIN_SLIDE_ID as u64,
            next_layout: MIN_LAYOUT_ID as u64,
            next_relationship: HashMap::new(),
        }
    }

    /// Record a slide id present in the package.
    pub fn observe_slide_id(&mut self, id: u32) {
        self.next_slide = self.next_slide.max(id as u64 + 1);
    }

    /// A slide id greater than every id observed or allocated so far.
    pub fn next_slide_id(&mut self) -> Result<u32> {
        let id = take(&mut self.next_slide, MAX_SLIDE_ID, "slide")?;
        log::trace!("allocated slide id {}", id);
        Ok(id)
    }

    /// Record a master or layout id present in the package.
    pub fn observe_layout_id(&mut self, id: u32) {
        self.next_layout = self.next_layout.max(id as u64 + 1);
    }

    pub fn next_layout_id(&mut self) -> Result<u32> {
        let id = take(&mut self.next_layout, MAX_LAYOUT_ID, "layout")?;
        log::trace!("allocated layout id {}", id);
        Ok(id)
    }

    /// Record a relationship id present on `owner`.
    pub fn observe_relationship_id(&mut self, owner: PartRef, id: &RelId) {
        if let Some(n) = id.number() {
            let next = self.next_relationship.entry(owner).or_insert(1);
            if n >= *next {
                *next = n.saturating_add(1);
            }
        }
    }

    /// A relationship id for a new edge leaving `owner`.
    ///
    /// `taken` reports ids currently present on the part, which guards against
    /// hand-written ids that do not follow the `rIdN` pattern.
    pub fn next_relationship_id(&mut self, owner: PartRef, taken: impl Fn(&RelId) -> bool) -> RelId {
        let next = self.next_relationship.entry(owner).or_insert(1);
        loop {
            let id = RelId::from_number(*next);
            *next = next.saturating_add(1);
            if !taken(&id) {
                log::trace!("allocated relationship id {} for {:?}", id, owner);
                return id;
            }
        }
    }

    /// Forget the relationship counter of a removed part.
    pub fn release_part(&mut self, owner: PartRef) {
        self.next_relationship.remove(&owner);
    }
}

fn take(next: &mut u64, max: u32, scope: &'static str) -> Result<u32> {
    match u32::try_from(*next) {
        Ok(id) if id <= max => {
            *next += 1;
            Ok(id)
        }
        _ => Err(Error::IdsExhausted(scope)),
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
