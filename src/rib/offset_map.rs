use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, RibError};
use crate::rib::RouterId;

/// Immutable mapping of contributing router ids to dense slot offsets
///
/// Ids are kept sorted (unsigned order), so two maps built from the same
/// set are structurally identical and can be shared between route entries.
/// Values arrays paired with a map always have `size()` slots.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct OffsetMap {
    ids: Vec<RouterId>,
}

impl OffsetMap {
    pub fn empty() -> Self {
        Self { ids: Vec::new() }
    }

    pub fn from_ids(mut ids: Vec<RouterId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[RouterId] {
        &self.ids
    }

    pub fn offset_of(&self, id: RouterId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// Offset of an id already known to be present.
    /// For an absent id this is the offset it would be inserted at.
    pub fn offset_of_unchecked(&self, id: RouterId) -> usize {
        debug_assert!(self.offset_of(id).is_some(), "{} not in offset map", id);
        match self.ids.binary_search(&id) {
            Ok(offset) | Err(offset) => offset,
        }
    }

    /// Router id at an offset
    ///
    /// # Panics
    /// When `offset >= self.size()`
    pub fn router_id(&self, offset: usize) -> RouterId {
        self.ids[offset]
    }

    /// Map including `id`; an equal map when it is already present
    pub fn with(&self, id: RouterId) -> Self {
        match self.ids.binary_search(&id) {
            Ok(_) => self.clone(),
            Err(offset) => {
                let mut ids = Vec::with_capacity(self.ids.len() + 1);
                ids.extend_from_slice(&self.ids[..offset]);
                ids.push(id);
                ids.extend_from_slice(&self.ids[offset..]);
                Self { ids }
            }
        }
    }

    /// Map excluding `id`; an equal map when it is absent
    pub fn without(&self, id: RouterId) -> Self {
        match self.ids.binary_search(&id) {
            Ok(offset) => {
                let mut ids = self.ids.clone();
                ids.remove(offset);
                Self { ids }
            }
            Err(_) => self.clone(),
        }
    }

    /// Reshuffle `values` laid out for `old` into this (one id larger) map,
    /// leaving an empty slot at `new_offset`
    pub fn expand<T>(
        &self,
        old: &OffsetMap,
        mut values: Vec<Option<T>>,
        new_offset: usize,
    ) -> Result<Vec<Option<T>>> {
        if values.len() != old.size() {
            return Err(RibError::LengthMismatch {
                offsets: old.size(),
                values: values.len(),
            });
        }
        debug_assert_eq!(self.size(), old.size() + 1);
        // Ids sorting after the new one shift up by one slot
        values.insert(new_offset, None);
        Ok(values)
    }

    /// Drop the slot at `offset` from `values` laid out for this map, giving
    /// the layout for `self.without(self.router_id(offset))`
    pub fn remove_value<T>(&self, mut values: Vec<Option<T>>, offset: usize) -> Result<Vec<Option<T>>> {
        if values.len() != self.size() || offset >= values.len() {
            return Err(RibError::LengthMismatch {
                offsets: self.size(),
                values: values.len(),
            });
        }
        values.remove(offset);
        Ok(values)
    }

    pub fn value<'a, T>(&self, values: &'a [Option<T>], id: RouterId) -> Option<&'a T> {
        self.offset_of(id)
            .and_then(|offset| values.get(offset))
            .and_then(Option::as_ref)
    }

    /// Store a value for an id already present in this map.
    /// Returns the previous value of the slot.
    pub fn set_value<T>(&self, values: &mut [Option<T>], id: RouterId, value: Option<T>) -> Option<T> {
        let offset = self.offset_of(id)?;
        let slot = values.get_mut(offset)?;
        std::mem::replace(slot, value)
    }
}

impl fmt::Display for OffsetMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ids = self
            .ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "[{}]", ids)
    }
}

/// Interning cache of offset maps for one route table
///
/// Equal id sets resolve to the same `Arc`, so thousands of entries learned
/// from the same peers share a single map.
#[derive(Debug)]
pub struct OffsetMaps {
    empty: Arc<OffsetMap>,
    maps: HashMap<Vec<RouterId>, Arc<OffsetMap>>,
}

impl OffsetMaps {
    pub fn new() -> Self {
        Self {
            empty: Arc::new(OffsetMap::empty()),
            maps: HashMap::new(),
        }
    }

    pub fn empty(&self) -> Arc<OffsetMap> {
        self.empty.clone()
    }

    /// Shared instance equal to `map`
    pub fn get(&mut self, map: OffsetMap) -> Arc<OffsetMap> {
        if map.is_empty() {
            return self.empty();
        }
        if let Some(shared) = self.maps.get(&map.ids) {
            return shared.clone();
        }
        let shared = Arc::new(map);
        self.maps.insert(shared.ids.clone(), shared.clone());
        shared
    }

    /// Forget maps no route entry refers to anymore
    pub fn prune(&mut self) -> usize {
        let before = self.maps.len();
        self.maps.retain(|_, map| Arc::strong_count(map) > 1);
        before - self.maps.len()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl Default for OffsetMaps {
    fn default() -> Self {
        Self::new()
    }
}
