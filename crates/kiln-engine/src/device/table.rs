use crate::error::BackendError;

use super::DeviceEpoch;

/// Dense, epoch-scoped storage for backend objects.
///
/// Indices are handed out in insertion order and never reused within an epoch,
/// so a removed object's handle can never alias a newer one. `reset` drops
/// every object and moves the table to a new epoch, after which lookups with
/// handles from the old epoch fail with `StaleHandle`.
#[derive(Debug)]
pub struct ResourceTable<T> {
    kind: &'static str,
    epoch: DeviceEpoch,
    items: Vec<Option<T>>,
    live: usize,
}

impl<T> ResourceTable<T> {
    pub fn new(kind: &'static str, epoch: DeviceEpoch) -> Self {
        Self {
            kind,
            epoch,
            items: Vec::new(),
            live: 0,
        }
    }

    #[inline]
    pub fn epoch(&self) -> DeviceEpoch {
        self.epoch
    }

    /// Live objects.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Stores `item` and returns its index.
    pub fn insert(&mut self, item: T) -> u32 {
        self.items.push(Some(item));
        self.live += 1;
        (self.items.len() - 1) as u32
    }

    pub fn get(&self, index: u32, epoch: DeviceEpoch) -> Result<&T, BackendError> {
        self.check_epoch(epoch)?;
        self.items
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::UnknownHandle {
                kind: self.kind,
                index,
            })
    }

    pub fn get_mut(&mut self, index: u32, epoch: DeviceEpoch) -> Result<&mut T, BackendError> {
        self.check_epoch(epoch)?;
        let kind = self.kind;
        self.items
            .get_mut(index as usize)
            .and_then(Option::as_mut)
            .ok_or(BackendError::UnknownHandle { kind, index })
    }

    /// Takes the object out. Its index stays retired until the next `reset`.
    pub fn remove(&mut self, index: u32, epoch: DeviceEpoch) -> Result<T, BackendError> {
        self.check_epoch(epoch)?;
        let kind = self.kind;
        let item = self
            .items
            .get_mut(index as usize)
            .and_then(Option::take)
            .ok_or(BackendError::UnknownHandle { kind, index })?;
        self.live -= 1;
        Ok(item)
    }

    /// Drops all objects and rebinds the table to `epoch`.
    pub fn reset(&mut self, epoch: DeviceEpoch) {
        self.items.clear();
        self.live = 0;
        self.epoch = epoch;
    }

    fn check_epoch(&self, epoch: DeviceEpoch) -> Result<(), BackendError> {
        if epoch != self.epoch {
            return Err(BackendError::StaleHandle {
                kind: self.kind,
                handle_epoch: epoch,
                device_epoch: self.epoch,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_insertion_order() {
        let mut t = ResourceTable::new("buffer", DeviceEpoch::INITIAL);
        assert_eq!(t.insert("a"), 0);
        assert_eq!(t.insert("b"), 1);
        assert_eq!(*t.get(1, DeviceEpoch::INITIAL).unwrap(), "b");
    }

    #[test]
    fn stale_epoch_is_rejected_after_reset() {
        let mut t = ResourceTable::new("buffer", DeviceEpoch::INITIAL);
        let idx = t.insert(7u32);
        t.reset(DeviceEpoch::INITIAL.next());
        assert!(t.is_empty());
        assert!(matches!(
            t.get(idx, DeviceEpoch::INITIAL),
            Err(BackendError::StaleHandle { kind: "buffer", .. })
        ));
    }

    #[test]
    fn removed_index_is_not_reused() {
        let mut t = ResourceTable::new("geometry", DeviceEpoch::INITIAL);
        let a = t.insert('a');
        assert_eq!(t.remove(a, DeviceEpoch::INITIAL), Ok('a'));
        assert!(t.is_empty());

        let b = t.insert('b');
        assert_ne!(a, b);
        assert_eq!(
            t.get(a, DeviceEpoch::INITIAL),
            Err(BackendError::UnknownHandle { kind: "geometry", index: a })
        );
        assert!(t.remove(a, DeviceEpoch::INITIAL).is_err());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn unknown_index_is_reported() {
        let t: ResourceTable<u8> = ResourceTable::new("pipeline", DeviceEpoch::INITIAL);
        assert_eq!(
            t.get(3, DeviceEpoch::INITIAL),
            Err(BackendError::UnknownHandle { kind: "pipeline", index: 3 })
        );
    }
}
