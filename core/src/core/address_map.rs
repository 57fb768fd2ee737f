//! Ordered, length-bounded address dispatch.
//!
//! A board describes each CPU's memory map as a list of [`Binding`]s
//! (inclusive `start..=end` range, a handler tag, and an optional backing
//! offset). [`AddressMap::new`] sorts and validates the list once at
//! machine start; lookups are a binary search, so there is no terminator
//! row and no scan past the end of the table.

use crate::core::error::ConfigError;

/// One address range and the handler that services it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding<H> {
    pub start: u32,
    pub end: u32,
    pub handler: H,
    /// Offset of `start` within the handler's backing storage, if any.
    pub backing: Option<usize>,
}

impl<H> Binding<H> {
    pub const fn new(start: u32, end: u32, handler: H) -> Self {
        Self {
            start,
            end,
            handler,
            backing: None,
        }
    }

    pub const fn backed(start: u32, end: u32, handler: H, backing: usize) -> Self {
        Self {
            start,
            end,
            handler,
            backing: Some(backing),
        }
    }

    fn contains(&self, addr: u32) -> bool {
        (self.start..=self.end).contains(&addr)
    }
}

/// A named, opt-in replacement of the handler for a sub-range of an
/// existing binding (used for per-board fast paths such as idle-loop
/// detection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution<H> {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub handler: H,
}

/// A resolved access: the binding that matched and the offset of the
/// address within it (plus the binding's backing offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<'a, H> {
    pub handler: &'a H,
    pub offset: u32,
    pub backing: Option<usize>,
}

impl<H> Resolved<'_, H> {
    /// Index into the backing storage for this access.
    pub fn backing_index(&self) -> Option<usize> {
        self.backing.map(|base| base + self.offset as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMap<H> {
    bindings: Vec<Binding<H>>,
}

impl<H> AddressMap<H> {
    /// Build a map from unordered bindings. Fails on inverted or
    /// overlapping ranges.
    pub fn new(mut bindings: Vec<Binding<H>>) -> Result<Self, ConfigError> {
        bindings.sort_by_key(|b| b.start);
        for b in &bindings {
            if b.start > b.end {
                return Err(ConfigError::AddressMap {
                    start: b.start,
                    end: b.end,
                    reason: "has start after end",
                });
            }
        }
        for pair in bindings.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(ConfigError::AddressMap {
                    start: pair[1].start,
                    end: pair[1].end,
                    reason: "overlaps the previous binding",
                });
            }
        }
        Ok(Self { bindings })
    }

    pub fn bindings(&self) -> &[Binding<H>] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Find the binding covering `addr`.
    pub fn lookup(&self, addr: u32) -> Option<Resolved<'_, H>> {
        let idx = self.bindings.partition_point(|b| b.end < addr);
        let binding = self.bindings.get(idx)?;
        if !binding.contains(addr) {
            return None;
        }
        Some(Resolved {
            handler: &binding.handler,
            offset: addr - binding.start,
            backing: binding.backing,
        })
    }
}

impl<H: Clone> AddressMap<H> {
    /// Install `rule` over part of one existing binding, splitting it.
    ///
    /// The substituted range must lie entirely inside a single binding; the
    /// backing offsets of the surrounding pieces are preserved so the
    /// replacement handler still sees the original storage.
    pub fn substitute(&mut self, rule: &Substitution<H>) -> Result<(), ConfigError> {
        let Some(idx) = self
            .bindings
            .iter()
            .position(|b| b.contains(rule.start) && b.contains(rule.end))
        else {
            return Err(ConfigError::AddressMap {
                start: rule.start,
                end: rule.end,
                reason: "is not covered by a single binding",
            });
        };
        if rule.start > rule.end {
            return Err(ConfigError::AddressMap {
                start: rule.start,
                end: rule.end,
                reason: "has start after end",
            });
        }

        let original = self.bindings.remove(idx);
        let shifted = |addr: u32| original.backing.map(|b| b + (addr - original.start) as usize);

        let mut pieces = Vec::with_capacity(3);
        if rule.start > original.start {
            pieces.push(Binding {
                start: original.start,
                end: rule.start - 1,
                handler: original.handler.clone(),
                backing: original.backing,
            });
        }
        pieces.push(Binding {
            start: rule.start,
            end: rule.end,
            handler: rule.handler.clone(),
            backing: shifted(rule.start),
        });
        if rule.end < original.end {
            pieces.push(Binding {
                start: rule.end + 1,
                end: original.end,
                handler: original.handler.clone(),
                backing: shifted(rule.end + 1),
            });
        }
        for (i, piece) in pieces.into_iter().enumerate() {
            self.bindings.insert(idx + i, piece);
        }
        log::debug!(
            "address map: installed `{}` at {:#06x}-{:#06x}",
            rule.name,
            rule.start,
            rule.end
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum H {
        Ram,
        Rom,
        Io,
        Fast,
    }

    fn sample() -> AddressMap<H> {
        AddressMap::new(vec![
            Binding::backed(0x8000, 0xFFFF, H::Rom, 0),
            Binding::backed(0x0000, 0x0FFF, H::Ram, 0),
            Binding::new(0x1800, 0x180F, H::Io),
        ])
        .unwrap()
    }

    #[test]
    fn bindings_are_sorted() {
        let map = sample();
        let starts: Vec<_> = map.bindings().iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![0x0000, 0x1800, 0x8000]);
    }

    #[test]
    fn lookup_hits_and_misses() {
        let map = sample();
        let hit = map.lookup(0x0123).unwrap();
        assert_eq!(*hit.handler, H::Ram);
        assert_eq!(hit.offset, 0x123);
        assert_eq!(hit.backing_index(), Some(0x123));

        assert_eq!(*map.lookup(0x180F).unwrap().handler, H::Io);
        assert!(map.lookup(0x1810).is_none());
        assert!(map.lookup(0x4000).is_none());
        assert_eq!(map.lookup(0xFFFF).unwrap().offset, 0x7FFF);
    }

    #[test]
    fn overlapping_bindings_rejected() {
        let err = AddressMap::new(vec![
            Binding::new(0x0000, 0x0FFF, H::Ram),
            Binding::new(0x0F00, 0x1FFF, H::Io),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::AddressMap { start: 0x0F00, .. }));
    }

    #[test]
    fn inverted_binding_rejected() {
        assert!(AddressMap::new(vec![Binding::new(0x10, 0x0F, H::Ram)]).is_err());
    }

    #[test]
    fn substitution_splits_binding_and_keeps_backing() {
        let mut map = sample();
        map.substitute(&Substitution {
            name: "idle-loop".into(),
            start: 0x0400,
            end: 0x0401,
            handler: H::Fast,
        })
        .unwrap();

        assert_eq!(map.len(), 5);
        assert_eq!(*map.lookup(0x03FF).unwrap().handler, H::Ram);
        let fast = map.lookup(0x0401).unwrap();
        assert_eq!(*fast.handler, H::Fast);
        assert_eq!(fast.backing_index(), Some(0x0401));
        let tail = map.lookup(0x0402).unwrap();
        assert_eq!(*tail.handler, H::Ram);
        assert_eq!(tail.backing_index(), Some(0x0402));
    }

    #[test]
    fn substitution_outside_single_binding_rejected() {
        let mut map = sample();
        let err = map.substitute(&Substitution {
            name: "bad".into(),
            start: 0x0FFF,
            end: 0x1800,
            handler: H::Fast,
        });
        assert!(err.is_err());
        assert_eq!(map.len(), 3);
    }
}
