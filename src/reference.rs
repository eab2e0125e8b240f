use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// A reference to a BDD node, potentially negated.
///
/// The least significant bit is the complement flag, the remaining bits store the node id.
/// Debug builds also carry the generation of the node's slot, so that a handle
/// outliving a garbage collection is caught instead of aliasing a reused slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(not(debug_assertions), repr(transparent))]
pub struct Ref {
    raw: u32,
    #[cfg(debug_assertions)]
    generation: u32,
}

impl Ref {
    /// Creates a new reference with the given node id and negation flag.
    pub const fn new(id: u32, negated: bool) -> Self {
        Self {
            raw: (id << 1) | (negated as u32),
            #[cfg(debug_assertions)]
            generation: 0,
        }
    }

    /// The same reference, stamped with the generation of its slot.
    #[cfg(debug_assertions)]
    pub const fn with_generation(self, generation: u32) -> Self {
        Self {
            raw: self.raw,
            generation,
        }
    }

    #[cfg(debug_assertions)]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Creates a positive (non-negated) reference.
    pub const fn positive(id: u32) -> Self {
        Self::new(id, false)
    }

    /// Creates a negative (negated) reference.
    pub const fn negative(id: u32) -> Self {
        Self::new(id, true)
    }

    /// Returns the node id this reference points to.
    #[inline]
    pub const fn id(self) -> u32 {
        self.raw >> 1
    }

    /// Returns the node id as a table index.
    #[inline]
    pub const fn index(self) -> usize {
        (self.raw >> 1) as usize
    }

    /// Returns true if this reference is negated.
    #[inline]
    pub const fn is_negated(self) -> bool {
        (self.raw & 1) != 0
    }

    /// Returns the reference with the complement flag cleared.
    #[inline]
    pub const fn regular(self) -> Self {
        Self {
            raw: self.raw & !1,
            ..self
        }
    }

    /// Returns the raw underlying value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.raw
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            raw: self.raw ^ 1,
            ..self
        }
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.id())
    }
}
