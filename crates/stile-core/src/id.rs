//! Node identities and the ID allocator.
//!
//! Every AST node carries a string identity of the form `<category>:<n>`.
//! Counters are per-category and monotonic; an ID is never reused within a
//! category. Overlay allocators provide scratch counters for request-time
//! template instantiation that can be flushed back or discarded.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// ID category a node identity is drawn from.
///
/// `CompileAst` and `CompilePseudo` are used during form compilation.
/// The runtime categories exist only for nodes instantiated per request
/// (collection and iterate templates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Nodes lowered from the definition tree.
    CompileAst,
    /// Virtual data-source nodes synthesized during wiring.
    CompilePseudo,
    /// Template instances created per request.
    RuntimeAst,
    /// Virtual data-source nodes created per request.
    RuntimePseudo,
}

impl Category {
    /// All categories, in counter order.
    pub const ALL: [Self; 4] = [
        Self::CompileAst,
        Self::CompilePseudo,
        Self::RuntimeAst,
        Self::RuntimePseudo,
    ];

    /// The string form used in rendered identities.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CompileAst => "compile-ast",
            Self::CompilePseudo => "compile-pseudo",
            Self::RuntimeAst => "runtime-ast",
            Self::RuntimePseudo => "runtime-pseudo",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::CompileAst => 0,
            Self::CompilePseudo => 1,
            Self::RuntimeAst => 2,
            Self::RuntimePseudo => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile-ast" => Ok(Self::CompileAst),
            "compile-pseudo" => Ok(Self::CompilePseudo),
            "runtime-ast" => Ok(Self::RuntimeAst),
            "runtime-pseudo" => Ok(Self::RuntimePseudo),
            other => Err(Error::internal(format!("unknown ID category: {other}"))),
        }
    }
}

/// Stable identity of an AST node, rendered as `<category>:<n>`.
///
/// Ordinals start at 1 and are total-ordered within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    category: Category,
    ordinal: u64,
}

impl NodeId {
    /// Build an identity from its parts.
    #[must_use]
    pub const fn new(category: Category, ordinal: u64) -> Self {
        Self { category, ordinal }
    }

    /// The category this identity was drawn from.
    #[must_use]
    pub const fn category(self) -> Category {
        self.category
    }

    /// The per-category ordinal (1-indexed).
    #[must_use]
    pub const fn ordinal(self) -> u64 {
        self.ordinal
    }

    /// Whether this identity belongs to a runtime category.
    #[must_use]
    pub const fn is_runtime(self) -> bool {
        matches!(self.category, Category::RuntimeAst | Category::RuntimePseudo)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.ordinal)
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, ordinal) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::internal(format!("malformed node ID: {s}")))?;
        let category = category.parse()?;
        let ordinal = ordinal
            .parse()
            .map_err(|_| Error::internal(format!("malformed node ID ordinal: {s}")))?;
        Ok(Self { category, ordinal })
    }
}

// Node IDs serialize as their rendered string so they stay readable in
// diagnostics and render-model JSON.
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Anything identities can be drawn from.
///
/// The node factory is generic over this seam so compile-time lowering draws
/// from the main [`IdAllocator`] while request-time template instantiation
/// draws from an [`OverlayAllocator`].
pub trait IdSource {
    /// Draw the next identity in `category`.
    fn next_id(&mut self, category: Category) -> NodeId;
}

/// Monotonic per-category ID allocator.
///
/// Cloning yields an independent copy (counters diverge from the point of
/// the clone). To branch counters that should be merged back, use
/// [`OverlayAllocator`] instead.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    counters: [u64; 4],
}

impl IdAllocator {
    /// Create a fresh allocator with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { counters: [0; 4] }
    }

    /// Draw the next identity in `category`.
    pub fn next(&mut self, category: Category) -> NodeId {
        let slot = &mut self.counters[category.index()];
        *slot += 1;
        NodeId::new(category, *slot)
    }

    /// Number of identities drawn in `category` since the last reset.
    #[must_use]
    pub const fn count(&self, category: Category) -> u64 {
        self.counters[category.index()]
    }

    /// Reset a single category counter to zero.
    pub const fn reset(&mut self, category: Category) {
        self.counters[category.index()] = 0;
    }

    /// Reset all category counters to zero.
    pub const fn reset_all(&mut self) {
        self.counters = [0; 4];
    }
}

impl IdSource for IdAllocator {
    fn next_id(&mut self, category: Category) -> NodeId {
        self.next(category)
    }
}

/// Scratch counters layered on a main allocator.
///
/// `next` draws from the overlay without touching the main allocator.
/// [`flush_into`](Self::flush_into) copies counters back; dropping the
/// overlay discards them. Overlays are deliberately not `Clone`: branch the
/// underlying main allocator instead.
#[derive(Debug)]
pub struct OverlayAllocator {
    counters: [u64; 4],
}

impl OverlayAllocator {
    /// Snapshot the main allocator's counters into a new overlay.
    #[must_use]
    pub const fn new(main: &IdAllocator) -> Self {
        Self {
            counters: main.counters,
        }
    }

    /// Draw the next identity in `category` from the overlay.
    pub fn next(&mut self, category: Category) -> NodeId {
        let slot = &mut self.counters[category.index()];
        *slot += 1;
        NodeId::new(category, *slot)
    }

    /// Number of identities visible in `category` (base + overlay draws).
    #[must_use]
    pub const fn count(&self, category: Category) -> u64 {
        self.counters[category.index()]
    }

    /// Copy the overlay counters back into the main allocator.
    ///
    /// Counters never decrement: a main counter that advanced past the
    /// overlay in the meantime keeps its higher value.
    pub fn flush_into(self, main: &mut IdAllocator) {
        for (main_slot, overlay) in main.counters.iter_mut().zip(self.counters) {
            *main_slot = (*main_slot).max(overlay);
        }
    }
}

impl IdSource for OverlayAllocator {
    fn next_id(&mut self, category: Category) -> NodeId {
        self.next(category)
    }
}
