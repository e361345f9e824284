#![forbid(unsafe_code)]

//! Normalized description of what changed in one change cycle.
//!
//! # Design
//!
//! Containers historically announce mutations in one of three call shapes:
//! no arguments, a pair of item lists, or a pair of counts. All three are
//! folded into [`MutationDescriptor`] at the boundary (see the `From` impls),
//! so the notifier, observers, and the property bridge only ever deal with
//! one type.
//!
//! # Invariants
//!
//! 1. `Unspecified` always reports that the length may have changed.
//! 2. `Items` and `Counts` report a possible length change iff the removed
//!    and added cardinalities differ.
//! 3. Descriptors are passed to observers exactly as the caller built them;
//!    nothing here normalizes or diffs item lists.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What changed in a single begin/end cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MutationDescriptor<T> {
    /// No detail given. The length is assumed to have changed.
    Unspecified,
    /// Explicit removed and added members.
    Items { removed: Vec<T>, added: Vec<T> },
    /// Legacy count-pair form: cardinalities only, no identities.
    Counts {
        removed_count: usize,
        added_count: usize,
    },
}

/// Discriminant of a [`MutationDescriptor`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DescriptorShape {
    Unspecified,
    Items,
    Counts,
}

impl<T> MutationDescriptor<T> {
    #[must_use]
    pub const fn unspecified() -> Self {
        Self::Unspecified
    }

    #[must_use]
    pub fn items(removed: impl Into<Vec<T>>, added: impl Into<Vec<T>>) -> Self {
        Self::Items {
            removed: removed.into(),
            added: added.into(),
        }
    }

    #[must_use]
    pub const fn counts(removed_count: usize, added_count: usize) -> Self {
        Self::Counts {
            removed_count,
            added_count,
        }
    }

    #[must_use]
    pub const fn shape(&self) -> DescriptorShape {
        match self {
            Self::Unspecified => DescriptorShape::Unspecified,
            Self::Items { .. } => DescriptorShape::Items,
            Self::Counts { .. } => DescriptorShape::Counts,
        }
    }

    /// Number of removed members, if the descriptor carries one.
    #[must_use]
    pub fn removed_len(&self) -> Option<usize> {
        match self {
            Self::Unspecified => None,
            Self::Items { removed, .. } => Some(removed.len()),
            Self::Counts { removed_count, .. } => Some(*removed_count),
        }
    }

    /// Number of added members, if the descriptor carries one.
    #[must_use]
    pub fn added_len(&self) -> Option<usize> {
        match self {
            Self::Unspecified => None,
            Self::Items { added, .. } => Some(added.len()),
            Self::Counts { added_count, .. } => Some(*added_count),
        }
    }

    /// Net change in length (`added - removed`), or `None` when unknown.
    ///
    /// Saturates at `isize` bounds.
    #[must_use]
    pub fn length_delta(&self) -> Option<isize> {
        let removed = self.removed_len()?;
        let added = self.added_len()?;
        let removed = isize::try_from(removed).unwrap_or(isize::MAX);
        let added = isize::try_from(added).unwrap_or(isize::MAX);
        Some(added.saturating_sub(removed))
    }

    /// Whether a cycle ending with this descriptor could have changed the
    /// collection's length. This is the only input to `length` invalidation.
    #[must_use]
    pub fn length_may_have_changed(&self) -> bool {
        match self {
            Self::Unspecified => true,
            Self::Items { removed, added } => removed.len() != added.len(),
            Self::Counts {
                removed_count,
                added_count,
            } => removed_count != added_count,
        }
    }

    #[must_use]
    pub const fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }
}

// Manual Default: no `T: Default` bound.
impl<T> Default for MutationDescriptor<T> {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl<T> From<()> for MutationDescriptor<T> {
    fn from((): ()) -> Self {
        Self::Unspecified
    }
}

impl<T> From<(Vec<T>, Vec<T>)> for MutationDescriptor<T> {
    fn from((removed, added): (Vec<T>, Vec<T>)) -> Self {
        Self::Items { removed, added }
    }
}

impl<T> From<(usize, usize)> for MutationDescriptor<T> {
    fn from((removed_count, added_count): (usize, usize)) -> Self {
        Self::Counts {
            removed_count,
            added_count,
        }
    }
}

impl<T> From<Option<MutationDescriptor<T>>> for MutationDescriptor<T> {
    fn from(value: Option<MutationDescriptor<T>>) -> Self {
        value.unwrap_or_default()
    }
}
