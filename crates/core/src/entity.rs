//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// A stock batch keeps its identity while its quantity, grade or type are edited.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
