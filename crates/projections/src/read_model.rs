//! Read model trait for ledger-derived views.

/// A read model providing query access to data folded from the ledger.
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Returns the number of entries in this read model.
    fn count(&self) -> usize;
}
