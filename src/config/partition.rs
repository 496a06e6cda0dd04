//! Partition layout specification.

/// Named reference to a partition resolver registered with the embedding
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolverRef(String);

impl ResolverRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// How a region's key space is split across members.
///
/// Constructed empty per region-creation request and consumed into the
/// immutable [`RegionDefinition`](crate::config::RegionDefinition) at region
/// creation.
///
/// The derived [`has_explicit_attributes`](Self::has_explicit_attributes)
/// flag records whether the request actually said anything about
/// partitioning: it becomes true the first time any setter supplies a
/// non-default value and never resets. Clearing the resolver to none is the
/// one silent no-op — it neither stores a value nor raises the flag. The
/// administrative layer reads the flag to decide whether to transmit
/// partition attributes at all when constructing the region.
///
/// # Example
///
/// ```
/// use gridkit::config::PartitionSpec;
///
/// let mut spec = PartitionSpec::new();
/// assert!(!spec.has_explicit_attributes());
///
/// spec.set_resolver(None);
/// assert!(!spec.has_explicit_attributes());
///
/// spec.set_total_buckets(113);
/// assert!(spec.has_explicit_attributes());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSpec {
    total_buckets: Option<u32>,
    redundant_copies: Option<u32>,
    resolver: Option<ResolverRef>,
    colocated_with: Option<String>,
    explicit: bool,
}

impl PartitionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once any setter other than clearing the resolver has supplied a
    /// non-default value. Monotonic.
    pub fn has_explicit_attributes(&self) -> bool {
        self.explicit
    }

    pub fn total_buckets(&self) -> Option<u32> {
        self.total_buckets
    }

    pub fn redundant_copies(&self) -> Option<u32> {
        self.redundant_copies
    }

    pub fn resolver(&self) -> Option<&ResolverRef> {
        self.resolver.as_ref()
    }

    pub fn colocated_with(&self) -> Option<&str> {
        self.colocated_with.as_deref()
    }

    pub fn set_total_buckets(&mut self, buckets: u32) {
        self.total_buckets = Some(buckets);
        self.explicit = true;
    }

    pub fn set_redundant_copies(&mut self, copies: u32) {
        self.redundant_copies = Some(copies);
        self.explicit = true;
    }

    /// Sets or clears the partition resolver reference.
    ///
    /// Clearing (`None`) never marks the spec explicit.
    pub fn set_resolver(&mut self, resolver: Option<ResolverRef>) {
        if resolver.is_some() {
            self.explicit = true;
        }
        self.resolver = resolver;
    }

    pub fn set_colocated_with(&mut self, region: impl Into<String>) {
        self.colocated_with = Some(region.into());
        self.explicit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_spec_has_no_explicit_attributes() {
        let spec = PartitionSpec::new();
        assert!(!spec.has_explicit_attributes());
        assert_eq!(spec.total_buckets(), None);
        assert_eq!(spec.redundant_copies(), None);
        assert!(spec.resolver().is_none());
        assert_eq!(spec.colocated_with(), None);
    }

    #[test]
    fn clearing_resolver_stays_implicit() {
        let mut spec = PartitionSpec::new();
        spec.set_resolver(None);
        assert!(!spec.has_explicit_attributes());
    }

    #[test]
    fn setting_total_buckets_marks_explicit() {
        let mut spec = PartitionSpec::new();
        spec.set_total_buckets(10);
        assert_eq!(spec.total_buckets(), Some(10));
        assert!(spec.has_explicit_attributes());
    }

    #[test]
    fn explicit_flag_is_monotonic() {
        let mut spec = PartitionSpec::new();
        spec.set_resolver(Some(ResolverRef::new("by-customer")));
        assert!(spec.has_explicit_attributes());

        // Resetting the resolver clears the value, not the flag.
        spec.set_resolver(None);
        assert!(spec.resolver().is_none());
        assert!(spec.has_explicit_attributes());
    }

    #[test]
    fn every_other_setter_marks_explicit() {
        let mut spec = PartitionSpec::new();
        spec.set_redundant_copies(2);
        assert!(spec.has_explicit_attributes());

        let mut spec = PartitionSpec::new();
        spec.set_colocated_with("orders");
        assert_eq!(spec.colocated_with(), Some("orders"));
        assert!(spec.has_explicit_attributes());
    }
}
