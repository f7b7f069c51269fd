/// Which preview assets to download for a refreshed model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImagePolicy {
    None,
    #[default]
    FirstOnly,
    All,
}

impl ImagePolicy {
    /// Number of catalog images to consider, out of `available`.
    pub fn limit(self, available: usize) -> usize {
        match self {
            ImagePolicy::None => 0,
            ImagePolicy::FirstOnly => available.min(1),
            ImagePolicy::All => available,
        }
    }
}

/// Flags that steer the per-file state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub image_policy: ImagePolicy,
    /// Skip files already archived with the same content.
    pub only_new: bool,
    /// Refresh archived files only; never archive new ones.
    pub only_update: bool,
    /// Re-render pages from stored records without touching the network.
    pub only_html: bool,
    /// With `only_new`, also skip files the catalog did not know last time.
    pub skip_missing: bool,
    /// Disable pacing delays.
    pub no_timeout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_limits() {
        assert_eq!(ImagePolicy::None.limit(5), 0);
        assert_eq!(ImagePolicy::FirstOnly.limit(5), 1);
        assert_eq!(ImagePolicy::FirstOnly.limit(0), 0);
        assert_eq!(ImagePolicy::All.limit(5), 5);
    }
}
