//! Fluent [`Composer`] construction. Grounded on the teacher's
//! `CacheSystemBuilder` (`with_*` chain ending in `build()`).

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::Codec;
use crate::codecs::JsonCodec;
use crate::composer::Composer;
use crate::options::Options;
use crate::tier::Tier;

/// Builds a [`Composer`] tier by tier. Tiers are probed in the order
/// they are added; add the fastest/coldest-data tier first.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tiered_cache::builder::ComposerBuilder;
/// use tiered_cache::local::MokaTier;
///
/// let composer = ComposerBuilder::new()
///     .with_tier(Arc::new(MokaTier::default()), Duration::from_secs(60))
///     .build();
/// assert_eq!(composer.layer_count(), 1);
/// ```
pub struct ComposerBuilder<C = JsonCodec> {
    tiers: Vec<(Arc<dyn Tier>, Duration)>,
    codec: C,
    options: Options,
    _codec: PhantomData<C>,
}

impl ComposerBuilder<JsonCodec> {
    pub fn new() -> Self {
        Self {
            tiers: Vec::new(),
            codec: JsonCodec,
            options: Options::default(),
            _codec: PhantomData,
        }
    }
}

impl Default for ComposerBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ComposerBuilder<C>
where
    C: Codec + Clone + 'static,
{
    /// Append a tier, probed after every tier already added.
    #[must_use]
    pub fn with_tier(mut self, tier: Arc<dyn Tier>, ttl: Duration) -> Self {
        self.tiers.push((tier, ttl));
        self
    }

    /// Replace the shared [`Options`] (defaults match spec.md §4.5).
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Swap the value codec used at the composer's call edge. Default
    /// is [`JsonCodec`]; per-tier codecs are configured independently
    /// when constructing each [`crate::stable::StableTier`] /
    /// [`crate::unstable::UnstableTier`].
    #[must_use]
    pub fn with_codec<C2>(self, codec: C2) -> ComposerBuilder<C2>
    where
        C2: Codec + Clone + 'static,
    {
        ComposerBuilder {
            tiers: self.tiers,
            codec,
            options: self.options,
            _codec: PhantomData,
        }
    }

    /// Build the composer. A zero-tier composer is accepted (per
    /// spec.md §4.4's construction rules); `Composer::get_or_load`
    /// then fails with `NoLayers` at call time, not here.
    pub fn build(self) -> Composer<C> {
        Composer::new(self.tiers, self.codec, self.options)
    }
}
