use crate::hls::playlist::VariantStream;

/// Strategy used to pick one stream out of a variant index.
pub trait VariantSelector: Send + Sync {
    fn select<'a>(&self, variants: &'a [VariantStream]) -> Option<&'a VariantStream>;
}

/// Picks the first listed variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstVariant;

impl VariantSelector for FirstVariant {
    fn select<'a>(&self, variants: &'a [VariantStream]) -> Option<&'a VariantStream> {
        variants.first()
    }
}

/// Picks the variant announcing the largest `BANDWIDTH`, keeping list order on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestBandwidth;

impl VariantSelector for HighestBandwidth {
    fn select<'a>(&self, variants: &'a [VariantStream]) -> Option<&'a VariantStream> {
        variants
            .iter()
            .rev()
            .max_by_key(|v| v.bandwidth.unwrap_or_default())
    }
}

/// Any `Fn(&[VariantStream]) -> Option<usize>` returning the chosen index.
impl<F> VariantSelector for F
where
    F: Fn(&[VariantStream]) -> Option<usize> + Send + Sync,
{
    fn select<'a>(&self, variants: &'a [VariantStream]) -> Option<&'a VariantStream> {
        self(variants).and_then(|index| variants.get(index))
    }
}
