/// Options applied when building a linear context.
#[derive(Debug, Clone, Default)]
pub struct LinearConfig {
    /// Keep the unpacked weight and bias alongside the packed tensors so
    /// they can be exported again with `LinearContext::unpacked`.
    pub retain_originals: bool,
}

impl LinearConfig {
    pub fn retaining_originals() -> Self {
        LinearConfig {
            retain_originals: true,
        }
    }
}
