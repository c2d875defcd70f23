/// Engine configuration.
///
/// The three workaround toggles reproduce the observable behavior of
/// another widely deployed implementation of the same inference rules.
/// They are off by default, which gives the strict formal behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferenceOptions {
    /// Mark argument-derived constraints (and the bounds they produce) soft.
    pub soft_argument_constraints: bool,
    /// Treat `S <: G<..>` as satisfied when the only `G` supertype of `S`
    /// is raw, and tolerate a raw fallback return type.
    pub tolerate_raw_supertypes: bool,
    /// Add wildcard bounds to the fresh variables of a captured return type
    /// as soon as the capture obligation is recorded.
    pub eager_wildcard_bounds: bool,
    /// Reduce functional arguments without input variables before the
    /// invocation-type constraint set is assembled.
    pub early_functional_constraints: bool,
    /// Incorporation passes allowed per call before the engine gives up
    /// on reaching a fixed point.
    pub pass_limit: usize,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            soft_argument_constraints: false,
            tolerate_raw_supertypes: false,
            eager_wildcard_bounds: false,
            early_functional_constraints: false,
            pass_limit: 10_000,
        }
    }
}

impl InferenceOptions {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn compatible() -> Self {
        Self {
            tolerate_raw_supertypes: true,
            eager_wildcard_bounds: true,
            early_functional_constraints: true,
            ..Self::default()
        }
    }

    pub fn with_pass_limit(mut self, pass_limit: usize) -> Self {
        self.pass_limit = pass_limit.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::InferenceOptions;

    #[test]
    fn test_presets() {
        let strict = InferenceOptions::strict();
        assert_eq!(strict, InferenceOptions::default());
        assert!(!strict.tolerate_raw_supertypes);

        let compat = InferenceOptions::compatible();
        assert!(compat.tolerate_raw_supertypes);
        assert!(compat.eager_wildcard_bounds);
        assert!(compat.early_functional_constraints);
        assert!(!compat.soft_argument_constraints);
        assert_eq!(compat.pass_limit, strict.pass_limit);

        assert_eq!(InferenceOptions::default().with_pass_limit(0).pass_limit, 1);
    }
}
