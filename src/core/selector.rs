use serde::{Deserialize, Serialize};

/// Ordered candidate query expressions for one logical UI target.
///
/// Order is priority: the first candidate that matches wins, with no other
/// weighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorStrategy {
    pub name: String,
    pub candidates: Vec<String>,
}

impl SelectorStrategy {
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    /// Single-candidate strategy.
    #[must_use]
    pub fn single(name: impl Into<String>, candidate: impl Into<String>) -> Self {
        Self::new(name, [candidate.into()])
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(String::as_str)
    }

    /// Appends `other`'s candidates after this strategy's own.
    #[must_use]
    pub fn chain(mut self, other: &SelectorStrategy) -> Self {
        self.candidates.extend(other.candidates.iter().cloned());
        self
    }
}

/// Strategy with a `{}` placeholder filled per use, e.g. a legend row for a
/// given indicator name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyTemplate {
    pub name: String,
    pub candidates: Vec<String>,
}

impl StrategyTemplate {
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    /// Renders every candidate with `arg` substituted for `{}`.
    ///
    /// Single quotes in `arg` are escaped so the result stays a valid quoted
    /// selector argument.
    #[must_use]
    pub fn render(&self, arg: &str) -> SelectorStrategy {
        let escaped = arg.replace('\'', "\\'");
        SelectorStrategy {
            name: format!("{}[{arg}]", self.name),
            candidates: self
                .candidates
                .iter()
                .map(|c| c.replace("{}", &escaped))
                .collect(),
        }
    }
}
