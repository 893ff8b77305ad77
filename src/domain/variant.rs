//! Model variant selection by obstetric history.

use super::features::ParityHistory;

/// Which trained model handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    /// Trained on the primiparous cohort; never sees parity features.
    FirstTime,
    /// Trained on the full cohort, including obstetric history.
    History,
}

impl VariantKind {
    /// Select the variant for a patient. Total over all flag combinations.
    #[must_use]
    pub fn select(parity: &ParityHistory) -> Self {
        if parity.is_first_time() {
            Self::FirstTime
        } else {
            Self::History
        }
    }

    /// Name recorded at the start of the decision trace.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::FirstTime => "Model_B_95_Percent_Accurate",
            Self::History => "Model_A_History",
        }
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
