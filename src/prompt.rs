use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One submission of the 3 R's form. Lives for a single request and is
/// dropped once the response is rendered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CopyBrief {
    pub rapport: String,
    pub reasons: String,
    pub results: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("All fields are required! Missing: {missing}")]
pub struct IncompleteBrief {
    pub missing: String,
}

impl CopyBrief {
    pub fn new(
        rapport: impl Into<String>,
        reasons: impl Into<String>,
        results: impl Into<String>,
    ) -> Self {
        Self {
            rapport: rapport.into(),
            reasons: reasons.into(),
            results: results.into(),
        }
    }

    /// A brief is complete when every field holds something other than
    /// whitespace. Incomplete briefs never reach a provider.
    pub fn validate(&self) -> Result<(), IncompleteBrief> {
        let mut missing = Vec::new();
        if self.rapport.trim().is_empty() {
            missing.push("rapport");
        }
        if self.reasons.trim().is_empty() {
            missing.push("reasons");
        }
        if self.results.trim().is_empty() {
            missing.push("results");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(IncompleteBrief {
                missing: missing.join(", "),
            })
        }
    }

    /// Renders the fixed prompt template. Field values are embedded verbatim;
    /// the template itself never varies between requests.
    pub fn render_prompt(&self) -> String {
        format!(
            "As an expert copywriter, I need your help in crafting a compelling copy \
             using The 3 R's (Rapport-Reasons-Results) formula.\n\
             Here's the breakdown:\n\
             - Rapport: {}\n\
             - Reasons: {}\n\
             - Results: {}\n",
            self.rapport, self.reasons, self.results
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_brief_passes_validation() {
        let brief = CopyBrief::new(
            "Hey there, fellow fitness enthusiast!",
            "Three science-backed reasons to switch",
            "More muscle, faster recovery",
        );
        assert!(brief.validate().is_ok());
    }

    #[test]
    fn empty_field_blocks_validation() {
        let brief = CopyBrief::new("rapport", "", "results");
        let err = brief.validate().unwrap_err();
        assert_eq!(err.missing, "reasons");
    }

    #[test]
    fn whitespace_only_counts_as_empty() {
        let brief = CopyBrief::new("  \t ", "reasons", "\n");
        let err = brief.validate().unwrap_err();
        assert_eq!(err.missing, "rapport, results");
        assert!(err.to_string().contains("All fields are required!"));
    }

    #[test]
    fn prompt_embeds_all_three_values_verbatim() {
        let brief = CopyBrief::new(
            "Yoga, Tech & <Adventure>",
            "Save time, money, or effort",
            "Achieve goals, improve quality of life",
        );
        let prompt = brief.render_prompt();
        assert!(prompt.contains("- Rapport: Yoga, Tech & <Adventure>"));
        assert!(prompt.contains("- Reasons: Save time, money, or effort"));
        assert!(prompt.contains("- Results: Achieve goals, improve quality of life"));
        assert!(prompt.starts_with("As an expert copywriter"));
    }

    #[test]
    fn prompt_template_is_stable_across_calls() {
        let brief = CopyBrief::new("a", "b", "c");
        assert_eq!(brief.render_prompt(), brief.render_prompt());
    }
}
