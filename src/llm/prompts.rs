//! Prompt templates.

/// Collection of prompts used by the judges and the answer generator.
pub struct Prompts;

impl Prompts {
    /// Prompt asking a judge to score a generated answer against a reference.
    ///
    /// Placeholders: `{question}`, `{expected_answer}`, `{generated_answer}`.
    pub fn judge_generation() -> &'static str {
        r#"You are an expert evaluator assessing the quality of AI-generated answers in a document question-answering system.

## Task
Evaluate the GENERATED ANSWER against the REFERENCE ANSWER for the given QUESTION.

## Evaluation Criteria
Score each dimension from 1-5:

### Correctness (1-5)
- 5: Completely accurate, all facts match reference
- 4: Mostly accurate, minor omissions
- 3: Partially accurate, some incorrect details
- 2: Mostly incorrect, few accurate points
- 1: Completely incorrect or irrelevant

### Completeness (1-5)
- 5: Covers all key points from reference
- 4: Covers most key points
- 3: Covers some key points
- 2: Missing most key points
- 1: Missing all key points

### Relevance (1-5)
- 5: Directly addresses the question
- 4: Mostly relevant with minor tangents
- 3: Somewhat relevant
- 2: Mostly irrelevant
- 1: Completely off-topic

### Coherence (1-5)
- 5: Clear, well-structured, easy to follow
- 4: Generally clear with minor issues
- 3: Understandable but disorganized
- 2: Difficult to follow
- 1: Incoherent

## Input
QUESTION: {question}

REFERENCE ANSWER: {expected_answer}

GENERATED ANSWER: {generated_answer}

## Output Format
Respond with a JSON object ONLY (no additional text):
{
    "correctness": <1-5>,
    "completeness": <1-5>,
    "relevance": <1-5>,
    "coherence": <1-5>,
    "overall_score": <1-5>,
    "reasoning": "<brief explanation of scores>"
}"#
    }

    /// Fill the judge template.
    pub fn render_judge_generation(
        question: &str,
        expected_answer: &str,
        generated_answer: &str,
    ) -> String {
        fill_template(
            Self::judge_generation(),
            &[
                ("question", question),
                ("expected_answer", expected_answer),
                ("generated_answer", generated_answer),
            ],
        )
    }

    /// Instruction prepended to the page images sent to the vision model.
    pub fn answer_from_pages() -> &'static str {
        "Answer the question using only the document pages shown. If the pages do not contain the answer, say so."
    }
}

/// Substitute `{name}` placeholders in one left-to-right pass.
///
/// Inserted values are copied verbatim and never scanned again; braces that
/// do not name a known placeholder are kept as is.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let filled = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match filled {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge_prompt_rendering() {
        let prompt = Prompts::render_judge_generation("Q?", "Ref.", "Gen.");
        assert!(prompt.contains("QUESTION: Q?"));
        assert!(prompt.contains("REFERENCE ANSWER: Ref."));
        assert!(prompt.contains("GENERATED ANSWER: Gen."));
        assert!(!prompt.contains("{question}"));
        assert!(prompt.contains("\"overall_score\": <1-5>"));
    }

    #[test]
    fn test_placeholder_text_in_inputs_is_kept() {
        let prompt = Prompts::render_judge_generation(
            "What does the {generated_answer} field in the form mean?",
            "Use {expected_answer} or {question} here",
            "GEN-TEXT {question}",
        );
        assert!(prompt.contains("QUESTION: What does the {generated_answer} field in the form mean?"));
        assert!(prompt.contains("REFERENCE ANSWER: Use {expected_answer} or {question} here"));
        assert!(prompt.contains("GENERATED ANSWER: GEN-TEXT {question}"));
        assert_eq!(prompt.matches("GEN-TEXT").count(), 1);
    }

    #[test]
    fn test_fill_template_leaves_unknown_braces() {
        let filled = fill_template("{a} {\n  \"b\": 1\n} {c", &[("a", "x")]);
        assert_eq!(filled, "x {\n  \"b\": 1\n} {c");
    }

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::judge_generation().is_empty());
        assert!(!Prompts::answer_from_pages().is_empty());
    }
}
