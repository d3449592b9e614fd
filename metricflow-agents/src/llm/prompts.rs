//! System prompts for the chat-model gateway.

use metricflow_core::traits::ReasoningKind;

const OUTLINE_PROMPT: &str = r#"You design analytical reports over tabular records.
The user message is a JSON object with the analysis objective, sample records,
the available field names, the total record count and the minimum number of
sections.

Reply with a single JSON object and nothing else:
{
  "report_title": "string",
  "sections": [
    {
      "section_id": "string",
      "title": "string",
      "description": "string",
      "metrics_needed": ["metric id", "..."]
    }
  ],
  "global_metrics": [
    {
      "metric_id": "string",
      "metric_name": "string",
      "calculation_logic": "how to compute it from the fields",
      "required_fields": ["field name", "..."],
      "dependencies": ["metric id computed first", "..."]
    }
  ]
}

Every id in metrics_needed must appear in global_metrics. Metric ids must be
unique. Only reference fields that exist in the data."#;

const PLANNING_PROMPT: &str = r#"You supervise a report generation workflow.
The user message is a JSON object describing its status: the decision that was
taken, coverage against the threshold, and which metrics are pending, failed
or exhausted.

Explain the decision and, when metrics are to be computed, say which ones
matter most. Reply with a single JSON object and nothing else:
{
  "rationale": "one or two sentences",
  "priority_metrics": ["metric id", "..."]
}"#;

/// System prompt for a request kind.
pub(crate) fn system_prompt(kind: ReasoningKind) -> &'static str {
    match kind {
        ReasoningKind::OutlineGeneration => OUTLINE_PROMPT,
        ReasoningKind::PlanningDecision => PLANNING_PROMPT,
    }
}
