//! Prompt text for every model call.
//!
//! Each stage sends a fixed system prompt followed by one user message
//! assembled from the request.

use concierge_core::{QueryCategory, RequestContext, RetrievedDocument};

/// Substituted for an empty retrieval result.
pub const NOT_FOUND_TEXT: &str = "No matching information was found in the knowledge base.";

/// Substituted for an empty reference list when grading.
pub const NO_REFERENCE_DOCUMENTS: &str = "No reference documents available";

pub const TRIAGE_SYSTEM_PROMPT: &str = r#"
You are a triage agent for a medical insurance customer support system.

Classify the customer's query into exactly one category:
1. policy_question - coverage, benefits, deductibles, copays, claims procedures
2. provider_lookup - finding doctors, specialists, hospitals or in-network providers
3. schedule_agent - complex issues that need a human, or an explicit request to talk to someone

Extract any relevant context the query mentions (policy numbers, locations,
specialties, network names) and decide whether a human must take over.

Respond with JSON only:
{
  "query_type": "policy_question" | "provider_lookup" | "schedule_agent",
  "confidence_score": 0.0-1.0,
  "extracted_context": {},
  "escalation_needed": false,
  "reasoning": "brief explanation of the classification"
}
"#;

pub const POLICY_SYSTEM_PROMPT: &str = r#"
You are a medical insurance policy specialist.

Answer questions about coverage, benefits, deductibles, copays, claims
procedures and policy details. Base every statement on the policy
information provided. If the information is not there, say so and
recommend speaking with a live agent instead of guessing.
"#;

pub const PROVIDER_SYSTEM_PROMPT: &str = r#"
You are a medical provider lookup specialist.

Help customers find in-network doctors, specialists, hospitals and other
providers. Use only the provider records supplied. For each recommendation
include name, specialty, location, contact details, network status and
whether new patients are accepted. Ask a clarifying question when the
records do not match the request.
"#;

pub const SCHEDULING_SYSTEM_PROMPT: &str = r#"
You are a live agent scheduler for medical insurance customer support.

Handle queries that need human expertise. Acknowledge the issue, explain
why a live agent is the right next step, offer the available callback
slots, ask for the preferred contact method and summarize the issue for
the agent who will call back.
"#;

pub const RENDER_SYSTEM_PROMPT: &str = r#"
You rewrite specialist answers into the customer-facing voice of the
support team: warm, clear, concise and professional.

Keep every fact from the specialist answer. Do not add facts, prices,
names or numbers that are not in it. Never include identifiers such as
social security numbers, card numbers or credentials.
"#;

/// Conservative prompt for the safe-default render tier.
pub const SAFE_DEFAULT_SYSTEM_PROMPT: &str = r#"
Restate the specialist answer below for a customer in plain, neutral
language. Keep it short. Do not add anything that is not in the answer.
Remove any personal identifiers or credentials.
"#;

pub const JUDGE_ACCURACY_SYSTEM_PROMPT: &str = r#"
You are an impartial evaluator grading factual accuracy.

Evaluation steps:
1. Read the reference documents; they are the source of truth.
2. List every factual claim in the response.
3. Check each claim against the documents.
4. Penalize claims that contradict the documents or are not supported by them.
5. Score from 0.0 (mostly wrong) to 1.0 (fully supported).

Respond with JSON only:
{"score": 0.0-1.0, "reasoning": "short explanation", "issues": ["unsupported claim", ...]}
"#;

pub const JUDGE_COHERENCE_SYSTEM_PROMPT: &str = r#"
You are an impartial evaluator grading coherence.

Evaluation steps:
1. Check that the response is logically organized.
2. Check that it is clear and easy to follow.
3. Check that the tone is professional and consistent.
4. Score from 0.0 (incoherent) to 1.0 (excellent).

Respond with JSON only:
{"score": 0.0-1.0, "reasoning": "short explanation", "issues": ["problem", ...]}
"#;

pub fn triage_user_message(context: &RequestContext, query: &str) -> String {
    format!(
        "Customer Context:\n{}\n\nCustomer Query:\n{}",
        context.to_pretty_json(),
        query
    )
}

/// Numbered passages, or [`NOT_FOUND_TEXT`] when there are none.
pub fn format_knowledge(documents: &[RetrievedDocument]) -> String {
    if documents.is_empty() {
        return NOT_FOUND_TEXT.to_string();
    }

    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] (relevance {:.2})\n{}", i + 1, doc.relevance_score, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn specialist_user_message(
    context: &RequestContext,
    knowledge_heading: &str,
    knowledge: &str,
    query: &str,
) -> String {
    format!(
        "Customer Context:\n{}\n\n{}:\n{}\n\nCustomer Query:\n{}",
        context.to_pretty_json(),
        knowledge_heading,
        knowledge,
        query
    )
}

pub fn render_user_message(
    customer_name: &str,
    query: &str,
    category: Option<QueryCategory>,
    specialist_text: &str,
) -> String {
    let category = category.map(|c| c.as_str()).unwrap_or("unknown");
    format!(
        "Customer name: {}\nOriginal question: {}\nQuery type: {}\n\nSpecialist answer:\n{}",
        customer_name, query, category, specialist_text
    )
}

/// Reference documents in the layout the accuracy judge expects.
pub fn format_reference_documents(documents: &[RetrievedDocument]) -> String {
    if documents.is_empty() {
        return NO_REFERENCE_DOCUMENTS.to_string();
    }

    let mut formatted = String::from("=== RETRIEVED KNOWLEDGE BASE DOCUMENTS (Source of Truth) ===\n\n");
    for (i, doc) in documents.iter().enumerate() {
        formatted.push_str(&format!(
            "[Document {} - Relevance Score: {:.2}]\n{}\n\n",
            i + 1,
            doc.relevance_score,
            doc.content
        ));
    }
    formatted
}

pub fn judge_accuracy_user_message(query: &str, references: &str, output: &str) -> String {
    format!(
        "Original question:\n{}\n\n{}\nResponse to grade:\n{}",
        query, references, output
    )
}

pub fn judge_coherence_user_message(output: &str) -> String {
    format!("Response to grade:\n{}", output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_knowledge_uses_not_found_text() {
        assert_eq!(format_knowledge(&[]), NOT_FOUND_TEXT);
    }

    #[test]
    fn test_reference_document_layout() {
        let docs = vec![
            RetrievedDocument::new("Copay is $30", 0.912),
            RetrievedDocument::new("Deductible is $500", 0.5),
        ];
        let formatted = format_reference_documents(&docs);
        assert!(formatted.contains("[Document 1 - Relevance Score: 0.91]\nCopay is $30"));
        assert!(formatted.contains("[Document 2 - Relevance Score: 0.50]"));
        assert_eq!(format_reference_documents(&[]), NO_REFERENCE_DOCUMENTS);
    }

    #[test]
    fn test_render_message_defaults_category() {
        let msg = render_user_message("there", "hi", None, "answer");
        assert!(msg.contains("Query type: unknown"));
    }
}
