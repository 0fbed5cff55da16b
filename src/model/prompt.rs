//! Prompt templates for generation and judging.
//!
//! Generation prompts return a `Vec<ChatMessage>` ready to be sent to the
//! trainable model. Judge prompts return a single user prompt string; every
//! structured judge is told the exact JSON shape it must answer with, and the
//! field names here are the ones [`crate::rollout::listing`] extracts.

use crate::model::api::ChatMessage;
use crate::scenario::{ListingScenario, SummaryScenario};

// ---------------------------------------------------------------------------
// Summarization
// ---------------------------------------------------------------------------

const SUMMARY_SYSTEM: &str =
    "You are a specialized AI assistant that generates concise, informative summaries for documents.";

/// Build the summarization conversation for a document.
pub fn summary_prompt(scenario: &SummaryScenario) -> Vec<ChatMessage> {
    let user = format!(
        "{SUMMARY_SYSTEM}\n\n\
         Here is a document: {}\n\n\
         Generate a summary that conveys all relevant information in a concise manner.",
        scenario.document()
    );

    vec![ChatMessage::system(SUMMARY_SYSTEM), ChatMessage::user(user)]
}

/// Ask the judge to answer `question` using only `context`.
pub fn answer_question_prompt(context: &str, question: &str) -> String {
    format!(
        "Here is a document: {context}\n\n\
         Answer this question to the best of your ability in one sentence, \
         if the document does not contain the answer, just state so: {question}"
    )
}

/// Ask the judge whether `generated` matches the golden answer. The judge
/// must reply with exactly `1` or `0`.
pub fn compare_answers_prompt(
    document: &str,
    question: &str,
    generated: &str,
    golden: &str,
) -> String {
    format!(
        "Here is a document: {document}\n\n\
         Here is a question: {question}\n\n\
         Here is a generated answer: {generated}\n\n\
         Here is the golden answer: {golden}\n\n\
         If the answers mostly match return a 1, if they do not match return a 0. \
         Do not return any other text."
    )
}

// ---------------------------------------------------------------------------
// Job-offer listing
// ---------------------------------------------------------------------------

const LISTING_TEMPLATE: &str = r#"<job_offer>
  <title>{{JOB_TITLE}}</title>
  <overview>{{TWO_OR_THREE_SENTENCES_OVERVIEW}}</overview>
  <responsibilities>
    <responsibility>{{RESPONSIBILITY_1}}</responsibility>
    <responsibility>{{RESPONSIBILITY_2}}</responsibility>
    <responsibility>{{RESPONSIBILITY_3}}</responsibility>
    <responsibility>{{RESPONSIBILITY_4}}</responsibility>
    <responsibility>{{RESPONSIBILITY_5}}</responsibility>
  </responsibilities>
  <skills>
    <skill>{{REQUIRED_SKILL_1}}</skill>
    <skill>{{REQUIRED_SKILL_2}}</skill>
    <skill>{{REQUIRED_SKILL_3}}</skill>
  </skills>
  <nice_to_have>
    <item>{{NICE_TO_HAVE_1}}</item>
    <item>{{NICE_TO_HAVE_2}}</item>
  </nice_to_have>
</job_offer>

Guidelines:
- Overview: 2-3 sentences describing the purpose of the role and its impact on the company
- Key Responsibilities: List 5-7 items with action verbs (e.g., "Develop", "Manage", "Lead", "Optimize")
- Focus on outcomes and accountability, not just tasks
- Skills: Include provided skills and add relevant missing ones"#;

/// Build the job-offer generation conversation for a listing scenario.
pub fn listing_prompt(scenario: &ListingScenario) -> Vec<ChatMessage> {
    let system = format!(
        "You are a specialized AI assistant that generates professional job offers in XML format.\n\
         You must follow this template structure and output valid XML.\n\n\
         Template:\n{LISTING_TEMPLATE}\n"
    );

    let mut context_info = format!(
        "Job Title: {}\nLanguage: {}",
        scenario.job_title(),
        scenario.language()
    );
    if !scenario.skills().is_empty() {
        context_info.push_str(&format!(
            "\nProvided Skills: {}",
            scenario.skills().join(", ")
        ));
    }

    let user = format!(
        "Generate a complete job offer based on this context:\n\n\
         {context_info}\n\n\
         Instructions:\n\
         1. Use the same language as provided ({language})\n\
         2. Include all provided skills and add relevant ones that are missing\n\
         3. Create 5-7 key responsibilities using action verbs\n\
         4. Output in valid XML format with these tags: <job_offer>, <title>, <overview>, \
         <responsibilities>, <skills>, <nice_to_have>\n\
         5. Each responsibility, skill, and nice-to-have should be in its own tag\n\n\
         Generate the job offer now:",
        language = scenario.language()
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Human-readable name for the language codes the dataset uses.
pub fn language_name(code: &str) -> &str {
    match code.to_ascii_lowercase().as_str() {
        "en" => "English",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "nl" => "Dutch",
        "pt" => "Portuguese",
        _ => code,
    }
}

pub fn language_judge_prompt(language: &str, offer: &str) -> String {
    let excerpt: String = offer.chars().take(300).collect();
    format!(
        "Is this text written in {upper} language?\n\n\
         Text to check: {excerpt}\n\n\
         Expected language: {language} ({name})\n\n\
         Respond ONLY in JSON format:\n\
         {{\"answer\": \"YES\" or \"NO\"}}",
        upper = language.to_uppercase(),
        name = language_name(language),
    )
}

pub fn xml_judge_prompt(offer: &str) -> String {
    format!(
        "Is this valid XML format? Check if it has proper opening/closing tags and contains \
         the required tags <job_offer>, <title>, <overview>, <responsibilities>, <skills> \
         and <nice_to_have>.\n\n\
         Text to check:\n{offer}\n\n\
         Respond ONLY in JSON format:\n\
         {{\"valid_xml\": true or false, \"has_required_tags\": true or false}}"
    )
}

pub fn context_inclusion_judge_prompt(skills: &[String], offer: &str) -> String {
    format!(
        "Check which of the provided skills are included in the generated job offer. \
         A skill counts as included when it appears verbatim or as a clear equivalent. \
         Also list provided skills that appear more than once under redundant phrasings.\n\n\
         Provided skills that MUST be included: {}\n\n\
         Generated job offer:\n{offer}\n\n\
         Respond ONLY in JSON format:\n\
         {{\"missing_skills\": [], \"duplicate_skills\": []}}",
        skills.join(", ")
    )
}

pub fn skill_relevance_judge_prompt(job_title: &str, skills: &[String], offer: &str) -> String {
    let provided = if skills.is_empty() {
        "None".to_string()
    } else {
        skills.join(", ")
    };
    format!(
        "For a {job_title} position:\n\n\
         1. Extract ALL skills mentioned in the job offer (both in the skills and nice-to-have sections)\n\
         2. EXCLUDE these provided skills from evaluation (assume they are relevant): {provided}\n\
         3. Evaluate ONLY the NEW skills added by the model for relevance to {job_title}\n\n\
         Generated job offer:\n{offer}\n\n\
         Respond ONLY in JSON format:\n\
         {{\n  \"new_skills\": [\"skill1\", \"skill2\"],\n  \"irrelevant_new_skills\": [\"skill2\"]\n}}"
    )
}

pub fn skill_completeness_judge_prompt(job_title: &str, language: &str, offer: &str) -> String {
    format!(
        "For a {job_title} position in {language} language:\n\n\
         Current job offer:\n{offer}\n\n\
         Are there any CRITICAL skills missing that are absolutely essential for this role? \
         Give each missing skill an importance between 0.0 (minor) and 1.0 (disqualifying).\n\n\
         Respond ONLY in JSON format:\n\
         {{\n  \"missing_essential_skills\": [{{\"skill\": \"name\", \"importance\": 0.0}}]\n}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::QaPair;

    #[test]
    fn test_summary_prompt_embeds_document() {
        let scenario = SummaryScenario::new(
            "The quarterly report shows growth.",
            vec![QaPair::new("What grew?", "Revenue")],
        )
        .unwrap();
        let messages = summary_prompt(&scenario);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.contains("The quarterly report shows growth."));
    }

    #[test]
    fn test_listing_prompt_lists_skills_only_when_present() {
        let with = ListingScenario::new("Data Engineer", "en", vec!["SQL".into(), "Spark".into()])
            .unwrap();
        let messages = listing_prompt(&with);
        assert!(messages[0].content.contains("<job_offer>"));
        assert!(messages[1].content.contains("Provided Skills: SQL, Spark"));

        let without = ListingScenario::new("Data Engineer", "fr", Vec::new()).unwrap();
        let messages = listing_prompt(&without);
        assert!(!messages[1].content.contains("Provided Skills"));
        assert!(messages[1].content.contains("(fr)"));
    }

    #[test]
    fn test_language_prompt_truncates_offer_on_char_boundary() {
        let offer = "é".repeat(1000);
        let prompt = language_judge_prompt("fr", &offer);
        assert!(prompt.contains("written in FR language"));
        assert!(prompt.contains("(French)"));
        assert_eq!(prompt.matches('é').count(), 300);
    }

    #[test]
    fn test_relevance_prompt_marks_missing_provided_skills() {
        let prompt = skill_relevance_judge_prompt("Chef", &[], "<job_offer/>");
        assert!(prompt.contains("(assume they are relevant): None"));
    }
}
