//! Scenario types: the immutable input of one rollout.
//!
//! Constructors validate their input and are the only way to build a
//! scenario, so a scenario that exists is always scoreable. Nothing
//! downstream mutates one.

use serde::Serialize;

use crate::config::TaskKind;

/// A scenario that cannot be built from the given data.
///
/// This indicates a data-pipeline defect and is fatal for the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    #[error("summary scenario has an empty document")]
    EmptyDocument,

    #[error("summary scenario has no reference questions")]
    NoQuestions,

    #[error("reference question {index} has an empty question or answer")]
    EmptyQuestion { index: usize },

    #[error("listing scenario has an empty job title")]
    EmptyJobTitle,

    #[error("listing scenario has an empty language code")]
    EmptyLanguage,

    #[error("listing scenario skill {index} is blank")]
    BlankSkill { index: usize },
}

// ---------------------------------------------------------------------------
// Summarization
// ---------------------------------------------------------------------------

/// A reference question with its golden answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A document to summarise plus the questions a good summary must answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryScenario {
    id: String,
    document: String,
    questions: Vec<QaPair>,
    use_full: bool,
}

impl SummaryScenario {
    pub fn new(document: impl Into<String>, questions: Vec<QaPair>) -> Result<Self, ScenarioError> {
        let document = document.into();
        if document.trim().is_empty() {
            return Err(ScenarioError::EmptyDocument);
        }
        if questions.is_empty() {
            return Err(ScenarioError::NoQuestions);
        }
        if let Some(index) = questions
            .iter()
            .position(|qa| qa.question.trim().is_empty() || qa.answer.trim().is_empty())
        {
            return Err(ScenarioError::EmptyQuestion { index });
        }

        Ok(Self {
            id: String::new(),
            document,
            questions,
            use_full: false,
        })
    }

    /// Attach the dataset's document identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Score the raw document instead of a generated summary.
    ///
    /// Used as a control to measure the full-document baseline.
    pub fn with_full_document(mut self) -> Self {
        self.use_full = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn questions(&self) -> &[QaPair] {
        &self.questions
    }

    pub fn use_full(&self) -> bool {
        self.use_full
    }
}

// ---------------------------------------------------------------------------
// Job-offer listing
// ---------------------------------------------------------------------------

/// The context a job offer is generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingScenario {
    job_title: String,
    language: String,
    skills: Vec<String>,
    step: u64,
}

impl ListingScenario {
    pub fn new(
        job_title: impl Into<String>,
        language: impl Into<String>,
        skills: Vec<String>,
    ) -> Result<Self, ScenarioError> {
        let job_title = job_title.into().trim().to_string();
        let language = language.into().trim().to_string();
        if job_title.is_empty() {
            return Err(ScenarioError::EmptyJobTitle);
        }
        if language.is_empty() {
            return Err(ScenarioError::EmptyLanguage);
        }
        if let Some(index) = skills.iter().position(|s| s.trim().is_empty()) {
            return Err(ScenarioError::BlankSkill { index });
        }

        Ok(Self {
            job_title,
            language,
            skills: skills.into_iter().map(|s| s.trim().to_string()).collect(),
            step: 0,
        })
    }

    /// Tag the scenario with the training step it is rolled out at.
    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    pub fn job_title(&self) -> &str {
        &self.job_title
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Skills the offer must include. Empty when none were provided.
    pub fn skills(&self) -> &[String] {
        &self.skills
    }

    pub fn step(&self) -> u64 {
        self.step
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// One unit of rollout work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Scenario {
    Summary(SummaryScenario),
    Listing(ListingScenario),
}

impl Scenario {
    pub fn kind(&self) -> TaskKind {
        match self {
            Scenario::Summary(_) => TaskKind::Summary,
            Scenario::Listing(_) => TaskKind::Listing,
        }
    }

    /// Short identity for logs.
    pub fn label(&self) -> String {
        match self {
            Scenario::Summary(s) if !s.id().is_empty() => format!("document {}", s.id()),
            Scenario::Summary(s) => {
                let head: String = s.document().chars().take(40).collect();
                format!("document \"{head}\"")
            }
            Scenario::Listing(l) => format!("{} ({})", l.job_title(), l.language()),
        }
    }

    /// The same scenario tagged with a training step. Only listing scenarios
    /// carry a step; summaries are returned unchanged.
    pub fn at_step(&self, step: u64) -> Scenario {
        match self {
            Scenario::Listing(l) => Scenario::Listing(l.clone().with_step(step)),
            other => other.clone(),
        }
    }
}

impl From<SummaryScenario> for Scenario {
    fn from(s: SummaryScenario) -> Self {
        Scenario::Summary(s)
    }
}

impl From<ListingScenario> for Scenario {
    fn from(l: ListingScenario) -> Self {
        Scenario::Listing(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_requires_document_and_questions() {
        assert_eq!(
            SummaryScenario::new("   ", vec![QaPair::new("q", "a")]).unwrap_err(),
            ScenarioError::EmptyDocument
        );
        assert_eq!(
            SummaryScenario::new("doc", Vec::new()).unwrap_err(),
            ScenarioError::NoQuestions
        );
        assert_eq!(
            SummaryScenario::new("doc", vec![QaPair::new("q", "a"), QaPair::new("q2", " ")])
                .unwrap_err(),
            ScenarioError::EmptyQuestion { index: 1 }
        );
    }

    #[test]
    fn test_summary_full_document_flag() {
        let s = SummaryScenario::new("doc", vec![QaPair::new("q", "a")]).unwrap();
        assert!(!s.use_full());
        assert!(s.with_full_document().use_full());
    }

    #[test]
    fn test_listing_skills_default_empty_and_are_trimmed() {
        let l = ListingScenario::new(" DevOps Engineer ", "en", Vec::new()).unwrap();
        assert_eq!(l.job_title(), "DevOps Engineer");
        assert!(l.skills().is_empty());
        assert_eq!(l.step(), 0);

        let l = ListingScenario::new("Chef", "fr", vec![" Cuisine ".into()]).unwrap();
        assert_eq!(l.skills(), ["Cuisine".to_string()]);
    }

    #[test]
    fn test_listing_rejects_blank_fields() {
        assert_eq!(
            ListingScenario::new("", "en", Vec::new()).unwrap_err(),
            ScenarioError::EmptyJobTitle
        );
        assert_eq!(
            ListingScenario::new("Chef", " ", Vec::new()).unwrap_err(),
            ScenarioError::EmptyLanguage
        );
        assert_eq!(
            ListingScenario::new("Chef", "en", vec!["Knife work".into(), "".into()]).unwrap_err(),
            ScenarioError::BlankSkill { index: 1 }
        );
    }

    #[test]
    fn test_at_step_tags_listing_only() {
        let listing: Scenario = ListingScenario::new("Chef", "en", Vec::new()).unwrap().into();
        match listing.at_step(42) {
            Scenario::Listing(l) => assert_eq!(l.step(), 42),
            other => panic!("unexpected scenario {other:?}"),
        }
        // The original is untouched.
        match &listing {
            Scenario::Listing(l) => assert_eq!(l.step(), 0),
            other => panic!("unexpected scenario {other:?}"),
        }

        let summary: Scenario = SummaryScenario::new("doc", vec![QaPair::new("q", "a")])
            .unwrap()
            .into();
        assert_eq!(summary.at_step(3), summary);
    }

    #[test]
    fn test_labels() {
        let s: Scenario = SummaryScenario::new("A long document body", vec![QaPair::new("q", "a")])
            .unwrap()
            .with_id("doc-7")
            .into();
        assert_eq!(s.label(), "document doc-7");
        assert_eq!(s.kind(), TaskKind::Summary);

        let l: Scenario = ListingScenario::new("Chef", "fr", Vec::new()).unwrap().into();
        assert_eq!(l.label(), "Chef (fr)");
    }
}
