//! Dosage-form classification
//!
//! The classifier looks only at the label title. The backend strategy must
//! answer with one of the four form labels; anything else counts as a failed
//! call and the keyword rules decide instead.

use super::{FormType, LabelPage, Method};
use crate::analysis::{AnalysisBackend, AnalysisError, AnalysisRequest, BackendGate};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// How sure a strategy is about its answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Outcome of classifying one label page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationResult {
    pub form: FormType,
    pub method: Method,
    pub confidence: Option<Confidence>,
}

/// A way of turning a title into a dosage form
#[async_trait]
pub trait FormStrategy: Send + Sync {
    fn method(&self) -> Method;

    async fn classify(&self, title: &str) -> Result<ClassificationResult, AnalysisError>;
}

static INCLUSIONS: Lazy<Vec<(Regex, FormType)>> = Lazy::new(|| {
    [
        (r"(?i)\b(?:capsules?|softgels?)\b", FormType::Capsule),
        (
            r"(?i)\b(?:liquids?|solutions?|suspensions?|syrups?|elixirs?)\b",
            FormType::Liquid,
        ),
        (r"(?i)\b(?:tablets?|caplets?)\b", FormType::Tablet),
    ]
    .into_iter()
    .map(|(pattern, form)| (Regex::new(pattern).expect("valid inclusion regex"), form))
    .collect()
});

static EXCLUSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:creams?|ointments?|injections?|injectable|topical|patch(?:es)?|gels?|lotions?|sprays?)\b",
    )
    .expect("valid exclusion regex")
});

/// Deterministic keyword rules over the title
///
/// Inclusion patterns win in order; exclusions only matter when nothing is
/// included. No match at all is `Other`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordFormStrategy;

impl KeywordFormStrategy {
    pub fn classify_title(&self, title: &str) -> ClassificationResult {
        if let Some((_, form)) = INCLUSIONS.iter().find(|(re, _)| re.is_match(title)) {
            return ClassificationResult {
                form: *form,
                method: Method::Fallback,
                confidence: Some(Confidence::High),
            };
        }

        let confidence = if EXCLUSION.is_match(title) {
            Confidence::High
        } else {
            Confidence::Low
        };

        ClassificationResult {
            form: FormType::Other,
            method: Method::Fallback,
            confidence: Some(confidence),
        }
    }
}

#[async_trait]
impl FormStrategy for KeywordFormStrategy {
    fn method(&self) -> Method {
        Method::Fallback
    }

    async fn classify(&self, title: &str) -> Result<ClassificationResult, AnalysisError> {
        Ok(self.classify_title(title))
    }
}

const FORM_SYSTEM_PROMPT: &str =
    "You are a medical information analyzer. Respond only with valid JSON.";

static JSON_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid JSON object regex"));

#[derive(Debug, Deserialize)]
struct FormAnswer {
    form_type: String,
    #[serde(default)]
    confidence: Option<String>,
}

/// Asks the analysis backend to name the form
#[derive(Debug, Clone)]
pub struct AiFormStrategy {
    backend: Arc<dyn AnalysisBackend>,
}

impl AiFormStrategy {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }

    fn prompt(title: &str) -> String {
        format!(
            r#"Determine the dosage form of this medication from its name.

Medication name: "{title}"

Respond with ONLY a JSON object in this exact format:
{{"form_type": "capsule|liquid|tablet|other", "confidence": "high|medium|low"}}

capsule: capsules and softgels
liquid: oral solutions, suspensions, syrups, elixirs
tablet: tablets, caplets, chewable tablets
other: creams, ointments, injections, topicals, gels, lotions, sprays, patches, drops, or anything uncertain"#
        )
    }

    /// Maps a backend answer onto the form vocabulary
    fn parse_answer(answer: &str) -> Result<ClassificationResult, AnalysisError> {
        let (label, confidence) = match JSON_OBJECT_RE.find(answer) {
            Some(m) => {
                let parsed: FormAnswer = serde_json::from_str(m.as_str())
                    .map_err(|e| AnalysisError::ParseError(e.to_string()))?;
                let confidence = parsed.confidence.as_deref().and_then(Confidence::from_label);
                (parsed.form_type, confidence)
            }
            None => (answer.trim().trim_matches('"').to_string(), None),
        };

        let form = FormType::from_label(&label).ok_or_else(|| {
            AnalysisError::ParseError(format!("unrecognized form label: {label:?}"))
        })?;

        Ok(ClassificationResult {
            form,
            method: Method::Primary,
            confidence,
        })
    }
}

#[async_trait]
impl FormStrategy for AiFormStrategy {
    fn method(&self) -> Method {
        Method::Primary
    }

    async fn classify(&self, title: &str) -> Result<ClassificationResult, AnalysisError> {
        let prompt = Self::prompt(title);
        let request = AnalysisRequest {
            system: FORM_SYSTEM_PROMPT,
            prompt: &prompt,
            max_tokens: 150,
        };
        let answer = self.backend.complete(&request).await?;
        Self::parse_answer(&answer)
    }
}

/// Chooses between the backend and the keyword rules for each page
pub struct PageClassifier {
    primary: Option<Box<dyn FormStrategy>>,
    fallback: KeywordFormStrategy,
    gate: Arc<BackendGate>,
}

impl PageClassifier {
    pub fn new(backend: Option<Arc<dyn AnalysisBackend>>, gate: Arc<BackendGate>) -> Self {
        Self {
            primary: backend
                .map(|backend| Box::new(AiFormStrategy::new(backend)) as Box<dyn FormStrategy>),
            fallback: KeywordFormStrategy,
            gate,
        }
    }

    /// Classifies a page by its title
    ///
    /// Never fails: an untitled page is `Other`, and any backend problem
    /// falls through to the keyword rules.
    pub async fn classify(&self, page: &LabelPage) -> ClassificationResult {
        let Some(title) = page.title() else {
            tracing::debug!("No title found on {}", page.reference.url);
            return ClassificationResult {
                form: FormType::Other,
                method: Method::Fallback,
                confidence: Some(Confidence::Low),
            };
        };

        if let Some(primary) = self.primary.as_ref().filter(|_| self.gate.is_open()) {
            match primary.classify(title).await {
                Ok(result) => {
                    tracing::debug!("Classified {:?} as {} via backend", title, result.form);
                    return result;
                }
                Err(e) => {
                    tracing::debug!("Backend classification failed for {:?}: {}", title, e);
                    self.gate.record_failure(&e);
                }
            }
        }

        let result = self.fallback.classify_title(title);
        tracing::debug!("Classified {:?} as {} via keywords", title, result.form);
        result
    }
}

impl fmt::Debug for PageClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageClassifier")
            .field("primary", &self.primary.as_ref().map(|p| p.method()))
            .field("gate", &self.gate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FakeBackend;
    use crate::url::CandidateReference;

    fn page(title: &str) -> LabelPage {
        LabelPage::new(
            CandidateReference {
                canonical_id: "set-1".to_string(),
                url: "https://dailymed.nlm.nih.gov/dailymed/lookup.cfm?setid=set-1".to_string(),
            },
            format!("<html><head><title>{title}</title></head><body></body></html>"),
        )
    }

    #[test]
    fn test_keyword_inclusions() {
        let rules = KeywordFormStrategy;
        assert_eq!(rules.classify_title("Hydrocortisone Capsule 20mg").form, FormType::Capsule);
        assert_eq!(rules.classify_title("Hydrocortisone Oral Suspension").form, FormType::Liquid);
        assert_eq!(rules.classify_title("IBUPROFEN tablet, film coated").form, FormType::Tablet);
        assert_eq!(rules.classify_title("Vitamin D3 Softgels").form, FormType::Capsule);
    }

    #[test]
    fn test_keyword_exclusions() {
        let rules = KeywordFormStrategy;
        let result = rules.classify_title("Hydrocortisone Cream 1%");
        assert_eq!(result.form, FormType::Other);
        assert_eq!(result.method, Method::Fallback);
        assert_eq!(result.confidence, Some(Confidence::High));

        assert_eq!(rules.classify_title("Lidocaine Patch").form, FormType::Other);
    }

    #[test]
    fn test_keyword_inclusion_beats_exclusion() {
        let rules = KeywordFormStrategy;
        assert_eq!(rules.classify_title("Gel-coated tablet").form, FormType::Tablet);
    }

    #[test]
    fn test_gelatin_is_not_gel() {
        let rules = KeywordFormStrategy;
        let result = rules.classify_title("Gelatin Capsule");
        assert_eq!(result.form, FormType::Capsule);

        let result = rules.classify_title("Gelatinous Mass");
        assert_eq!(result.form, FormType::Other);
        assert_eq!(result.confidence, Some(Confidence::Low));
    }

    #[test]
    fn test_keyword_is_deterministic() {
        let rules = KeywordFormStrategy;
        let title = "Hydrocortisone Oral Solution";
        assert_eq!(rules.classify_title(title), rules.classify_title(title));
    }

    #[test]
    fn test_parse_answer_json() {
        let result = AiFormStrategy::parse_answer(
            "Sure: {\"form_type\": \"Liquid\", \"confidence\": \"medium\"}",
        )
        .unwrap();
        assert_eq!(result.form, FormType::Liquid);
        assert_eq!(result.method, Method::Primary);
        assert_eq!(result.confidence, Some(Confidence::Medium));
    }

    #[test]
    fn test_parse_answer_bare_word() {
        let result = AiFormStrategy::parse_answer("tablet").unwrap();
        assert_eq!(result.form, FormType::Tablet);
        assert_eq!(result.confidence, None);
    }

    #[test]
    fn test_parse_answer_out_of_vocabulary() {
        let err = AiFormStrategy::parse_answer(r#"{"form_type": "other_oral"}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::ParseError(_)));

        let err = AiFormStrategy::parse_answer("I think it is a gel").unwrap_err();
        assert!(matches!(err, AnalysisError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_classifier_uses_backend_when_open() {
        let backend = Arc::new(
            FakeBackend::new().with_response("Hydrocortisone", r#"{"form_type": "capsule"}"#),
        );
        let gate = Arc::new(BackendGate::new(true, 3));
        let shared: Arc<dyn AnalysisBackend> = backend.clone();
        let classifier = PageClassifier::new(Some(shared), gate);

        let result = classifier.classify(&page("Hydrocortisone Liquid-filled Cap")).await;
        assert_eq!(result.form, FormType::Capsule);
        assert_eq!(result.method, Method::Primary);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_classifier_falls_back_on_unusable_answer() {
        let backend: Arc<dyn AnalysisBackend> =
            Arc::new(FakeBackend::new().with_default_response("no idea"));
        let gate = Arc::new(BackendGate::new(true, 1));
        let classifier = PageClassifier::new(Some(backend), gate.clone());

        let result = classifier.classify(&page("Hydrocortisone Cream 1%")).await;
        assert_eq!(result.form, FormType::Other);
        assert_eq!(result.method, Method::Fallback);
        assert!(gate.is_open());
    }

    #[tokio::test]
    async fn test_classifier_skips_backend_when_gate_closed() {
        let backend = Arc::new(FakeBackend::new().with_default_response("capsule"));
        let gate = Arc::new(BackendGate::disabled());
        let shared: Arc<dyn AnalysisBackend> = backend.clone();
        let classifier = PageClassifier::new(Some(shared), gate);

        let result = classifier.classify(&page("Hydrocortisone Tablets")).await;
        assert_eq!(result.form, FormType::Tablet);
        assert_eq!(result.method, Method::Fallback);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_untitled_page_is_other() {
        let classifier = PageClassifier::new(None, Arc::new(BackendGate::disabled()));
        let untitled = LabelPage::new(
            CandidateReference {
                canonical_id: "x".to_string(),
                url: "https://example.org/lookup.cfm?setid=x".to_string(),
            },
            "<html><body></body></html>".to_string(),
        );
        let result = classifier.classify(&untitled).await;
        assert_eq!(result.form, FormType::Other);
    }
}
