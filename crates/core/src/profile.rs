use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError, VecSkipError};
use std::collections::BTreeSet;

/// Structured evidence extracted from a CV or a requirement text.
///
/// Every field is always present; an extraction failure yields [`Profile::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub skills: Vec<String>,
    pub domain: String,
    pub keywords: Vec<String>,
    pub certifications: Vec<String>,
    pub implied: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileRole {
    Candidate,
    Requirement,
}

// Shape returned by the extraction service. Fields of the wrong type collapse to
// empty, and non-string list items are dropped.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    skills: Vec<String>,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    required_skills: Vec<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    domain: String,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    keywords: Vec<String>,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    experience_keywords: Vec<String>,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    project_keywords: Vec<String>,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    certifications: Vec<String>,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    implied: Vec<String>,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    implied_skills: Vec<String>,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    implied_capabilities: Vec<String>,
}

impl Profile {
    /// Validates arbitrary extraction output into a fixed-shape profile.
    pub fn from_json(role: ProfileRole, value: &Value) -> Self {
        if !value.is_object() {
            return Self::default();
        }
        let raw = RawProfile::deserialize(value).unwrap_or_default();

        match role {
            ProfileRole::Candidate => Self {
                skills: clean_list([raw.skills, raw.required_skills]),
                domain: raw.domain.trim().to_string(),
                keywords: clean_list([raw.keywords, raw.experience_keywords, raw.project_keywords]),
                certifications: clean_list([raw.certifications]),
                implied: clean_list([raw.implied, raw.implied_capabilities, raw.implied_skills]),
            },
            ProfileRole::Requirement => Self {
                skills: clean_list([raw.required_skills, raw.skills]),
                domain: raw.domain.trim().to_string(),
                keywords: clean_list([raw.keywords, raw.experience_keywords, raw.project_keywords]),
                certifications: clean_list([raw.certifications]),
                implied: clean_list([raw.implied_skills, raw.implied, raw.implied_capabilities]),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
            && self.domain.is_empty()
            && self.keywords.is_empty()
            && self.certifications.is_empty()
            && self.implied.is_empty()
    }

    /// Evidence pool of a candidate: every list field plus the declared domain.
    pub fn candidate_signals(&self) -> BTreeSet<String> {
        let mut pool = self.requirement_signals();
        let domain = normalize_signal(&self.domain);
        if !domain.is_empty() {
            pool.insert(domain);
        }
        pool
    }

    /// Signals a requirement asks for. The domain is scored separately.
    pub fn requirement_signals(&self) -> BTreeSet<String> {
        self.skills
            .iter()
            .chain(&self.keywords)
            .chain(&self.certifications)
            .chain(&self.implied)
            .map(|signal| normalize_signal(signal))
            .filter(|signal| !signal.is_empty())
            .collect()
    }
}

pub fn normalize_signal(signal: &str) -> String {
    signal.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn clean_list<const N: usize>(lists: [Vec<String>; N]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    lists
        .into_iter()
        .flatten()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_json_merges_keyword_fields() {
        let value = json!({
            "skills": ["Python", "Docker", "python"],
            "domain": " backend development ",
            "experience_keywords": ["built payment systems"],
            "project_keywords": ["AI wellness app"],
            "certifications": ["AWS Certified"],
            "implied_capabilities": ["API development"]
        });
        let profile = Profile::from_json(ProfileRole::Candidate, &value);
        assert_eq!(profile.skills, vec!["Python", "Docker"]);
        assert_eq!(profile.domain, "backend development");
        assert_eq!(
            profile.keywords,
            vec!["built payment systems", "AI wellness app"]
        );
        assert_eq!(profile.implied, vec!["API development"]);
    }

    #[test]
    fn requirement_json_reads_required_and_implied_skills() {
        let value = json!({
            "required_skills": ["Kubernetes"],
            "domain": "devops",
            "keywords": ["reliability"],
            "certifications": [],
            "implied_skills": ["Linux"]
        });
        let profile = Profile::from_json(ProfileRole::Requirement, &value);
        assert_eq!(profile.skills, vec!["Kubernetes"]);
        assert_eq!(profile.implied, vec!["Linux"]);
    }

    #[test]
    fn malformed_fields_are_coerced_to_empty() {
        let value = json!({
            "skills": "Python, Docker",
            "domain": ["not", "a", "string"],
            "keywords": ["ok", 42, null, {"x": 1}, "  "],
            "certifications": null
        });
        let profile = Profile::from_json(ProfileRole::Candidate, &value);
        assert!(profile.skills.is_empty());
        assert_eq!(profile.domain, "");
        assert_eq!(profile.keywords, vec!["ok"]);
        assert!(profile.certifications.is_empty());
    }

    #[test]
    fn non_object_output_is_an_empty_profile() {
        assert!(Profile::from_json(ProfileRole::Requirement, &json!(["a", "b"])).is_empty());
        assert!(Profile::from_json(ProfileRole::Requirement, &json!("text")).is_empty());
    }

    #[test]
    fn signal_pools_are_normalized() {
        let profile = Profile {
            skills: vec!["  Machine   Learning ".to_string(), "SQL".to_string()],
            domain: "Data Science".to_string(),
            keywords: vec!["sql".to_string()],
            certifications: Vec::new(),
            implied: Vec::new(),
        };
        let required = profile.requirement_signals();
        assert_eq!(
            required.into_iter().collect::<Vec<_>>(),
            vec!["machine learning".to_string(), "sql".to_string()]
        );
        assert!(profile.candidate_signals().contains("data science"));
    }
}
