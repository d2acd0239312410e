use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

pub const BUILTIN_VERSION: &str = "2024.1";

/// Concept to related-terms table used by the profile matcher. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymTable {
    version: String,
    entries: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SynonymFile {
    version: String,
    entries: HashMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn new(version: impl Into<String>, entries: HashMap<String, Vec<String>>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(concept, related)| {
                (
                    concept.trim().to_lowercase(),
                    related
                        .into_iter()
                        .map(|term| term.trim().to_lowercase())
                        .filter(|term| !term.is_empty())
                        .collect(),
                )
            })
            .filter(|(concept, _): &(String, Vec<String>)| !concept.is_empty())
            .collect();
        Self {
            version: version.into(),
            entries,
        }
    }

    pub fn builtin() -> &'static SynonymTable {
        static TABLE: OnceLock<SynonymTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            let entries = BUILTIN
                .iter()
                .map(|(concept, related)| {
                    (
                        concept.to_string(),
                        related.iter().map(|term| term.to_string()).collect(),
                    )
                })
                .collect();
            SynonymTable::new(BUILTIN_VERSION, entries)
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: SynonymFile = serde_json::from_str(raw)?;
        Ok(Self::new(file.version, file.entries))
    }

    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidData, error))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn related(&self, concept: &str) -> &[String] {
        self.entries
            .get(concept)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every concept and related term, for vocabulary scans.
    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|(concept, related)| std::iter::once(concept).chain(related.iter()))
            .map(String::as_str)
    }

    /// True when `signal` is linked to any of `pool` through the table, in either direction.
    pub fn links<'a>(&self, signal: &str, pool: impl IntoIterator<Item = &'a String> + Clone) -> bool {
        let forward = self.related(signal).iter().any(|synonym| {
            pool.clone()
                .into_iter()
                .any(|held| synonym.contains(held.as_str()) || held.contains(synonym.as_str()))
        });
        if forward {
            return true;
        }

        pool.into_iter().any(|held| {
            self.related(held).iter().any(|synonym| {
                synonym == signal || synonym.contains(signal) || signal.contains(synonym.as_str())
            })
        })
    }
}

type Entry = (&'static str, &'static [&'static str]);

const BUILTIN: &[Entry] = &[
    // software
    ("containerization", &["docker", "kubernetes", "k8s", "docker swarm", "container"]),
    ("container orchestration", &["kubernetes", "docker swarm", "k8s"]),
    ("docker", &["containerization", "container", "docker swarm", "devops"]),
    ("cloud infrastructure", &["aws", "azure", "gcp", "cloud", "ec2", "s3", "infrastructure"]),
    ("cloud", &["aws", "azure", "gcp", "heroku", "vercel", "cloud infrastructure"]),
    ("aws", &["cloud", "amazon web services", "cloud infrastructure"]),
    ("devops", &["docker", "ci/cd", "jenkins", "github actions", "linux", "infrastructure"]),
    ("ci/cd", &["github actions", "jenkins", "gitlab ci", "devops", "pipeline", "automation"]),
    ("backend development", &["spring boot", "nest.js", "express", "fastapi", "django", "rest api"]),
    ("rest api", &["api development", "backend development", "spring boot", "fastapi", "nest.js"]),
    ("api design", &["rest api", "api development", "graphql", "backend development"]),
    ("microservices", &["spring boot", "nest.js", "docker", "backend development", "distributed systems"]),
    ("frontend development", &["react.js", "next.js", "vue", "angular", "ui development", "html", "css"]),
    ("ui development", &["react.js", "next.js", "tailwind", "frontend development", "css"]),
    ("machine learning", &["tensorflow", "pytorch", "scikit-learn", "ai", "deep learning", "ml"]),
    ("deep learning", &["tensorflow", "pytorch", "neural network", "machine learning", "ai"]),
    ("generative ai", &["ai apis", "llm", "openai", "gpt", "ai development", "chatbot"]),
    ("database management", &["postgresql", "mysql", "mongodb", "sql", "database", "orm"]),
    ("sql", &["postgresql", "mysql", "database", "sql server", "query optimization"]),
    ("version control", &["git", "github", "gitlab", "bitbucket", "source control"]),
    ("monitoring", &["prometheus", "grafana", "observability", "logging", "alerting"]),
    ("linux systems", &["linux", "shell scripting", "bash", "ubuntu", "unix", "command line"]),
    ("networking", &["tcp/ip", "dns", "http", "network security", "linux", "firewall"]),
    ("agile", &["scrum", "kanban", "sprint", "jira", "agile development", "iterative development"]),
    ("javascript", &["typescript", "node.js", "react.js", "next.js", "js", "es6"]),
    ("python", &["django", "fastapi", "tensorflow", "pandas", "scripting", "data analysis"]),
    ("java", &["spring boot", "hibernate", "maven", "gradle", "oop"]),
    ("rust", &["cargo", "tokio", "systems programming", "memory safety"]),
    ("cybersecurity", &["penetration testing", "network security", "firewall", "security"]),
    ("testing", &["unit testing", "integration testing", "qa", "test automation", "jest", "junit"]),
    // finance
    ("financial modeling", &["excel", "dcf", "valuation", "forecasting", "financial analysis"]),
    ("financial analysis", &["financial modeling", "excel", "ratio analysis", "reporting", "budgeting"]),
    ("accounting", &["gaap", "ifrs", "bookkeeping", "financial reporting", "tax", "audit"]),
    ("audit", &["internal audit", "external audit", "financial review", "compliance", "accounting"]),
    ("risk management", &["financial risk", "credit risk", "market risk", "compliance", "risk assessment"]),
    ("budgeting", &["financial planning", "forecasting", "cost analysis", "financial modeling"]),
    // healthcare
    ("clinical assessment", &["patient evaluation", "diagnosis", "triage", "medical examination"]),
    ("patient care", &["clinical assessment", "nursing", "bedside manner", "healthcare"]),
    ("emergency care", &["triage", "resuscitation", "acute care", "patient stabilization"]),
    ("nursing", &["patient care", "clinical skills", "medication administration", "healthcare"]),
    ("radiology", &["medical imaging", "mri", "ct scan", "x-ray", "diagnostics"]),
    // law
    ("legal research", &["case law", "statutory interpretation", "legal writing", "litigation"]),
    ("contract law", &["contract drafting", "contract review", "legal agreements", "negotiation"]),
    ("due diligence", &["legal review", "contract analysis", "corporate law", "m&a"]),
    ("compliance", &["regulatory compliance", "legal compliance", "risk management", "governance"]),
    // engineering
    ("mechanical engineering", &["cad", "solidworks", "autocad", "thermodynamics", "manufacturing"]),
    ("civil engineering", &["structural analysis", "autocad", "construction management", "geotechnical"]),
    ("embedded systems", &["c programming", "microcontrollers", "rtos", "firmware", "can bus"]),
    ("quality assurance", &["testing", "qa", "iso", "quality control", "compliance"]),
    // business
    ("digital marketing", &["seo", "social media", "google ads", "content marketing", "analytics"]),
    ("data analytics", &["sql", "python", "excel", "tableau", "powerbi", "business intelligence"]),
    ("product management", &["roadmap", "agile", "user research", "product strategy", "stakeholders"]),
    ("crm", &["salesforce", "hubspot", "customer relationship", "sales", "business development"]),
    // education
    ("teaching", &["curriculum development", "classroom management", "student assessment", "pedagogy"]),
    ("training", &["facilitation", "instructional design", "learning development", "coaching"]),
    // data
    ("data science", &["machine learning", "python", "statistics", "data analysis", "modeling"]),
    ("data analysis", &["python", "sql", "excel", "statistics", "data visualization", "pandas"]),
    ("big data", &["hadoop", "spark", "data engineering", "etl", "data pipeline"]),
    ("etl", &["data pipeline", "data engineering", "sql", "data transformation"]),
    // transferable
    ("leadership", &["team management", "team lead", "mentoring", "decision making", "management"]),
    ("communication", &["presentation", "public speaking", "writing", "stakeholder management"]),
    ("problem solving", &["analytical thinking", "critical thinking", "troubleshooting", "innovation"]),
    ("project management", &["planning", "coordination", "delivery", "agile", "pmp"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn builtin_table_is_loaded_once_and_lowercased() {
        let table = SynonymTable::builtin();
        assert!(std::ptr::eq(table, SynonymTable::builtin()));
        assert_eq!(table.version(), BUILTIN_VERSION);
        assert!(table.related("containerization").contains(&"docker".to_string()));
    }

    #[test]
    fn forward_lookup_finds_related_term_in_pool() {
        let table = SynonymTable::builtin();
        assert!(table.links("containerization", &pool(&["docker"])));
    }

    #[test]
    fn reverse_lookup_finds_concept_held_by_candidate() {
        let table = SynonymTable::builtin();
        assert!(table.links("scrum", &pool(&["agile"])));
        assert!(!table.links("scrum", &pool(&["nursing"])));
    }

    #[test]
    fn custom_table_parses_from_json() -> Result<(), serde_json::Error> {
        let table = SynonymTable::from_json(
            r#"{"version": "custom-1", "entries": {"Welding": ["TIG", "MIG "]}}"#,
        )?;
        assert_eq!(table.version(), "custom-1");
        assert_eq!(table.related("welding"), ["tig".to_string(), "mig".to_string()]);
        assert_eq!(table.len(), 1);
        Ok(())
    }
}
