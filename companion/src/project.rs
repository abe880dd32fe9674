//! Project identity resolution from file paths.
//!
//! Engineering teams organize CAD files under project folders following a
//! handful of naming conventions (`2025_PROJ_466_Bomba_Hidraulica`,
//! `C-466_Bomba_Hidraulica`, `BMW-123_Motor_Eletrico`, or a plain folder
//! under a `projetos`/`projects` root). This module resolves a file path
//! to a [`ProjectInfo`] by evaluating an ordered rule list with
//! first-match-wins semantics.
//!
//! Resolution is a pure function of the path string: no I/O, no state.
//! A path that matches no rule yields `is_valid_project = false`; callers
//! substitute the sentinel identity instead of treating it as an error.

use once_cell::sync::Lazy;
use regex::Regex;

/// Project id used when no rule matches a path.
pub const UNKNOWN_PROJECT_ID: &str = "UNKNOWN";

/// Display name used when no rule matches a path.
pub const UNKNOWN_PROJECT_NAME: &str = "Unassigned File";

static PHASE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[._-]").expect("valid regex"));

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Resolved project identity for a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Project identifier, e.g. `C-466` or `466`.
    pub project_id: String,
    /// Human-readable project name with separators replaced by spaces.
    pub display_name: String,
    /// Directory containing the project folder.
    pub folder_path: String,
    /// Project phase derived from path segments, `Geral` when unknown.
    pub phase: String,
    /// `false` means no rule matched; all other fields are empty.
    pub is_valid_project: bool,
}

impl ProjectInfo {
    /// Returns the invalid marker produced when no rule matches.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            project_id: String::new(),
            display_name: String::new(),
            folder_path: String::new(),
            phase: String::new(),
            is_valid_project: false,
        }
    }

    /// Returns the sentinel identity substituted for unresolved files.
    ///
    /// Stray files outside any known project structure are still
    /// monitored; they are grouped under this identity.
    #[must_use]
    pub fn unassigned() -> Self {
        Self {
            project_id: UNKNOWN_PROJECT_ID.to_string(),
            display_name: UNKNOWN_PROJECT_NAME.to_string(),
            folder_path: String::new(),
            phase: "Geral".to_string(),
            is_valid_project: false,
        }
    }
}

/// One path-pattern rule in the resolver's ordered rule list.
///
/// `folder_group` captures the whole project folder token. `id_group`
/// captures an explicit project id; when `None` the id is derived from
/// the first digit run in the folder token. `name_group` captures the
/// raw display name.
#[derive(Debug, Clone)]
pub struct ProjectRule {
    pattern: Regex,
    folder_group: usize,
    id_group: Option<usize>,
    name_group: usize,
}

impl ProjectRule {
    /// Creates a rule from a regex pattern and capture-group indices.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error for an invalid pattern.
    pub fn new(
        pattern: &str,
        folder_group: usize,
        id_group: Option<usize>,
        name_group: usize,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            folder_group,
            id_group,
            name_group,
        })
    }
}

/// Resolves file paths to project identities via an ordered rule list.
///
/// Rules are evaluated in order against the normalized path; the first
/// match wins. New path conventions are added by extending the rule
/// list, never by touching the coordinator.
///
/// # Examples
///
/// ```
/// use cadwatch_companion::project::ProjectPathResolver;
///
/// let resolver = ProjectPathResolver::new();
/// let info = resolver.resolve(r"\\srv\projetos\2025_PROJ_466_Bomba_Hidraulica\2_Montagem\a.iam");
/// assert!(info.is_valid_project);
/// assert_eq!(info.project_id, "466");
/// assert_eq!(info.display_name, "Bomba Hidraulica");
/// ```
#[derive(Debug, Clone)]
pub struct ProjectPathResolver {
    rules: Vec<ProjectRule>,
}

impl Default for ProjectPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectPathResolver {
    /// Creates a resolver with the default rule set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Creates a resolver with a custom ordered rule list.
    #[must_use]
    pub fn with_rules(rules: Vec<ProjectRule>) -> Self {
        Self { rules }
    }

    /// Resolves a file path to its project identity.
    ///
    /// Pure and deterministic: identical inputs always yield identical
    /// results. Returns [`ProjectInfo::invalid`] when no rule matches.
    #[must_use]
    pub fn resolve(&self, file_path: &str) -> ProjectInfo {
        let normalized = normalize_path(file_path);

        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(&normalized) else {
                continue;
            };

            let folder = caps
                .get(rule.folder_group)
                .map(|m| m.as_str())
                .unwrap_or_default();
            let project_id = match rule.id_group.and_then(|g| caps.get(g)) {
                Some(m) => m.as_str().to_string(),
                None => derive_project_id(folder),
            };
            let raw_name = caps
                .get(rule.name_group)
                .map(|m| m.as_str())
                .unwrap_or(folder);

            return ProjectInfo {
                project_id,
                display_name: clean_project_name(raw_name),
                folder_path: parent_of_parent(&normalized),
                phase: extract_phase(&normalized),
                is_valid_project: true,
            };
        }

        ProjectInfo::invalid()
    }
}

/// Builds the default ordered rule list.
///
/// Order matters: the most specific folder conventions come first, the
/// generic projects-root fallback last.
fn default_rules() -> Vec<ProjectRule> {
    vec![
        // 2025_PROJ_466_Bomba_Hidraulica
        ProjectRule::new(r"(?i).*/((\d{4})_PROJ_(\d+)_([^/]+))/", 1, Some(3), 4)
            .expect("valid rule"),
        // C-466_Bomba_Hidraulica
        ProjectRule::new(r"(?i).*/((C-\d+)_([^/]+))/", 1, Some(2), 3).expect("valid rule"),
        // BMW-123_Motor_Eletrico
        ProjectRule::new(r".*/(([A-Z]+-\d+)_([^/]+))/", 1, Some(2), 3).expect("valid rule"),
        // Anything directly under a projects root; id derived from digits.
        ProjectRule::new(r"(?i).*/(?:projetos?|projects?)/([^/]+)/", 1, None, 1)
            .expect("valid rule"),
    ]
}

/// Normalizes a path string for rule matching: backslashes become
/// forward slashes so UNC and Windows paths match the same rules.
fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Derives a project id from a folder token lacking an explicit id:
/// the first run of digits prefixed with `C-`, or the token itself.
#[must_use]
pub fn derive_project_id(folder: &str) -> String {
    match DIGIT_RUN.find(folder) {
        Some(m) => format!("C-{}", m.as_str()),
        None => folder.to_string(),
    }
}

/// Cleans a raw name token: underscores and dashes become spaces.
#[must_use]
pub fn clean_project_name(name: &str) -> String {
    name.replace(['_', '-'], " ").trim().to_string()
}

/// Extracts a project phase from the path segments.
///
/// A segment with a leading numeric prefix (`2_Montagem`) yields the
/// segment with the prefix stripped; otherwise keyword matching against
/// the known stage vocabulary applies; otherwise `Geral`.
#[must_use]
pub fn extract_phase(path: &str) -> String {
    for segment in normalize_path(path).split('/') {
        if PHASE_PREFIX.is_match(segment) {
            return PHASE_PREFIX.replace(segment, "").replace('_', " ");
        }

        let lower = segment.to_lowercase();
        if lower.contains("montagem") {
            return "Montagens".to_string();
        }
        if lower.contains("desenho") {
            return "Desenhos".to_string();
        }
        if lower.contains("conceitual") {
            return "Conceitual".to_string();
        }
        if lower.contains("detalhe") {
            return "Detalhamento".to_string();
        }
    }

    "Geral".to_string()
}

/// Returns the path two levels above the file, matching the folder
/// layout `<root>/<project>/<file>` where the root contains projects.
fn parent_of_parent(normalized: &str) -> String {
    let mut segments: Vec<&str> = normalized.split('/').collect();
    // Drop the file name and the immediate directory.
    segments.pop();
    segments.pop();
    segments.join("/")
}
