use serde::{Deserialize, Serialize};

/// What should happen to an item whose name matches a `DefinitionEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Ignore,
    Import,
    Extract,
    Expand,
}

/// One row of the definition table: a case-insensitive glob `pattern`
/// matched against an item's `name`, the `action` to take when it matches,
/// and the routing/decryption metadata that action needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionEntry {
    pub pattern: String,
    pub action: Action,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl DefinitionEntry {
    /// Case-insensitive glob match (`*` and `?` wildcards only — the
    /// definition table never needs character classes or brace
    /// expansion).
    pub fn matches(&self, name: &str) -> bool {
        glob_match_ci(&self.pattern, name)
    }
}

/// Ordered sequence of `DefinitionEntry`. First match wins; no match
/// classifies as `Ignore` (§3 of the spec).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionTable {
    pub entries: Vec<DefinitionEntry>,
}

impl DefinitionTable {
    pub fn new(entries: Vec<DefinitionEntry>) -> Self {
        DefinitionTable { entries }
    }

    /// First matching entry for `name`, or `None` if nothing matches
    /// (which the caller treats as `Action::Ignore`).
    pub fn lookup(&self, name: &str) -> Option<&DefinitionEntry> {
        self.entries.iter().find(|e| e.matches(name))
    }
}

/// Minimal glob matcher supporting `*` (any run of characters) and `?`
/// (exactly one character), case-insensitively. Implemented with a
/// classic two-pointer backtracking scan rather than pulling in a glob
/// crate for two wildcard characters. Public because the registry-find
/// spec (import-pipeline) reuses the exact same matching rule for key
/// and value name patterns.
pub fn glob_match_ci(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star_idx, mut star_match) = (None, 0usize);

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star_idx = Some(pi);
            star_match = ti;
            pi += 1;
        } else if let Some(si) = star_idx {
            pi = si + 1;
            star_match += 1;
            ti = star_match;
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }
    pi == pattern.len()
}
