//! Skill loading and validation.
//!
//! Skills are YAML files in a directory, one skill per file. Loading is
//! tolerant: a file that fails to parse or validate is logged and skipped so
//! one bad skill never takes down the rest. Reload re-reads the directory
//! and atomically swaps the in-memory map; readers holding the previous
//! snapshot are unaffected.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use agentgw_core::error::SkillError;
use agentgw_core::skill::Skill;

type SkillMap = Arc<HashMap<String, Arc<Skill>>>;

/// Loads and serves immutable skill definitions.
pub struct SkillLoader {
    skills_dir: PathBuf,
    skills: RwLock<SkillMap>,
}

impl SkillLoader {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            skills: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Load every `.yaml`/`.yml` file in the skills directory, validating
    /// each against the available tool names, then atomically swap the map.
    /// Returns the number of skills loaded.
    pub fn load_all(&self, available_tools: &[String]) -> usize {
        let mut loaded: HashMap<String, Arc<Skill>> = HashMap::new();

        let entries = match std::fs::read_dir(&self.skills_dir) {
            Ok(entries) => entries,
            Err(_) => {
                warn!(dir = %self.skills_dir.display(), "Skills directory not found");
                self.swap(loaded);
                return 0;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
                !name.starts_with('_')
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml")
                    )
            })
            .collect();
        paths.sort();

        for path in paths {
            match load_skill_file(&path, available_tools, &loaded) {
                Ok(skill) => {
                    info!(skill = %skill.name, file = %path.display(), "Loaded skill");
                    loaded.insert(skill.name.clone(), Arc::new(skill));
                }
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping skill"),
            }
        }

        let count = loaded.len();
        self.swap(loaded);
        count
    }

    /// Re-read the directory. Alias of [`SkillLoader::load_all`] kept for the
    /// reload endpoint's intent.
    pub fn reload(&self, available_tools: &[String]) -> usize {
        self.load_all(available_tools)
    }

    fn swap(&self, map: HashMap<String, Arc<Skill>>) {
        *self.skills.write().expect("skill map lock poisoned") = Arc::new(map);
    }

    fn snapshot(&self) -> SkillMap {
        self.skills.read().expect("skill map lock poisoned").clone()
    }

    /// Get a loaded skill by name.
    pub fn get(&self, name: &str) -> Option<Arc<Skill>> {
        self.snapshot().get(name).cloned()
    }

    /// All loaded skills, sorted by name.
    pub fn list(&self) -> Vec<Arc<Skill>> {
        let mut skills: Vec<Arc<Skill>> = self.snapshot().values().cloned().collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    /// Loaded skill names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(name)
    }
}

fn load_skill_file(
    path: &Path,
    available_tools: &[String],
    already_loaded: &HashMap<String, Arc<Skill>>,
) -> Result<Skill, SkillError> {
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string();

    let content = std::fs::read_to_string(path).map_err(|e| SkillError::Invalid {
        file: file.clone(),
        reason: format!("read failed: {e}"),
    })?;

    let skill: Skill = serde_yaml::from_str(&content).map_err(|e| SkillError::Invalid {
        file: file.clone(),
        reason: format!("parse failed: {e}"),
    })?;

    validate_skill(&skill, &file, available_tools, already_loaded)?;
    Ok(skill)
}

/// Validation rules: identifier name, no duplicates, known tools, sane
/// temperature/iteration/top_k bounds. Unknown sub-agents are a warning, not
/// an error — the runtime gate on delegation is depth, not that list.
fn validate_skill(
    skill: &Skill,
    file: &str,
    available_tools: &[String],
    already_loaded: &HashMap<String, Arc<Skill>>,
) -> Result<(), SkillError> {
    let invalid = |reason: String| SkillError::Invalid {
        file: file.to_string(),
        reason,
    };

    if skill.name.is_empty() {
        return Err(invalid("name must not be empty".into()));
    }
    if !skill
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid(format!("name '{}' is not an identifier", skill.name)));
    }
    if already_loaded.contains_key(&skill.name) {
        return Err(SkillError::DuplicateName(skill.name.clone()));
    }
    if skill.description.is_empty() {
        return Err(invalid("description must not be empty".into()));
    }
    if skill.system_prompt.is_empty() {
        return Err(invalid("system_prompt must not be empty".into()));
    }
    if !(0.0..=2.0).contains(&skill.temperature) {
        return Err(invalid(format!(
            "temperature {} outside [0, 2]",
            skill.temperature
        )));
    }
    if skill.max_iterations == 0 {
        return Err(invalid("max_iterations must be positive".into()));
    }

    let unknown: Vec<&str> = skill
        .tools
        .iter()
        .filter(|t| !available_tools.contains(t))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(invalid(format!("unknown tools: {}", unknown.join(", "))));
    }

    for sub in &skill.sub_agents {
        if !already_loaded.contains_key(sub) && sub != &skill.name {
            warn!(skill = %skill.name, sub_agent = %sub, "sub_agent not loaded (yet); delegation will fail if it stays unknown");
        }
    }

    if let Some(rag) = &skill.rag_context {
        if rag.top_k == 0 {
            return Err(invalid("rag_context.top_k must be positive".into()));
        }
    }

    Ok(())
}
