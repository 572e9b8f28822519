//! 人设资料：启动时读取一次的两段只读文本（背景摘要 + 简历全文）
//!
//! 简历需预先导出为纯文本；缺失时以空文本继续，摘要缺失则视为配置错误。

use std::path::Path;

use crate::config::AppSection;
use crate::core::AgentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaContext {
    pub name: String,
    pub summary: String,
    pub profile: String,
}

impl PersonaContext {
    pub fn new(name: impl Into<String>, summary: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            profile: profile.into(),
        }
    }

    pub fn load(dir: &Path, name: &str, summary_file: &str, profile_file: &str) -> Result<Self, AgentError> {
        let summary_path = dir.join(summary_file);
        let summary = std::fs::read_to_string(&summary_path).map_err(|e| {
            AgentError::Persona(format!("cannot read {}: {}", summary_path.display(), e))
        })?;

        let profile_path = dir.join(profile_file);
        let profile = match std::fs::read_to_string(&profile_path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %profile_path.display(), error = %e, "profile text missing, continuing with summary only");
                String::new()
            }
        };

        tracing::info!(
            persona = %name,
            summary_chars = summary.chars().count(),
            profile_chars = profile.chars().count(),
            "persona loaded"
        );
        Ok(Self::new(name, summary.trim(), profile.trim()))
    }

    pub fn from_config(app: &AppSection) -> Result<Self, AgentError> {
        Self::load(&app.persona_dir, &app.name, &app.summary_file, &app.profile_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_both_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("summary.txt"), "  Engineer in Pune.\n").unwrap();
        std::fs::write(dir.path().join("profile.txt"), "Experience: 10 years").unwrap();
        let p = PersonaContext::load(dir.path(), "Ada", "summary.txt", "profile.txt").unwrap();
        assert_eq!(p.summary, "Engineer in Pune.");
        assert_eq!(p.profile, "Experience: 10 years");
        assert_eq!(p.name, "Ada");
    }

    #[test]
    fn test_missing_profile_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("summary.txt"), "hi").unwrap();
        let p = PersonaContext::load(dir.path(), "Ada", "summary.txt", "profile.txt").unwrap();
        assert!(p.profile.is_empty());
    }

    #[test]
    fn test_missing_summary_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PersonaContext::load(dir.path(), "Ada", "summary.txt", "profile.txt").unwrap_err();
        assert!(matches!(err, AgentError::Persona(_)));
    }
}
