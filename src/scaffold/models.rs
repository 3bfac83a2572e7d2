use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Web stack every generated project targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    /// Next.js App Router + TypeScript + Tailwind CSS
    #[default]
    NextJs,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextJs => "nextjs",
        }
    }

    /// Natural-language description embedded in prompts.
    pub fn stack_description(&self) -> &'static str {
        match self {
            Self::NextJs => {
                "Next.js 14 with the App Router, TypeScript, Tailwind CSS and \
                 shadcn/ui components (imported from \"@/components/ui/*\"), \
                 lucide-react icons and the cn() helper from \"@/lib/utils\""
            }
        }
    }
}

/// One generation run's immutable inputs plus the plan, once chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContext {
    description: String,
    files: Option<Vec<String>>,
    framework: Framework,
}

impl ProjectContext {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            files: None,
            framework: Framework::default(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn framework(&self) -> Framework {
        self.framework
    }

    /// Planned file paths, in generation order.
    pub fn files(&self) -> &[String] {
        self.files.as_deref().unwrap_or(&[])
    }

    /// Record the plan. Only the first call takes effect.
    pub fn set_files(&mut self, files: Vec<String>) -> bool {
        if self.files.is_some() {
            return false;
        }
        self.files = Some(files);
        true
    }
}

/// A file held in the staging store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagedFile {
    pub path: String,
    pub content: String,
    pub complete: bool,
}

/// Coarse lifecycle of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Generating,
    Building,
    Complete,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Building => "building",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match (self, next) {
            (Self::Idle, Self::Generating) => true,
            (Self::Generating, Self::Building) => true,
            (Self::Building, Self::Complete) => true,
            (from, Self::Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "generating" => Ok(Self::Generating),
            "building" => Ok(Self::Building),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

/// Final summary of a run, returned by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub sandbox_id: Option<String>,
    pub url: Option<String>,
    pub files: Vec<String>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_transitions() {
        assert!(RunStatus::Idle.can_transition_to(RunStatus::Generating));
        assert!(RunStatus::Generating.can_transition_to(RunStatus::Building));
        assert!(RunStatus::Building.can_transition_to(RunStatus::Complete));
        assert!(RunStatus::Idle.can_transition_to(RunStatus::Error));
        assert!(RunStatus::Building.can_transition_to(RunStatus::Error));

        assert!(!RunStatus::Idle.can_transition_to(RunStatus::Complete));
        assert!(!RunStatus::Complete.can_transition_to(RunStatus::Error));
        assert!(!RunStatus::Error.can_transition_to(RunStatus::Generating));
    }

    #[test]
    fn test_run_status_roundtrip_str() {
        for status in [
            RunStatus::Idle,
            RunStatus::Generating,
            RunStatus::Building,
            RunStatus::Complete,
            RunStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("done".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_run_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::Generating).unwrap();
        assert_eq!(json, "\"generating\"");
    }

    #[test]
    fn test_project_context_plan_set_once() {
        let mut ctx = ProjectContext::new("A blog");
        assert!(ctx.files().is_empty());
        assert!(ctx.set_files(vec!["app/page.tsx".into()]));
        assert!(!ctx.set_files(vec!["other.tsx".into()]));
        assert_eq!(ctx.files(), ["app/page.tsx".to_string()]);
        assert_eq!(ctx.framework(), Framework::NextJs);
        assert_eq!(ctx.description(), "A blog");
    }
}
