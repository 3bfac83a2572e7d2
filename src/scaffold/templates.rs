//! Fixed files seeded into every environment before generation output lands.

/// A file written verbatim into the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedFile {
    pub path: &'static str,
    pub content: &'static str,
}

/// Namespace of the pre-built UI component library.
pub const UI_NAMESPACE: &str = "components/ui/";

/// Project configuration: manifest, type-checker, style framework, bundler
/// and the shared utility module.
pub const CONFIG_FILES: &[SeedFile] = &[
    SeedFile {
        path: "package.json",
        content: include_str!("../../assets/seed/package.json"),
    },
    SeedFile {
        path: "tsconfig.json",
        content: include_str!("../../assets/seed/tsconfig.json"),
    },
    SeedFile {
        path: "tailwind.config.ts",
        content: include_str!("../../assets/seed/tailwind.config.ts"),
    },
    SeedFile {
        path: "postcss.config.js",
        content: include_str!("../../assets/seed/postcss.config.js"),
    },
    SeedFile {
        path: "next.config.js",
        content: include_str!("../../assets/seed/next.config.js"),
    },
    SeedFile {
        path: "lib/utils.ts",
        content: include_str!("../../assets/seed/lib/utils.ts"),
    },
    SeedFile {
        path: "components.json",
        content: include_str!("../../assets/seed/components.json"),
    },
];

/// Pre-built UI components under [`UI_NAMESPACE`].
pub const UI_COMPONENTS: &[SeedFile] = &[
    SeedFile {
        path: "components/ui/button.tsx",
        content: include_str!("../../assets/ui/button.tsx"),
    },
    SeedFile {
        path: "components/ui/card.tsx",
        content: include_str!("../../assets/ui/card.tsx"),
    },
    SeedFile {
        path: "components/ui/input.tsx",
        content: include_str!("../../assets/ui/input.tsx"),
    },
    SeedFile {
        path: "components/ui/badge.tsx",
        content: include_str!("../../assets/ui/badge.tsx"),
    },
    SeedFile {
        path: "components/ui/textarea.tsx",
        content: include_str!("../../assets/ui/textarea.tsx"),
    },
    SeedFile {
        path: "components/ui/label.tsx",
        content: include_str!("../../assets/ui/label.tsx"),
    },
    SeedFile {
        path: "components/ui/separator.tsx",
        content: include_str!("../../assets/ui/separator.tsx"),
    },
];

/// Whether a path is supplied by seeding and must not be generated.
pub fn is_provisioned(path: &str) -> bool {
    path.starts_with(UI_NAMESPACE) || CONFIG_FILES.iter().any(|f| f.path == path)
}

/// Paths listed to the planner as already present.
pub fn provisioned_paths() -> Vec<&'static str> {
    CONFIG_FILES
        .iter()
        .chain(UI_COMPONENTS.iter())
        .map(|f| f.path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_files_are_provisioned() {
        assert!(is_provisioned("package.json"));
        assert!(is_provisioned("lib/utils.ts"));
        assert!(is_provisioned("tailwind.config.ts"));
    }

    #[test]
    fn test_ui_namespace_is_provisioned() {
        assert!(is_provisioned("components/ui/button.tsx"));
        // Anything under the namespace, not only the shipped catalog
        assert!(is_provisioned("components/ui/dialog.tsx"));
    }

    #[test]
    fn test_generated_paths_are_not_provisioned() {
        assert!(!is_provisioned("app/page.tsx"));
        assert!(!is_provisioned("components/header.tsx"));
        assert!(!is_provisioned("lib/data.ts"));
        assert!(!is_provisioned("app/package.json"));
    }

    #[test]
    fn test_seed_files_are_non_empty_and_unique() {
        let paths = provisioned_paths();
        let mut dedup = paths.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), paths.len());
        for file in CONFIG_FILES.iter().chain(UI_COMPONENTS) {
            assert!(!file.content.trim().is_empty(), "{} is empty", file.path);
        }
    }

    #[test]
    fn test_package_json_has_dev_script() {
        let manifest: serde_json::Value =
            serde_json::from_str(CONFIG_FILES[0].content).unwrap();
        assert!(manifest["scripts"]["dev"].as_str().unwrap().contains("3000"));
    }
}
