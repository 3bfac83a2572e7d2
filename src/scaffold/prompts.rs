//! Prompt texts for planning and per-file generation.

use super::models::ProjectContext;

const PLAN_PROMPT: &str = r#"You are a senior web engineer planning the files of a new project.

Target stack: {stack}

Project description:
{description}

The following files already exist and MUST NOT be listed:
{provisioned}

Respond with a JSON array of relative file paths only (no markdown, no explanation), e.g.
["app/layout.tsx", "app/page.tsx", "app/globals.css", "components/header.tsx"]

Rules:
- Always include app/layout.tsx, app/page.tsx and app/globals.css.
- Use the App Router: every route is app/<route>/page.tsx.
- Put reusable sections under components/<area>/*.tsx.
- Put static data and helpers under lib/*.ts.
- List at most {max_files} files, most fundamental first.
"#;

const FILE_RULES: &str = r#"Rules:
- Output ONLY the file content. No markdown fences, no explanation.
- Use TypeScript and Tailwind CSS classes.
- Import UI primitives from "@/components/ui/<name>" and cn() from "@/lib/utils".
- Only import project files that appear in the file list above.
- Use realistic placeholder content, never lorem ipsum."#;

/// Which prompt family a path falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    RootLayout,
    Page,
    Component,
    Stylesheet,
    Generic,
}

impl FileRole {
    /// Classify by suffix/prefix, most specific first.
    pub fn for_path(path: &str) -> Self {
        if path == "app/layout.tsx" {
            Self::RootLayout
        } else if path.ends_with("/page.tsx") {
            Self::Page
        } else if path.starts_with("components/") {
            Self::Component
        } else if path.ends_with(".css") {
            Self::Stylesheet
        } else {
            Self::Generic
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            Self::RootLayout => {
                "Write the layout. Import \"./globals.css\", export `metadata` with a \
                 fitting title and description, and render shared chrome (header, footer) \
                 from the planned components around {children}. Use the Inter font from \
                 next/font/google."
            }
            Self::Page => {
                "Write a page component as the default export. Keep it a server component \
                 unless it needs state or event handlers, in which case start with \
                 \"use client\". Compose it from the planned components."
            }
            Self::Component => {
                "Write a reusable React component with a typed props interface. Export it \
                 as a named export. Add \"use client\" only when it uses hooks or handlers."
            }
            Self::Stylesheet => {
                "Write the global stylesheet. Start with the @tailwind base, components and \
                 utilities directives, then define the shadcn CSS variables (--background, \
                 --foreground, --primary, --secondary, --muted, --accent, --destructive, \
                 --card, --border, --input, --ring, --radius) for :root and .dark inside \
                 @layer base."
            }
            Self::Generic => {
                "Write this file so it fits the project and is consistent with how the \
                 other planned files would use it."
            }
        }
    }
}

/// Prompt asking for the ordered file list.
pub fn plan_prompt(ctx: &ProjectContext, provisioned: &[&str], max_files: usize) -> String {
    // User text goes in last so placeholders inside it stay literal
    PLAN_PROMPT
        .replace("{stack}", ctx.framework().stack_description())
        .replace("{provisioned}", &bullet_list(provisioned.iter().copied()))
        .replace("{max_files}", &max_files.to_string())
        .replace("{description}", ctx.description())
}

/// Prompt for generating one file, chosen by its path.
pub fn file_prompt(ctx: &ProjectContext, path: &str) -> String {
    let role = FileRole::for_path(path);
    let siblings = bullet_list(ctx.files().iter().map(String::as_str).filter(|p| *p != path));
    format!(
        "You are writing one file of a {stack} project.\n\n\
         Project description:\n{description}\n\n\
         Files in this project:\n{siblings}\n\n\
         File to write: {path}\n\n\
         {instructions}\n\n\
         {rules}\n",
        stack = ctx.framework().stack_description(),
        description = ctx.description(),
        siblings = siblings,
        path = path,
        instructions = role.instructions(),
        rules = FILE_RULES,
    )
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<String> = items.map(|p| format!("- {}", p)).collect();
    if lines.is_empty() {
        "(none)".to_string()
    } else {
        lines.join("\n")
    }
}
