use std::collections::HashSet;

use anyhow::{Context, Result};
use serde_json::Value;

use super::models::ProjectContext;
use super::prompts;
use super::templates;
use crate::llm::TextGenerator;
use crate::util::{extract_json_array, strip_code_fences};

/// Files every fallback plan starts with.
const BASELINE_FILES: &[&str] = &[
    "app/layout.tsx",
    "app/page.tsx",
    "app/globals.css",
    "components/header.tsx",
    "components/footer.tsx",
];

/// Keyword-triggered additions. Every matching group applies.
const KEYWORD_FILES: &[(&[&str], &[&str])] = &[
    (
        &["dashboard", "admin"],
        &[
            "app/dashboard/page.tsx",
            "components/dashboard/sidebar.tsx",
            "components/dashboard/stats-card.tsx",
        ],
    ),
    (
        &["blog"],
        &[
            "app/blog/page.tsx",
            "app/blog/[slug]/page.tsx",
            "components/blog/post-card.tsx",
        ],
    ),
    (
        &["shop", "ecommerce", "e-commerce", "store"],
        &[
            "app/products/page.tsx",
            "components/shop/product-card.tsx",
            "components/shop/cart.tsx",
        ],
    ),
];

/// Added when no keyword matches.
const DEFAULT_EXTRA_FILES: &[&str] = &[
    "app/about/page.tsx",
    "components/hero.tsx",
    "components/features.tsx",
];

/// How a plan was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub files: Vec<String>,
    pub source: PlanSource,
}

impl Plan {
    /// Parse a model response into a plan, or `None` when unusable.
    ///
    /// Accepts a bare or fenced JSON array, or an array embedded in prose.
    /// Non-string entries are dropped; paths are normalized, de-duplicated
    /// and capped at `max_files`.
    pub fn parse(response: &str, max_files: usize) -> Option<Vec<String>> {
        let cleaned = strip_code_fences(response);
        let value = match serde_json::from_str::<Value>(cleaned.trim()) {
            Ok(value) => value,
            // Valid JSON of the wrong shape is not searched further
            Err(_) => serde_json::from_str(&extract_json_array(&cleaned)?).ok()?,
        };
        let items = value.as_array()?;

        let mut seen = HashSet::new();
        let files: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(normalize_path)
            .filter(|p| seen.insert(p.clone()))
            .take(max_files)
            .collect();

        (!files.is_empty()).then_some(files)
    }

    /// Deterministic plan depending only on keywords in the description,
    /// capped at `max_files` like a model plan.
    pub fn fallback(description: &str, max_files: usize) -> Vec<String> {
        let lower = description.to_lowercase();
        let mut files: Vec<String> = BASELINE_FILES.iter().map(|s| s.to_string()).collect();

        let mut matched = false;
        for (keywords, extra) in KEYWORD_FILES {
            if keywords.iter().any(|k| lower.contains(k)) {
                matched = true;
                files.extend(extra.iter().map(|s| s.to_string()));
            }
        }
        if !matched {
            files.extend(DEFAULT_EXTRA_FILES.iter().map(|s| s.to_string()));
        }
        files.truncate(max_files);
        files
    }
}

/// Trim, drop leading "./" and "/", reject empties and parent traversal.
fn normalize_path(raw: &str) -> Option<String> {
    let mut path = raw.trim();
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            break;
        }
    }
    if path.is_empty() || path.split('/').any(|seg| seg == "..") {
        return None;
    }
    Some(path.to_string())
}

/// Turns the description into the ordered list of files to generate.
pub struct Planner<'a> {
    generator: &'a dyn TextGenerator,
    max_files: usize,
}

impl<'a> Planner<'a> {
    pub fn new(generator: &'a dyn TextGenerator, max_files: usize) -> Self {
        Self {
            generator,
            max_files,
        }
    }

    /// Choose the plan and record it on the context.
    ///
    /// Only a failing generation call is an error; an unusable response
    /// falls back to [`Plan::fallback`].
    pub async fn plan(&self, ctx: &mut ProjectContext) -> Result<Plan> {
        let prompt = prompts::plan_prompt(ctx, &templates::provisioned_paths(), self.max_files);
        let response = self
            .generator
            .generate_structured(&prompt)
            .await
            .context("Failed to generate the file plan")?;

        let plan = match Plan::parse(&response, self.max_files) {
            Some(files) => Plan {
                files,
                source: PlanSource::Model,
            },
            None => {
                tracing::warn!(
                    response = %crate::util::truncate_chars(&response, 300),
                    "Unusable plan response, using fallback"
                );
                Plan {
                    files: Plan::fallback(ctx.description(), self.max_files),
                    source: PlanSource::Fallback,
                }
            }
        };

        if !ctx.set_files(plan.files.clone()) {
            tracing::warn!("Plan already recorded, keeping the first one");
        }
        Ok(plan)
    }
}
