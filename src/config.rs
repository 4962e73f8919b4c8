//! Engine configuration
//!
//! Defaults are tuned for a phone-sized reader. `EngineConfig::from_env`
//! overrides them from `READER_*` environment variables.

use std::env;

use serde::Deserialize;

use crate::document::DEFAULT_RENDER_CACHE_CAPACITY;

/// Default context radius (characters) for EPUB/PDF search snippets
pub const DEFAULT_SNIPPET_RADIUS: usize = 50;
/// Default number of lines shown either side of a TXT search hit
pub const DEFAULT_CONTEXT_LINES: usize = 2;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub render: RenderConfig,
    pub search: SearchConfig,
    pub txt: TxtConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum rendered PDF pages kept in memory
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Characters of context either side of an EPUB/PDF match
    pub snippet_radius: usize,
    /// Lines of context either side of a TXT match
    pub context_lines: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TxtConfig {
    /// Fail with `EncodingUndetectable` instead of falling back to UTF-8
    pub strict_charset: bool,
    pub chapter_detection: ChapterDetection,
}

/// How TXT files are split into chapters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "pattern")]
pub enum ChapterDetection {
    /// Built-in heading families
    Default,
    /// Whole file is one chapter
    Disabled,
    /// Custom heading pattern tried before the built-in families
    Custom(String),
}

impl Default for ChapterDetection {
    fn default() -> Self {
        ChapterDetection::Default
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            cache_capacity: DEFAULT_RENDER_CACHE_CAPACITY,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            snippet_radius: DEFAULT_SNIPPET_RADIUS,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

impl Default for TxtConfig {
    fn default() -> Self {
        TxtConfig {
            strict_charset: false,
            chapter_detection: ChapterDetection::Default,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            render: RenderConfig::default(),
            search: SearchConfig::default(),
            txt: TxtConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `READER_*` environment variables
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();

        let chapter_detection = match env::var("READER_TXT_CHAPTERS")
            .unwrap_or_else(|_| "default".to_string())
            .to_lowercase()
            .as_str()
        {
            "disabled" | "off" | "none" => ChapterDetection::Disabled,
            "custom" => match env::var("READER_TXT_HEADING_PATTERN") {
                Ok(pattern) if !pattern.is_empty() => ChapterDetection::Custom(pattern),
                _ => ChapterDetection::Default,
            },
            _ => ChapterDetection::Default,
        };

        EngineConfig {
            render: RenderConfig {
                cache_capacity: parse_var("READER_RENDER_CACHE_CAPACITY")
                    .unwrap_or(defaults.render.cache_capacity),
            },
            search: SearchConfig {
                snippet_radius: parse_var("READER_SNIPPET_RADIUS")
                    .unwrap_or(defaults.search.snippet_radius),
                context_lines: parse_var("READER_CONTEXT_LINES")
                    .unwrap_or(defaults.search.context_lines),
            },
            txt: TxtConfig {
                strict_charset: parse_var("READER_STRICT_CHARSET")
                    .unwrap_or(defaults.txt.strict_charset),
                chapter_detection,
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok()?.trim().parse().ok()
}
