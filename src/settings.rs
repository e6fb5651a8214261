//! On-disk settings store.
//!
//! A flat JSON file holding everything a deployment tunes between runs:
//! matching rules, asset paths, recognition credentials, operator identity.
//! Missing keys are backfilled with defaults on load and the file is
//! rewritten, so upgrading never requires hand-editing.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{
    HeaderStampRule, LogoAddRule, LogoSwapRule, PipelineConfig, RedactionRule, SubtitleRule,
    TitleRewriteRule,
};
use crate::error::RestampError;
use crate::pipeline::geometry::{MatchPredicate, PageExemption};

/// Credentials and endpoints for the recognition backend. All blank by
/// default; the score-chart step is skipped until they are filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionSettings {
    #[serde(default)]
    pub token_endpoint: String,
    #[serde(default)]
    pub recognition_endpoint: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub project: String,
}

impl RecognitionSettings {
    pub fn is_configured(&self) -> bool {
        !self.token_endpoint.is_empty()
            && !self.recognition_endpoint.is_empty()
            && !self.username.is_empty()
            && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub operator_id: String,
    #[serde(default)]
    pub operator_name: String,
    #[serde(default)]
    pub region_code: String,

    #[serde(default = "defaults::title_prefix")]
    pub title_prefix: String,
    #[serde(default)]
    pub title_replacement: String,
    #[serde(default = "defaults::title_font_size")]
    pub title_font_size: f32,

    #[serde(default)]
    pub subtitle_anchor: String,
    #[serde(default)]
    pub subtitle_text: String,

    /// Prefixes of contact blocks covered on every page.
    #[serde(default)]
    pub contact_prefixes: Vec<String>,
    /// Keywords whose blocks are covered on every page.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exemptions: Vec<PageExemption>,

    #[serde(default)]
    pub logo_swap_path: String,
    #[serde(default)]
    pub logo_add_path: String,
    #[serde(default)]
    pub font_path: String,
    #[serde(default)]
    pub image_dir: String,

    #[serde(default)]
    pub recognition: RecognitionSettings,
}

mod defaults {
    pub fn title_prefix() -> String {
        String::new()
    }

    pub fn title_font_size() -> f32 {
        16.0
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            operator_id: String::new(),
            operator_name: String::new(),
            region_code: String::new(),
            title_prefix: defaults::title_prefix(),
            title_replacement: String::new(),
            title_font_size: defaults::title_font_size(),
            subtitle_anchor: String::new(),
            subtitle_text: String::new(),
            contact_prefixes: Vec::new(),
            keywords: Vec::new(),
            exemptions: Vec::new(),
            logo_swap_path: String::new(),
            logo_add_path: String::new(),
            font_path: String::new(),
            image_dir: String::new(),
            recognition: RecognitionSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, creating or backfilling the file as needed.
    ///
    /// A missing file yields defaults; a present file has any missing keys
    /// filled in. Either way the file on disk ends up complete.
    pub fn load_or_default(path: &Path) -> Result<Self, RestampError> {
        let settings = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|e| {
                RestampError::InvalidConfig(format!(
                    "cannot read settings file {}: {e}",
                    path.display()
                ))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                RestampError::InvalidConfig(format!(
                    "malformed settings file {}: {e}",
                    path.display()
                ))
            })?
        } else {
            debug!(path = %path.display(), "settings file absent, writing defaults");
            Settings::default()
        };
        settings.save(path)?;
        Ok(settings)
    }

    /// Whole-file rewrite.
    pub fn save(&self, path: &Path) -> Result<(), RestampError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| RestampError::OutputDirFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| RestampError::Internal(format!("settings serialization: {e}")))?;
        fs::write(path, raw).map_err(|e| {
            RestampError::InvalidConfig(format!(
                "cannot write settings file {}: {e}",
                path.display()
            ))
        })?;
        Ok(())
    }

    /// Build a pipeline configuration from these settings.
    ///
    /// Services are attached separately by the caller; empty or blank
    /// settings leave the corresponding rule unset so the step is skipped.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new();

        if !self.title_prefix.is_empty() && !self.title_replacement.is_empty() {
            config = config.with_title_rewrite(TitleRewriteRule {
                prefix: self.title_prefix.clone(),
                replacement: self.title_replacement.clone(),
                font_size: self.title_font_size,
                offsets: Default::default(),
            });
        }

        if !self.subtitle_anchor.is_empty() && !self.subtitle_text.is_empty() {
            config = config.with_subtitle(SubtitleRule::new(
                self.subtitle_anchor.clone(),
                self.subtitle_text.clone(),
            ));
        }

        for prefix in &self.contact_prefixes {
            config = config.with_contact_rule(RedactionRule {
                predicate: MatchPredicate::Prefix(prefix.clone()),
                page_index: None,
            });
        }

        if !self.keywords.is_empty() {
            config = config.with_keyword_rule(RedactionRule {
                predicate: MatchPredicate::KeywordSet {
                    keywords: self.keywords.clone(),
                    exemptions: self.exemptions.clone(),
                },
                page_index: None,
            });
        }

        if !self.region_code.is_empty() {
            config = config.with_header_stamp(HeaderStampRule::default());
        }

        if !self.logo_swap_path.is_empty() {
            config = config.with_logo_swap(LogoSwapRule::new(&self.logo_swap_path));
        }
        if !self.logo_add_path.is_empty() {
            config = config.with_logo_add(LogoAddRule::new(&self.logo_add_path));
        }
        if !self.font_path.is_empty() {
            config = config.with_font_path(&self.font_path);
        }

        config
    }
}
