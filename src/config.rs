//! Pipeline configuration.
//!
//! Every empirically tuned constant of the pipeline lives here as a policy
//! default rather than a magic number at the call site, so a deployment can
//! adjust them without touching step code. Steps whose rule is `None` report
//! `Skipped` instead of failing.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RestampError;
use crate::pipeline::geometry::MatchPredicate;
use crate::pipeline::rewrite::InsertPosition;
use crate::services::{ChartRenderer, RecognitionService};

/// A block-covering rule: which blocks, on which pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionRule {
    pub predicate: MatchPredicate,
    /// `None` means every page.
    pub page_index: Option<usize>,
}

/// Empirical rect adjustments applied before covering the title block.
///
/// The stock report titles carry decorative elements the block bounds
/// include; these offsets were measured against the real layouts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TitleRewriteOffsets {
    pub left_inset: f32,
    pub right_trim: f32,
    pub vertical_nudge: f32,
}

impl Default for TitleRewriteOffsets {
    fn default() -> Self {
        Self {
            left_inset: 21.0,
            right_trim: 400.0,
            vertical_nudge: 2.0,
        }
    }
}

/// Replace the first block on page 0 whose text starts with `prefix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRewriteRule {
    pub prefix: String,
    pub replacement: String,
    pub font_size: f32,
    #[serde(default)]
    pub offsets: TitleRewriteOffsets,
}

/// Insert a line of text next to the first block containing `anchor_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleRule {
    pub anchor_text: String,
    pub text: String,
    pub page_index: usize,
    pub font_size: f32,
    /// Gap between the anchor block's edge and the inserted line.
    pub spacing: f32,
    /// Which side of the anchor block the line lands on.
    #[serde(default)]
    pub position: InsertPosition,
}

impl SubtitleRule {
    pub fn new(anchor_text: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            anchor_text: anchor_text.into(),
            text: text.into(),
            page_index: 1,
            font_size: 9.0,
            spacing: 5.0,
            position: InsertPosition::Below,
        }
    }
}

/// Stamp a small tracking code into every page header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderStampRule {
    pub top_margin: f32,
    pub right_margin: f32,
    pub font_size: f32,
    /// 0..=1 per channel.
    pub color: (f32, f32, f32),
    /// Fixed code for reproducible output; `None` generates six random
    /// digits once per document.
    pub fixed_code: Option<String>,
}

impl Default for HeaderStampRule {
    fn default() -> Self {
        Self {
            top_margin: 20.0,
            right_margin: 75.0,
            font_size: 8.0,
            color: (0.7, 0.7, 0.7),
            fixed_code: None,
        }
    }
}

/// Replace the first image found inside the page's top-left corner region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoSwapRule {
    pub image_path: PathBuf,
    /// Placements qualify when their top-left corner lies inside this region.
    pub region_max_x: f32,
    pub region_max_y: f32,
    pub scale: f32,
}

impl LogoSwapRule {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            region_max_x: 100.0,
            region_max_y: 100.0,
            scale: 1.2,
        }
    }
}

/// Insert a logo at a fixed rect near the page's top-right corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoAddRule {
    pub image_path: PathBuf,
    pub margin_x: f32,
    pub margin_y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl LogoAddRule {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            margin_x: 10.0,
            margin_y: 0.0,
            width: 80.0,
            height: 80.0,
            scale: 0.8,
        }
    }
}

/// Locate the score chart image, read its score via OCR, and replace it with
/// a freshly rendered chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreChartRule {
    pub page_index: usize,
    /// 0-based position among the page's image objects.
    pub image_ordinal: usize,
    /// Enlargement factor for the replacement chart.
    pub scale: f32,
    /// Downward shift of the replacement's centre, in points.
    pub vertical_offset: f32,
}

impl Default for ScoreChartRule {
    fn default() -> Self {
        Self {
            page_index: 1,
            image_ordinal: 1,
            scale: 3.3,
            vertical_offset: 15.0,
        }
    }
}

/// Full pipeline configuration. Built with the `with_*` methods:
///
/// ```no_run
/// use restamp::config::{PipelineConfig, TitleRewriteRule, TitleRewriteOffsets};
///
/// let config = PipelineConfig::new()
///     .with_title_rewrite(TitleRewriteRule {
///         prefix: "Enterprise Credit Report".into(),
///         replacement: "Partner Credit Report".into(),
///         font_size: 16.0,
///         offsets: TitleRewriteOffsets::default(),
///     })
///     .with_font_path("assets/simhei.ttf");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Margin added around covered blocks so no fringe stays visible.
    pub redaction_expand: f32,
    /// One rule per contact pattern; the step runs them all in one pass.
    pub contact_rules: Vec<RedactionRule>,
    pub keyword_rule: Option<RedactionRule>,
    pub title_rewrite: Option<TitleRewriteRule>,
    pub subtitle: Option<SubtitleRule>,
    pub header_stamp: Option<HeaderStampRule>,
    pub logo_swap: Option<LogoSwapRule>,
    pub logo_add: Option<LogoAddRule>,
    pub score_chart: Option<ScoreChartRule>,
    /// Primary TrueType font for inserted text; falls back to Helvetica when
    /// missing or unloadable.
    pub font_path: Option<PathBuf>,
    pub recognition_service: Option<Arc<dyn RecognitionService>>,
    pub chart_renderer: Option<Arc<dyn ChartRenderer>>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contact_rule(mut self, rule: RedactionRule) -> Self {
        self.contact_rules.push(rule);
        self
    }

    pub fn with_keyword_rule(mut self, rule: RedactionRule) -> Self {
        self.keyword_rule = Some(rule);
        self
    }

    pub fn with_title_rewrite(mut self, rule: TitleRewriteRule) -> Self {
        self.title_rewrite = Some(rule);
        self
    }

    pub fn with_subtitle(mut self, rule: SubtitleRule) -> Self {
        self.subtitle = Some(rule);
        self
    }

    pub fn with_header_stamp(mut self, rule: HeaderStampRule) -> Self {
        self.header_stamp = Some(rule);
        self
    }

    pub fn with_logo_swap(mut self, rule: LogoSwapRule) -> Self {
        self.logo_swap = Some(rule);
        self
    }

    pub fn with_logo_add(mut self, rule: LogoAddRule) -> Self {
        self.logo_add = Some(rule);
        self
    }

    pub fn with_score_chart(mut self, rule: ScoreChartRule) -> Self {
        self.score_chart = Some(rule);
        self
    }

    pub fn with_font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn with_recognition_service(mut self, svc: Arc<dyn RecognitionService>) -> Self {
        self.recognition_service = Some(svc);
        self
    }

    pub fn with_chart_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.chart_renderer = Some(renderer);
        self
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), RestampError> {
        if self.redaction_expand < 0.0 {
            return Err(RestampError::InvalidConfig(
                "redaction_expand must be non-negative".into(),
            ));
        }
        if let Some(rule) = &self.logo_swap {
            if rule.scale <= 0.0 {
                return Err(RestampError::InvalidConfig(
                    "logo_swap.scale must be positive".into(),
                ));
            }
        }
        if let Some(rule) = &self.score_chart {
            if rule.scale <= 0.0 {
                return Err(RestampError::InvalidConfig(
                    "score_chart.scale must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            redaction_expand: 2.0,
            contact_rules: Vec::new(),
            keyword_rule: None,
            title_rewrite: None,
            subtitle: None,
            header_stamp: None,
            logo_swap: None,
            logo_add: None,
            score_chart: None,
            font_path: None,
            recognition_service: None,
            chart_renderer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("redaction_expand", &self.redaction_expand)
            .field("contact_rules", &self.contact_rules)
            .field("keyword_rule", &self.keyword_rule)
            .field("title_rewrite", &self.title_rewrite)
            .field("subtitle", &self.subtitle)
            .field("header_stamp", &self.header_stamp)
            .field("logo_swap", &self.logo_swap)
            .field("logo_add", &self.logo_add)
            .field("score_chart", &self.score_chart)
            .field("font_path", &self.font_path)
            .field("recognition_service", &self.recognition_service.is_some())
            .field("chart_renderer", &self.chart_renderer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_skip_everything() {
        let config = PipelineConfig::new();
        assert_eq!(config.redaction_expand, 2.0);
        assert!(config.contact_rules.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_expand_is_rejected() {
        let mut config = PipelineConfig::new();
        config.redaction_expand = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn contact_rules_accumulate() {
        let config = PipelineConfig::new()
            .with_contact_rule(RedactionRule {
                predicate: MatchPredicate::Prefix("Contact".into()),
                page_index: None,
            })
            .with_contact_rule(RedactionRule {
                predicate: MatchPredicate::Prefix("Tel".into()),
                page_index: None,
            });
        assert_eq!(config.contact_rules.len(), 2);
    }
}
