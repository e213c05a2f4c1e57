//! Manifest token assertions.
//!
//! Checks run twice: against the hand-written manifest before the build and
//! against the build-merged manifest after it, so that a merge step that
//! reintroduces or drops a capability is caught.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Result, StoreprepError};
use crate::settings::ReleaseSettings;

/// A token that must be present in (or absent from) every existing candidate file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRule {
    pub candidate_paths: Vec<PathBuf>,
    pub token: String,
    pub must_be_present: bool,

    /// When false a missing candidate file satisfies the rule.
    #[serde(default)]
    pub require_file: bool,
}

impl ManifestRule {
    pub fn new(candidate_paths: Vec<PathBuf>, token: impl Into<String>, must_be_present: bool) -> Self {
        Self {
            candidate_paths,
            token: token.into(),
            must_be_present,
            require_file: false,
        }
    }

    pub fn requiring_file(mut self) -> Self {
        self.require_file = true;
        self
    }

    /// Check every candidate; the first mismatch is returned as the error.
    pub fn check(&self) -> Result<()> {
        for path in &self.candidate_paths {
            if !path.is_file() {
                if self.require_file {
                    return Err(StoreprepError::MissingInput(format!(
                        "manifest {} not found while checking '{}'",
                        path.display(),
                        self.token
                    )));
                }
                debug!(path = %path.display(), token = %self.token, "manifest absent, rule satisfied");
                continue;
            }

            let text = fs::read_to_string(path).map_err(|e| StoreprepError::io(path, e))?;
            let found = text.contains(&self.token);
            if found != self.must_be_present {
                return Err(StoreprepError::TokenMismatch {
                    token: self.token.clone(),
                    path: path.clone(),
                    expected: self.must_be_present,
                    found,
                });
            }
        }
        Ok(())
    }
}

/// Result of evaluating a set of manifest rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestVerdict {
    pub passed: bool,

    /// One message per failed rule (empty if passed).
    pub violations: Vec<String>,
}

impl ManifestVerdict {
    pub fn diagnostic(&self) -> Option<String> {
        if self.violations.is_empty() {
            None
        } else {
            Some(self.violations.join("; "))
        }
    }
}

/// Pre- and post-build manifest checks for the billing and advertising-id tokens.
#[derive(Debug, Clone)]
pub struct ManifestAssertionChecker {
    source_paths: Vec<PathBuf>,
    merged_paths: Vec<PathBuf>,
    billing_token: String,
    ad_id_token: String,
    strict_post_build: bool,
}

impl ManifestAssertionChecker {
    pub fn new(source_paths: Vec<PathBuf>, merged_paths: Vec<PathBuf>) -> Self {
        Self {
            source_paths,
            merged_paths,
            billing_token: "BILLING".to_string(),
            ad_id_token: "AD_ID".to_string(),
            strict_post_build: false,
        }
    }

    pub fn from_settings(settings: &ReleaseSettings) -> Self {
        let resolve = |paths: &[PathBuf]| -> Vec<PathBuf> {
            paths.iter().map(|p| settings.resolve(p)).collect()
        };
        Self {
            source_paths: resolve(&settings.manifest.source_paths),
            merged_paths: resolve(&settings.manifest.merged_paths),
            billing_token: settings.manifest.billing_token.clone(),
            ad_id_token: settings.manifest.ad_id_token.clone(),
            strict_post_build: settings.manifest.strict_post_build,
        }
    }

    pub fn strict_post_build(mut self, strict: bool) -> Self {
        self.strict_post_build = strict;
        self
    }

    /// Check the source-tree manifest. The billing token must be present iff
    /// `require_permission_token`; the advertising-id token must be absent.
    pub fn validate_pre_build(&self, require_permission_token: bool) -> ManifestVerdict {
        Self::evaluate(&self.rules(&self.source_paths, require_permission_token, false))
    }

    /// Same checks against the build-merged manifest.
    pub fn validate_post_build(&self, require_permission_token: bool) -> ManifestVerdict {
        Self::evaluate(&self.rules(
            &self.merged_paths,
            require_permission_token,
            self.strict_post_build,
        ))
    }

    fn rules(&self, paths: &[PathBuf], billing: bool, require_file: bool) -> Vec<ManifestRule> {
        let mut rules = vec![
            ManifestRule::new(paths.to_vec(), self.billing_token.clone(), billing),
            ManifestRule::new(paths.to_vec(), self.ad_id_token.clone(), false),
        ];
        if require_file {
            rules = rules.into_iter().map(ManifestRule::requiring_file).collect();
        }
        rules
    }

    /// Evaluate every rule; all must pass.
    pub fn evaluate(rules: &[ManifestRule]) -> ManifestVerdict {
        let mut violations = Vec::new();
        for rule in rules {
            if let Err(e) = rule.check() {
                error!(token = %rule.token, error = %e, "manifest rule failed");
                violations.push(e.to_string());
            }
        }
        ManifestVerdict {
            passed: violations.is_empty(),
            violations,
        }
    }

    pub fn source_paths(&self) -> &[PathBuf] {
        &self.source_paths
    }

    pub fn merged_paths(&self) -> &[PathBuf] {
        &self.merged_paths
    }
}
