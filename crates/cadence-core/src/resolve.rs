//! Merchant resolution for grouping
//!
//! Resolves raw transaction descriptions to canonical merchant analyses
//! using a priority chain: session memo cache, persistent analysis cache,
//! the regex override rule table (priority-descending, first match wins),
//! then the classification oracle. Rule and oracle results are cached since
//! the rule set changes rarely and oracle calls are expensive.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::RegexBuilder;
use tracing::{debug, warn};

use crate::db::{keys, ttl, Database};
use crate::error::{Error, Result};
use crate::models::MerchantRule;
use crate::oracle::{MerchantAnalysis, OracleBackend, OracleClient};

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Session memo or persistent analysis cache
    Cached,
    /// A merchant override rule
    Rule,
    /// The classification oracle
    Oracle,
}

/// A resolved merchant analysis plus its provenance
#[derive(Debug, Clone)]
pub struct Resolution {
    pub analysis: MerchantAnalysis,
    pub source: ResolutionSource,
}

/// Merchant resolver with rule-table overrides and per-session caching
///
/// Dependencies are injected rather than ambient so tests can drive the
/// chain with an in-memory database and a mock oracle.
pub struct MerchantResolver<'a> {
    db: &'a Database,
    oracle: Option<&'a OracleClient>,
    /// Per-session memo cache (description -> analysis)
    /// Uses Mutex for thread-safety in async contexts
    session_cache: Mutex<HashMap<String, MerchantAnalysis>>,
}

impl<'a> MerchantResolver<'a> {
    /// Create a new resolver with an optional oracle
    pub fn new(db: &'a Database, oracle: Option<&'a OracleClient>) -> Self {
        Self {
            db,
            oracle,
            session_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a description to a canonical merchant analysis
    ///
    /// Fails when no rule matches and the oracle is unavailable or returns
    /// a malformed response; callers decide whether that drops the
    /// transaction or aborts the operation.
    pub async fn resolve(&self, description: &str) -> Result<Resolution> {
        // 0. Session memo cache
        {
            let cache = self.session_cache.lock().unwrap();
            if let Some(analysis) = cache.get(description) {
                debug!(description, "Session cache hit for merchant resolution");
                return Ok(Resolution {
                    analysis: analysis.clone(),
                    source: ResolutionSource::Cached,
                });
            }
        }

        // 1. Persistent analysis cache
        let cache_key = keys::merchant_normalization(description);
        if let Some(analysis) = self.db.cache_get::<MerchantAnalysis>(&cache_key)? {
            self.memoize(description, &analysis);
            return Ok(Resolution {
                analysis,
                source: ResolutionSource::Cached,
            });
        }

        // 2. Override rules, first match by priority wins
        if let Some(analysis) = self.apply_rules(description)? {
            debug!(
                description,
                merchant = %analysis.normalized_name,
                "Override rule matched"
            );
            self.db.cache_set(&cache_key, &analysis, ttl::MEDIUM)?;
            self.memoize(description, &analysis);
            return Ok(Resolution {
                analysis,
                source: ResolutionSource::Rule,
            });
        }

        // 3. Oracle fallback
        let oracle = self.oracle.ok_or_else(|| {
            Error::Oracle(format!(
                "No rule matched '{}' and no oracle is configured",
                description
            ))
        })?;

        let analysis = oracle.classify_merchant(description).await?;
        debug!(
            description,
            merchant = %analysis.normalized_name,
            confidence = analysis.confidence,
            "Oracle resolved merchant"
        );
        self.db.cache_set(&cache_key, &analysis, ttl::MEDIUM)?;
        self.memoize(description, &analysis);

        Ok(Resolution {
            analysis,
            source: ResolutionSource::Oracle,
        })
    }

    fn memoize(&self, description: &str, analysis: &MerchantAnalysis) {
        self.session_cache
            .lock()
            .unwrap()
            .insert(description.to_string(), analysis.clone());
    }

    /// Scan the rule table for the first match
    ///
    /// An invalid regex in a rule is logged and skipped; it never aborts
    /// the scan.
    fn apply_rules(&self, description: &str) -> Result<Option<MerchantAnalysis>> {
        for rule in self.fetch_rules()? {
            let re = match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
                Ok(re) => re,
                Err(e) => {
                    warn!(
                        rule_id = rule.id,
                        pattern = %rule.pattern,
                        error = %e,
                        "Skipping rule with invalid pattern"
                    );
                    continue;
                }
            };

            if re.is_match(description) {
                return Ok(Some(MerchantAnalysis {
                    normalized_name: rule.normalized_name.clone(),
                    category: rule.category.clone(),
                    sub_category: rule.sub_category.clone(),
                    confidence: rule.confidence,
                    flags: vec![],
                }));
            }
        }

        Ok(None)
    }

    /// Fetch the active rule list through the analysis cache
    fn fetch_rules(&self) -> Result<Vec<MerchantRule>> {
        if let Some(rules) = self.db.cache_get::<Vec<MerchantRule>>(keys::RULES_ALL)? {
            return Ok(rules);
        }

        let rules = self.db.list_merchant_rules()?;
        self.db.cache_set(keys::RULES_ALL, &rules, ttl::MEDIUM)?;
        Ok(rules)
    }
}

/// Test a description against all active rules, returning every match
///
/// Used by the rules test endpoint/command; unlike `resolve` this does not
/// short-circuit on the first hit.
pub fn test_rules_against(db: &Database, description: &str) -> Result<Vec<MerchantRule>> {
    let mut matches = Vec::new();

    for rule in db.list_merchant_rules()? {
        let matched = match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(description),
            Err(_) => false,
        };

        if matched {
            matches.push(rule);
        }
    }

    Ok(matches)
}
