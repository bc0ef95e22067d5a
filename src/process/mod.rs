// src/process/mod.rs
//! Staged relevance reduction: two cheap rule-based stages shrink the raw
//! bundle, an LLM scoring stage runs only under a candidate-count gate, and
//! a best-effort summary tops off the final result. Every degradation here
//! is contained; the pipeline itself never fails.

pub mod stages;

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agents::types::RawResult;
use crate::controller::Bundle;
use crate::llm::{LlmClient, ScoreRequest, SummaryItem, SummaryRequest};
use crate::query::Query;

#[derive(Debug, Clone)]
pub struct PipelineCfg {
    /// Stage 3 runs only when the surviving candidate count is at or below
    /// this gate; above it the whole run stays unscored.
    pub scoring_gate: usize,
    /// Minimum relevance score an item needs to survive stage 3.
    pub min_score: u8,
    /// Force stage 1 into pass-through mode.
    pub permissive_titles: bool,
    /// Score the first `scoring_gate` candidates instead of skipping the
    /// stage when the gate is exceeded. Off by default.
    pub score_overflow_head: bool,
    /// Results per source fed into the summary prompt.
    pub summary_top_n: usize,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            scoring_gate: 5,
            min_score: 5,
            permissive_titles: false,
            score_overflow_head: false,
            summary_top_n: 5,
        }
    }
}

/// A raw result that went through LLM scoring. Items that never reached the
/// scoring stage are absent from these collections, not scored as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    #[serde(flatten)]
    pub raw: RawResult,
    pub relevance_score: u8,
    pub relevance_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResults {
    pub source: String,
    pub results: Vec<ScoredResult>,
}

/// Final pipeline output. `results_by_source` keeps request order across
/// sources and score-descending order (discovery order on ties) within one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilteredResult {
    pub results_by_source: Vec<SourceResults>,
    pub total_count: usize,
    pub summary: String,
}

impl FilteredResult {
    pub fn get(&self, source: &str) -> Option<&[ScoredResult]> {
        self.results_by_source
            .iter()
            .find(|s| s.source == source)
            .map(|s| s.results.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }
}

pub struct ResultProcessor {
    llm: Arc<dyn LlmClient>,
    cfg: PipelineCfg,
}

impl ResultProcessor {
    pub fn new(llm: Arc<dyn LlmClient>, cfg: PipelineCfg) -> Self {
        Self { llm, cfg }
    }

    /// Reduce a bundle to scored, ordered, summarized results.
    pub async fn process(&self, query: &Query, bundle: &Bundle) -> FilteredResult {
        // Stages 1+2 are per source so discovery order survives untouched.
        let mut survivors: Vec<(String, Vec<RawResult>)> = Vec::new();
        for fetch in &bundle.sources {
            let before = fetch.results.len();
            let stage1 = stages::filter_by_title(
                fetch.results.clone(),
                query.keywords(),
                self.cfg.permissive_titles,
            );
            let after_title = stage1.len();
            let stage2 = stages::filter_by_content(stage1, query.keywords());
            debug!(
                target: "process",
                source = %fetch.source,
                raw = before,
                after_title,
                after_content = stage2.len(),
                "rule stages applied"
            );
            survivors.push((fetch.source.clone(), stage2));
        }

        let candidate_count: usize = survivors.iter().map(|(_, v)| v.len()).sum();
        counter!("filter_candidates_total").increment(candidate_count as u64);

        let scored = if candidate_count == 0 {
            Vec::new()
        } else if candidate_count > self.cfg.scoring_gate && !self.cfg.score_overflow_head {
            counter!("filter_gate_skips_total").increment(1);
            info!(
                target: "process",
                candidates = candidate_count,
                gate = self.cfg.scoring_gate,
                "candidate count exceeds scoring gate, stage skipped"
            );
            Vec::new()
        } else {
            let budget = if candidate_count > self.cfg.scoring_gate {
                self.cfg.scoring_gate
            } else {
                candidate_count
            };
            self.score_candidates(query, &survivors, budget).await
        };

        // Regroup in request order, sort within each source. The sort is
        // stable, so equal scores keep their discovery order.
        let mut results_by_source = Vec::new();
        for (source, _) in &survivors {
            let mut per_source: Vec<ScoredResult> = scored
                .iter()
                .filter(|s| &s.raw.source == source)
                .cloned()
                .collect();
            if per_source.is_empty() {
                continue;
            }
            per_source.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
            results_by_source.push(SourceResults {
                source: source.clone(),
                results: per_source,
            });
        }

        let total_count: usize = results_by_source.iter().map(|s| s.results.len()).sum();
        let summary = if total_count == 0 {
            String::new()
        } else {
            self.summarize(query, &results_by_source, total_count).await
        };

        info!(
            target: "process",
            candidates = candidate_count,
            kept = total_count,
            "pipeline complete"
        );
        FilteredResult {
            results_by_source,
            total_count,
            summary,
        }
    }

    async fn score_candidates(
        &self,
        query: &Query,
        survivors: &[(String, Vec<RawResult>)],
        budget: usize,
    ) -> Vec<ScoredResult> {
        let mut scored = Vec::new();
        let mut submitted = 0usize;
        'sources: for (_, items) in survivors {
            for item in items {
                if submitted == budget {
                    break 'sources;
                }
                submitted += 1;

                let req = ScoreRequest {
                    keywords: query.keywords(),
                    detail: query.detail(),
                    title: &item.title,
                    content: &item.content,
                };
                match self.llm.score(&req).await {
                    Ok(verdict) => {
                        counter!("filter_scored_total").increment(1);
                        if verdict.score >= self.cfg.min_score {
                            scored.push(ScoredResult {
                                raw: item.clone(),
                                relevance_score: verdict.score,
                                relevance_reason: verdict.reason,
                            });
                        }
                    }
                    Err(e) => {
                        counter!("llm_score_failures_total").increment(1);
                        warn!(target: "process", url = %item.url, error = %e, "scoring failed, item dropped");
                        if !e.is_transient() {
                            // Provider is gone for good; skip the remainder
                            // of the stage instead of failing the pipeline.
                            break 'sources;
                        }
                    }
                }
            }
        }
        scored
    }

    async fn summarize(
        &self,
        query: &Query,
        results_by_source: &[SourceResults],
        total: usize,
    ) -> String {
        let mut items = Vec::new();
        for source in results_by_source {
            for result in source.results.iter().take(self.cfg.summary_top_n) {
                items.push(SummaryItem {
                    source: source.source.clone(),
                    title: result.raw.title.clone(),
                    score: result.relevance_score,
                    reason: result.relevance_reason.clone(),
                });
            }
        }
        let req = SummaryRequest {
            keywords: query.keywords(),
            detail: query.detail(),
            total,
            items: &items,
        };
        match self.llm.summarize(&req).await {
            Ok(text) => text,
            Err(e) => {
                counter!("summary_failures_total").increment(1);
                warn!(target: "process", error = %e, "summarization failed, digest ships without summary");
                String::new()
            }
        }
    }
}
