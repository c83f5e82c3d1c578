use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::accuracy::{AccuracyTracker, Recommendation};
use super::combiner::PathWeights;
use super::domain::{DecisionType, TenantId};

pub const DEFAULT_ROUTER_CACHE_TTL: Duration = Duration::from_secs(60);

type RouteKey = (TenantId, DecisionType);

/// Maps accuracy recommendations to weight presets, per tenant and decision type.
///
/// Recommendations are cached for `ttl`, so weight selection may lag the tracker by at
/// most that long. Staleness only shifts the blend; the deterministic floor in the
/// combiner holds regardless.
pub struct PathRouter {
    tracker: Arc<AccuracyTracker>,
    ttl: Duration,
    cache: RwLock<HashMap<RouteKey, (Instant, Recommendation)>>,
    overrides: RwLock<HashMap<RouteKey, PathWeights>>,
}

impl PathRouter {
    pub fn new(tracker: Arc<AccuracyTracker>, ttl: Duration) -> Self {
        Self {
            tracker,
            ttl,
            cache: RwLock::new(HashMap::new()),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn preset(recommendation: Recommendation) -> PathWeights {
        match recommendation {
            Recommendation::DeterministicPrimary => PathWeights::DETERMINISTIC_PRIMARY,
            Recommendation::SecondaryPrimary => PathWeights::SECONDARY_PRIMARY,
            Recommendation::Hybrid => PathWeights::HYBRID,
        }
    }

    /// Weights for the next blend. Never fails: tracker errors fall back to the
    /// balanced preset.
    pub fn get_weights(&self, tenant_id: &TenantId, decision_type: DecisionType) -> PathWeights {
        let key = (tenant_id.clone(), decision_type);
        if let Some(weights) = self
            .overrides
            .read()
            .expect("router override lock poisoned")
            .get(&key)
        {
            return *weights;
        }
        Self::preset(self.recommendation(tenant_id, decision_type))
    }

    /// Current recommendation, served from cache while fresh.
    pub fn recommendation(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
    ) -> Recommendation {
        let key = (tenant_id.clone(), decision_type);
        if let Some((fetched_at, recommendation)) = self
            .cache
            .read()
            .expect("router cache lock poisoned")
            .get(&key)
        {
            if fetched_at.elapsed() < self.ttl {
                return *recommendation;
            }
        }

        let recommendation = match self.tracker.get_accuracy(tenant_id, decision_type) {
            Ok(stats) => stats.recommendation,
            Err(err) => {
                tracing::warn!(
                    tenant = %tenant_id,
                    decision_type = decision_type.label(),
                    error = %err,
                    "accuracy lookup failed; using balanced weights"
                );
                return Recommendation::Hybrid;
            }
        };

        tracing::debug!(
            tenant = %tenant_id,
            decision_type = decision_type.label(),
            recommendation = recommendation.label(),
            "refreshed path recommendation"
        );
        self.cache
            .write()
            .expect("router cache lock poisoned")
            .insert(key, (Instant::now(), recommendation));
        recommendation
    }

    /// Substitute a learned weight set for one tenant and decision type.
    pub fn set_override(
        &self,
        tenant_id: TenantId,
        decision_type: DecisionType,
        weights: PathWeights,
    ) {
        self.overrides
            .write()
            .expect("router override lock poisoned")
            .insert((tenant_id, decision_type), weights);
    }

    pub fn clear_override(&self, tenant_id: &TenantId, decision_type: DecisionType) {
        self.overrides
            .write()
            .expect("router override lock poisoned")
            .remove(&(tenant_id.clone(), decision_type));
    }

    /// Drop the cached recommendation so the next lookup reads the tracker.
    pub fn invalidate(&self, tenant_id: &TenantId, decision_type: DecisionType) {
        self.cache
            .write()
            .expect("router cache lock poisoned")
            .remove(&(tenant_id.clone(), decision_type));
    }
}
