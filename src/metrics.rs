/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/metrics.rs
*
* Prometheus metrics for provisioning flows. The collectors live in an owned
* `ProvisionMetrics` value registered into its own `Registry`; the orchestrator
* records into it and the HTTP server encodes it for `/metrics`.
*
* SPDX-License-Identifier: Apache-2.0
*/

use prometheus::{opts, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Registry, TextEncoder};

/// Outcome label for a flow that reached `Done`.
pub const OUTCOME_READY: &str = "ready";

#[derive(Clone)]
pub struct ProvisionMetrics {
    registry: Registry,
    /// Finished flows, labeled `ready` or by the stage that failed.
    provisions_total: IntCounterVec,
    /// Wall time spent reaching each stage.
    stage_duration_seconds: HistogramVec,
}

impl ProvisionMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let provisions_total = IntCounterVec::new(
            opts!(
                "vcluster_provisions_total",
                "Total number of finished provisioning requests, by outcome."
            ),
            &["outcome"],
        )?;
        let stage_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "vcluster_stage_duration_seconds",
                "Time taken to reach each provisioning stage.",
            )
            // Buckets in seconds: 1s up to 10m.
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 180.0, 300.0, 600.0]),
            &["stage"],
        )?;

        registry.register(Box::new(provisions_total.clone()))?;
        registry.register(Box::new(stage_duration_seconds.clone()))?;

        Ok(ProvisionMetrics {
            registry,
            provisions_total,
            stage_duration_seconds,
        })
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.provisions_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_stage(&self, stage: &str, seconds: f64) {
        self.stage_duration_seconds
            .with_label_values(&[stage])
            .observe(seconds);
    }

    pub fn provisions(&self, outcome: &str) -> u64 {
        self.provisions_total.with_label_values(&[outcome]).get()
    }

    /// Renders all collectors in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
