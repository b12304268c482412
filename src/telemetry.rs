/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/telemetry.rs
*
* Installs the global `tracing` subscriber: an `EnvFilter` read from
* `RUST_LOG` (default `info`) and a fmt layer, in JSON when requested.
*
* SPDX-License-Identifier: Apache-2.0 */

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}
