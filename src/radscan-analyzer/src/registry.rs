// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Analyzer class registry: maps a class name to a constructor. Built once
//! on first use; front-ends that speak to remote analyzers register their
//! proxies under other names, the local implementation lives at `"local"`.

use std::sync::{Arc, OnceLock};

use radscan_core::{Analyzer, AnalyzerParams, Result, SourceConfig};

use crate::local::LocalAnalyzer;

type AnalyzerCtor = fn(&SourceConfig, AnalyzerParams) -> Result<Arc<dyn Analyzer>>;

pub struct AnalyzerClass {
    pub name: &'static str,
    pub make: AnalyzerCtor,
}

fn make_local(config: &SourceConfig, params: AnalyzerParams) -> Result<Arc<dyn Analyzer>> {
    let analyzer = LocalAnalyzer::new(config, params)?;
    Ok(analyzer)
}

fn registry() -> &'static [AnalyzerClass] {
    static REGISTRY: OnceLock<Vec<AnalyzerClass>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        vec![AnalyzerClass {
            name: "local",
            make: make_local,
        }]
    })
}

/// Find an analyzer class by name.
pub fn lookup_class(name: &str) -> Option<&'static AnalyzerClass> {
    registry().iter().find(|c| c.name == name)
}
